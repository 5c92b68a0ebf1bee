//! Chessboard Pose Library
//!
//! Per-frame camera pose estimation against a planar chessboard, with an
//! augmented-reality overlay. For every frame:
//! - the detector's corners are paired with the board's object points,
//! - the pose is solved by Perspective-n-Point (homography initialisation
//!   refined with Levenberg-Marquardt through tiny-solver),
//! - a wireframe prism is projected through the radial-tangential lens model
//!   and drawn with the camera position `XYZ: [x y z]`.
//!
//! The frame loop talks to its collaborators (frame source, corner detector,
//! viewer) through the traits in [`io`].

pub mod camera;
pub mod config;
pub mod correspondence;
pub mod geometry;
pub mod io;
pub mod optimization;
pub mod pipeline;
pub mod pose;
pub mod projection;
pub mod render;
pub mod target;

// Re-export commonly used types
pub use camera::{CalibrationModel, CameraModelError, Intrinsics};
pub use config::{AppConfig, ConfigError};
pub use correspondence::{CorrespondenceError, CorrespondenceSet};
pub use geometry::ProjectionError;
pub use io::{CornerDetector, DetectionOptions, FrameSource, IoError, Key, Viewer};
pub use optimization::{Optimizer, PnpOptimizationCost, SolverOptions};
pub use pipeline::{FrameLoop, FrameOutcome, LoopSummary, PlaybackState, PosePipeline};
pub use pose::{solve_pnp, Pose, PoseError, PoseSolution};
pub use render::{render_overlay, Annotation, OverlayStyle};
pub use target::{OverlayGeometry, TargetError, TargetSpec};
