//! Per-frame processing: detection, correspondences, pose, overlay.
//!
//! Every frame is handled independently. Recoverable failures (target not
//! found, wrong corner count, pose solve failure) skip the overlay and leave
//! the frame as it was read; nothing is carried over to the next frame.

pub mod controller;

pub use controller::{FrameLoop, LoopSummary, PlaybackState};

use crate::camera::CalibrationModel;
use crate::correspondence::{CorrespondenceError, CorrespondenceSet};
use crate::geometry::ProjectionError;
use crate::io::{CornerDetector, DetectionOptions};
use crate::optimization::SolverOptions;
use crate::pose::{solve_pnp, PoseError};
use crate::render::{draw_overlay, Annotation, OverlayStyle};
use crate::target::{OverlayGeometry, TargetSpec};
use image::RgbImage;
use log::{debug, warn};

#[derive(thiserror::Error, Debug)]
pub enum SkipReason {
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// Result of processing one frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Rendered {
        annotation: Annotation,
        reprojection: ProjectionError,
    },
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, FrameOutcome::Rendered { .. })
    }
}

/// Immutable per-run configuration shared by every frame.
#[derive(Debug, Clone)]
pub struct PosePipeline {
    calibration: CalibrationModel,
    target: TargetSpec,
    overlay: OverlayGeometry,
    style: OverlayStyle,
    solver: SolverOptions,
    detection: DetectionOptions,
}

impl PosePipeline {
    /// Pipeline with the default prism overlay and default options.
    pub fn new(calibration: CalibrationModel, target: TargetSpec) -> Self {
        let overlay = OverlayGeometry::prism(&target);
        Self {
            calibration,
            target,
            overlay,
            style: OverlayStyle::default(),
            solver: SolverOptions::default(),
            detection: DetectionOptions::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayGeometry) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_solver_options(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_detection_options(mut self, detection: DetectionOptions) -> Self {
        self.detection = detection;
        self
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    /// Detects the target in `frame`, solves the pose and draws the overlay
    /// in place. On any failure `frame` is left untouched.
    pub fn process_frame<D>(&self, frame: &mut RgbImage, detector: &mut D) -> FrameOutcome
    where
        D: CornerDetector + ?Sized,
    {
        let detected = detector.detect(frame, &self.target, &self.detection);
        let correspondences = match CorrespondenceSet::build(&self.target, detected.as_deref()) {
            Ok(set) => set,
            Err(e) => {
                debug!("Skipping frame: {e}");
                return FrameOutcome::Skipped(e.into());
            }
        };

        let solution = match solve_pnp(&self.calibration, &correspondences, &self.solver) {
            Ok(solution) => solution,
            Err(e) => {
                warn!("Pose estimation failed: {e}");
                return FrameOutcome::Skipped(e.into());
            }
        };
        debug!("Pose solved: {:?}", solution.reprojection);

        let annotation = draw_overlay(
            frame,
            &solution.pose,
            &self.calibration,
            &self.overlay,
            &self.style,
        );
        FrameOutcome::Rendered {
            annotation,
            reprojection: solution.reprojection,
        }
    }
}
