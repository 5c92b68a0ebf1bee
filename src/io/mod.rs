//! Collaborators of the frame loop: frame source, corner detector and viewer.
//!
//! The loop only talks to the traits defined here. Concrete implementations
//! cover an on-disk image sequence ([`ImageSequenceSource`]), corners
//! recorded by an external detector ([`RecordedCorners`]) and a terminal
//! viewer ([`ConsoleViewer`]).

pub mod console;
pub mod image_sequence;
pub mod recorded;

pub use console::ConsoleViewer;
pub use image_sequence::ImageSequenceSource;
pub use recorded::RecordedCorners;

use crate::target::TargetSpec;
use image::RgbImage;
use nalgebra::Vector2;
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("No frames found at {0}")]
    EmptySequence(PathBuf),
    #[error("Invalid corner record: {0}")]
    InvalidRecord(String),
}

/// Flags forwarded to the corner detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOptions {
    pub adaptive_threshold: bool,
    pub normalize_image: bool,
    pub fast_check: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            adaptive_threshold: true,
            normalize_image: true,
            fast_check: true,
        }
    }
}

/// Key events reported by a [`Viewer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Toggle pause, or advance one frame while paused.
    PauseStep,
    Quit,
    Other(char),
}

/// A stream of frames. `None` ends the stream.
pub trait FrameSource {
    fn read_frame(&mut self) -> Option<RgbImage>;

    fn close(&mut self);
}

/// Locates the interior corners of `target` in a frame.
///
/// On success exactly `columns × rows` points are returned in row-major
/// order; `None` means the target was not found.
pub trait CornerDetector {
    fn detect(
        &mut self,
        frame: &RgbImage,
        target: &TargetSpec,
        options: &DetectionOptions,
    ) -> Option<Vec<Vector2<f64>>>;
}

pub trait Viewer {
    fn show(&mut self, frame: &RgbImage) -> Result<(), IoError>;

    /// Waits up to `timeout` for a key, or indefinitely when `timeout` is `None`.
    fn poll_key(&mut self, timeout: Option<Duration>) -> Option<Key>;
}
