use super::{FrameSource, IoError};
use image::RgbImage;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Frames read from image files, in lexical file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    closed: bool,
}

impl ImageSequenceSource {
    /// Opens a directory of frames, or a single image file as a one-frame
    /// sequence.
    ///
    /// # Errors
    ///
    /// * [`IoError::Io`] if the path cannot be read.
    /// * [`IoError::EmptySequence`] if it holds no PNG, JPEG or BMP file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let mut frames = if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            let mut frames = Vec::new();
            for entry in fs::read_dir(path)? {
                let entry_path = entry?.path();
                if entry_path.is_file() && is_image(&entry_path) {
                    frames.push(entry_path);
                }
            }
            frames
        };
        frames.retain(|p| is_image(p));
        frames.sort();

        if frames.is_empty() {
            return Err(IoError::EmptySequence(path.to_path_buf()));
        }
        debug!("Opened {} frames from {}", frames.len(), path.display());
        Ok(Self {
            frames,
            next: 0,
            closed: false,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_paths(&self) -> &[PathBuf] {
        &self.frames
    }
}

impl FrameSource for ImageSequenceSource {
    /// An unreadable frame ends the stream.
    fn read_frame(&mut self) -> Option<RgbImage> {
        if self.closed {
            return None;
        }
        let path = self.frames.get(self.next)?;
        self.next += 1;
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!("Failed to read frame {}: {e}", path.display());
                self.closed = true;
                None
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
