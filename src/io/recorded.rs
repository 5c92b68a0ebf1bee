//! Replays corner detections exported by an external detector.
//!
//! Two formats are accepted:
//!
//! * CSV with a `frame,index,x,y` header, one row per corner. Frames without
//!   rows count as "target not found".
//! * JSON `{"frames": [[[x, y], ...], null, ...]}`, one entry per frame.

use super::{CornerDetector, DetectionOptions, IoError};
use crate::target::TargetSpec;
use image::RgbImage;
use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Largest frame count a CSV recording may address.
pub const MAX_RECORDED_FRAMES: usize = 1_000_000;

#[derive(Debug, Deserialize)]
struct CornerRecord {
    frame: usize,
    index: usize,
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordedFile {
    frames: Vec<Option<Vec<[f64; 2]>>>,
}

/// A [`CornerDetector`] that returns pre-recorded corners, one entry per call.
#[derive(Debug, Clone)]
pub struct RecordedCorners {
    frames: Vec<Option<Vec<Vector2<f64>>>>,
    next_frame: usize,
}

impl RecordedCorners {
    pub fn from_frames(frames: Vec<Option<Vec<Vector2<f64>>>>) -> Self {
        Self {
            frames,
            next_frame: 0,
        }
    }

    /// Loads a recording, choosing the format by file extension (`.json`, or
    /// CSV otherwise).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let recording = if is_json {
            Self::from_json_path(path)?
        } else {
            Self::from_csv_path(path)?
        };
        debug!(
            "Loaded corners for {} frames from {}",
            recording.frames.len(),
            path.display()
        );
        Ok(recording)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, IoError> {
        let file: RecordedFile = serde_json::from_str(raw)?;
        let frames = file
            .frames
            .into_iter()
            .map(|frame| frame.map(|pts| pts.iter().map(|p| Vector2::new(p[0], p[1])).collect()))
            .collect();
        Ok(Self::from_frames(frames))
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_path(path)?;
        Self::from_csv_reader(reader)
    }

    pub fn from_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, IoError> {
        let mut grouped: BTreeMap<usize, Vec<(usize, Vector2<f64>)>> = BTreeMap::new();
        for record in reader.deserialize() {
            let record: CornerRecord = record?;
            grouped
                .entry(record.frame)
                .or_default()
                .push((record.index, Vector2::new(record.x, record.y)));
        }

        let frame_count = match grouped.keys().next_back() {
            Some(&last) => last
                .checked_add(1)
                .filter(|count| *count <= MAX_RECORDED_FRAMES)
                .ok_or_else(|| {
                    IoError::InvalidRecord(format!(
                        "frame {last} is beyond the supported {MAX_RECORDED_FRAMES} frames"
                    ))
                })?,
            None => 0,
        };
        let mut frames = vec![None; frame_count];
        for (frame, mut corners) in grouped {
            corners.sort_by_key(|(index, _)| *index);
            if let Some(pos) = corners.iter().enumerate().position(|(i, (index, _))| i != *index) {
                return Err(IoError::InvalidRecord(format!(
                    "frame {frame}: corner indices must run 0..{} without gaps or repeats (problem at position {pos})",
                    corners.len()
                )));
            }
            frames[frame] = Some(corners.into_iter().map(|(_, p)| p).collect());
        }
        Ok(Self::from_frames(frames))
    }

    /// Number of recorded frames, including frames without a detection.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl CornerDetector for RecordedCorners {
    fn detect(
        &mut self,
        _frame: &RgbImage,
        _target: &TargetSpec,
        _options: &DetectionOptions,
    ) -> Option<Vec<Vector2<f64>>> {
        let index = self.next_frame;
        self.next_frame += 1;
        self.frames.get(index).cloned().flatten()
    }
}
