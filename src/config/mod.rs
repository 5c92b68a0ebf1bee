//! Runtime configuration loaded from YAML.
//!
//! ```yaml
//! camera:
//!   intrinsics: [fx, s, cx, 0, fy, cy, 0, 0, 1]   # row-major 3x3
//!   distortion: [k1, k2, p1, p2, k3]
//! board:
//!   columns: 10
//!   rows: 7
//!   cell_size: 0.018
//! input: frames/
//! ```
//!
//! Solver limits and overlay styling are compiled-in defaults and are not
//! read from the file.

use crate::camera::{CalibrationModel, CameraModelError};
use crate::target::{TargetError, TargetSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid camera calibration: {0}")]
    Camera(#[from] CameraModelError),
    #[error("Invalid board: {0}")]
    Target(#[from] TargetError),
    #[error("No input given in the config or on the command line")]
    MissingInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Row-major 3×3 intrinsic matrix.
    pub intrinsics: [f64; 9],
    /// `[k1, k2, p1, p2, k3]`
    pub distortion: [f64; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub columns: usize,
    pub rows: usize,
    pub cell_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub board: BoardConfig,
    #[serde(default)]
    pub input: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn save_to_yaml(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validated calibration model.
    pub fn calibration(&self) -> Result<CalibrationModel, ConfigError> {
        Ok(CalibrationModel::from_matrix(
            &self.camera.intrinsics,
            self.camera.distortion,
        )?)
    }

    /// Validated board description.
    pub fn target(&self) -> Result<TargetSpec, ConfigError> {
        Ok(TargetSpec::new(
            self.board.columns,
            self.board.rows,
            self.board.cell_size,
        )?)
    }

    /// `override_path` if given, else the configured input.
    pub fn resolve_input(&self, override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        override_path
            .map(Path::to_path_buf)
            .or_else(|| self.input.clone())
            .ok_or(ConfigError::MissingInput)
    }
}
