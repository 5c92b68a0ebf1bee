//! Calibration target geometry.
//!
//! [`TargetSpec`] describes the chessboard by its interior corner grid and
//! physical cell size, and owns the canonical row-major ordering of the
//! object points. [`OverlayGeometry`] is the wireframe solid drawn on top of
//! the board, expressed in the same target-local frame.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TargetError {
    #[error("Board must have at least 2x2 interior corners, got {columns}x{rows}")]
    GridTooSmall { columns: usize, rows: usize },
    #[error("Cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),
    #[error("Overlay faces must have the same number of points ({lower} vs {upper})")]
    FaceMismatch { lower: usize, upper: usize },
    #[error("Overlay faces need at least 2 points each")]
    FaceTooSmall,
}

/// Planar chessboard described by its interior corner grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    columns: usize,
    rows: usize,
    cell_size: f64,
}

impl TargetSpec {
    pub fn new(columns: usize, rows: usize, cell_size: f64) -> Result<Self, TargetError> {
        if columns < 2 || rows < 2 {
            return Err(TargetError::GridTooSmall { columns, rows });
        }
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(TargetError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            columns,
            rows,
            cell_size,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of interior corners, i.e. `columns × rows`.
    pub fn point_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Canonical object points on the `Z = 0` plane of the board.
    ///
    /// Row-major: index `r * columns + c` holds `(c·cell, r·cell, 0)`.
    /// Detectors must report corners in this order.
    pub fn object_points(&self) -> Vec<Vector3<f64>> {
        (0..self.rows)
            .flat_map(|r| {
                (0..self.columns).map(move |c| {
                    Vector3::new(
                        c as f64 * self.cell_size,
                        r as f64 * self.cell_size,
                        0.0,
                    )
                })
            })
            .collect()
    }
}

/// Two index-aligned faces of a wireframe solid in target-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayGeometry {
    lower: Vec<Vector3<f64>>,
    upper: Vec<Vector3<f64>>,
}

impl OverlayGeometry {
    pub fn new(lower: Vec<Vector3<f64>>, upper: Vec<Vector3<f64>>) -> Result<Self, TargetError> {
        if lower.len() != upper.len() {
            return Err(TargetError::FaceMismatch {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        if lower.len() < 2 {
            return Err(TargetError::FaceTooSmall);
        }
        Ok(Self { lower, upper })
    }

    /// The default pentagonal prism standing one cell tall on the board.
    ///
    /// The upper face sits at `z = -cell`, which is towards the camera for a
    /// board viewed from its front side.
    pub fn prism(target: &TargetSpec) -> Self {
        const FOOTPRINT: [(f64, f64); 5] = [(4.0, 1.0), (3.0, 4.0), (5.5, 2.0), (2.5, 2.0), (5.0, 4.0)];
        let s = target.cell_size();
        let lower = FOOTPRINT
            .iter()
            .map(|&(x, y)| Vector3::new(x * s, y * s, 0.0))
            .collect();
        let upper = FOOTPRINT
            .iter()
            .map(|&(x, y)| Vector3::new(x * s, y * s, -s))
            .collect();
        Self { lower, upper }
    }

    pub fn lower(&self) -> &[Vector3<f64>] {
        &self.lower
    }

    pub fn upper(&self) -> &[Vector3<f64>] {
        &self.upper
    }
}
