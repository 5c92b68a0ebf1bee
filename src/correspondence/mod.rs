//! Correspondence builder.
//!
//! Pairs the 2D corners reported by a detector with the canonical object
//! points of the same [`TargetSpec`]. A [`CorrespondenceSet`] can only be
//! created here, so object and image points always share the row-major
//! ordering defined by the target.

use crate::target::TargetSpec;
use nalgebra::{Matrix2xX, Matrix3xX, Vector2, Vector3};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CorrespondenceError {
    #[error("Detector did not find the target")]
    NotFound,
    #[error("Expected {expected} corners, detector returned {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Detected corner {index} has a non-finite coordinate")]
    NonFinitePoint { index: usize },
}

/// Index-aligned object and image points for one frame.
#[derive(Debug, Clone)]
pub struct CorrespondenceSet {
    object_points: Vec<Vector3<f64>>,
    image_points: Vec<Vector2<f64>>,
}

impl CorrespondenceSet {
    /// Validates the detector output against the target.
    ///
    /// No point is dropped or reordered: the set is either accepted whole or
    /// rejected.
    ///
    /// # Errors
    ///
    /// * [`CorrespondenceError::NotFound`] when the detector reported failure.
    /// * [`CorrespondenceError::CountMismatch`] when the point count differs
    ///   from `columns × rows`.
    /// * [`CorrespondenceError::NonFinitePoint`] for NaN or infinite corners.
    pub fn build(
        target: &TargetSpec,
        detected: Option<&[Vector2<f64>]>,
    ) -> Result<Self, CorrespondenceError> {
        let image_points = detected.ok_or(CorrespondenceError::NotFound)?;
        let expected = target.point_count();
        if image_points.len() != expected {
            return Err(CorrespondenceError::CountMismatch {
                expected,
                actual: image_points.len(),
            });
        }
        if let Some(index) = image_points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(CorrespondenceError::NonFinitePoint { index });
        }

        Ok(Self {
            object_points: target.object_points(),
            image_points: image_points.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    pub fn object_points(&self) -> &[Vector3<f64>] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Vector2<f64>] {
        &self.image_points
    }

    /// Object points as a 3×N matrix, one column per correspondence.
    pub fn object_matrix(&self) -> Matrix3xX<f64> {
        Matrix3xX::from_columns(&self.object_points)
    }

    /// Image points as a 2×N matrix, one column per correspondence.
    pub fn image_matrix(&self) -> Matrix2xX<f64> {
        Matrix2xX::from_columns(&self.image_points)
    }

    #[cfg(test)]
    pub(crate) fn from_raw(object_points: Vec<Vector3<f64>>, image_points: Vec<Vector2<f64>>) -> Self {
        Self {
            object_points,
            image_points,
        }
    }
}
