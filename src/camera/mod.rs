//! Camera calibration model.
//!
//! A [`CalibrationModel`] bundles the intrinsic matrix and the five
//! radial-tangential distortion coefficients of a camera. It is built once at
//! startup and shared immutably by the pose solver, the projector and the
//! overlay renderer.

pub mod rad_tan;

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0)
            || !intrinsics.fx.is_finite()
            || !intrinsics.fy.is_finite()
        {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        if !intrinsics.skew.is_finite() {
            return Err(CameraModelError::InvalidParams(
                "Skew must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_distortions(distortions: &[f64; 5]) -> Result<(), CameraModelError> {
        if let Some(i) = distortions.iter().position(|d| !d.is_finite()) {
            return Err(CameraModelError::InvalidParams(format!(
                "Distortion coefficient at index {i} is not finite"
            )));
        }
        Ok(())
    }
}

/// Intrinsic matrix plus the 5-coefficient radial-tangential lens model.
///
/// The distortion coefficients follow the usual ordering:
/// * `k1`, `k2`, `k3`: radial terms,
/// * `p1`, `p2`: tangential terms.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    intrinsics: Intrinsics,
    distortions: [f64; 5], // k1, k2, p1, p2, k3
}

impl CalibrationModel {
    /// Creates a validated calibration model.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    /// * [`CameraModelError::InvalidParams`] for non-finite skew or coefficients.
    pub fn new(intrinsics: Intrinsics, distortions: [f64; 5]) -> Result<Self, CameraModelError> {
        validation::validate_intrinsics(&intrinsics)?;
        validation::validate_distortions(&distortions)?;
        Ok(Self {
            intrinsics,
            distortions,
        })
    }

    /// Builds a model from a row-major 3×3 intrinsic matrix.
    ///
    /// The last row must be `[0, 0, 1]` and the `(1, 0)` entry zero, which is
    /// the form every calibration tool writes out.
    pub fn from_matrix(k: &[f64; 9], distortions: [f64; 5]) -> Result<Self, CameraModelError> {
        if k[3] != 0.0 || k[6] != 0.0 || k[7] != 0.0 || (k[8] - 1.0).abs() > 1e-12 {
            return Err(CameraModelError::InvalidParams(format!(
                "Intrinsic matrix must have the form [fx s cx; 0 fy cy; 0 0 1], got {k:?}"
            )));
        }
        Self::new(
            Intrinsics {
                fx: k[0],
                fy: k[4],
                cx: k[2],
                cy: k[5],
                skew: k[1],
            },
            distortions,
        )
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn distortions(&self) -> &[f64; 5] {
        &self.distortions
    }

    pub fn has_distortion(&self) -> bool {
        self.distortions.iter().any(|d| *d != 0.0)
    }

    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        let k = &self.intrinsics;
        Matrix3::new(k.fx, k.skew, k.cx, 0.0, k.fy, k.cy, 0.0, 0.0, 1.0)
    }

    /// Projects a point given in camera coordinates to pixels.
    ///
    /// Perspective division is applied without any depth check: points on or
    /// behind the camera plane produce mirrored or non-finite coordinates.
    pub fn project_camera_point(&self, point: &Vector3<f64>) -> Vector2<f64> {
        let x = point.x / point.z;
        let y = point.y / point.z;
        self.pixel_from_normalized(&Vector2::new(x, y))
    }

    /// Applies distortion and the intrinsic matrix to an ideal normalized point.
    pub fn pixel_from_normalized(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        let (xd, yd) = rad_tan::distort(normalized.x, normalized.y, &self.distortions);
        let k = &self.intrinsics;
        Vector2::new(k.fx * xd + k.skew * yd + k.cx, k.fy * yd + k.cy)
    }

    /// Removes the intrinsic matrix only, leaving the point distorted.
    pub fn distorted_normalized(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let k = &self.intrinsics;
        let yd = (pixel.y - k.cy) / k.fy;
        let xd = (pixel.x - k.cx - k.skew * yd) / k.fx;
        Vector2::new(xd, yd)
    }

    /// Maps a pixel to its ideal (undistorted) normalized image coordinate.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::NumericalError`] if the iterative inversion of the
    /// distortion polynomial fails to converge.
    pub fn normalized_from_pixel(
        &self,
        pixel: &Vector2<f64>,
    ) -> Result<Vector2<f64>, CameraModelError> {
        let distorted = self.distorted_normalized(pixel);
        if !self.has_distortion() {
            return Ok(distorted);
        }
        rad_tan::undistort(&distorted, &self.distortions)
    }
}

impl fmt::Debug for CalibrationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationModel [fx: {} fy: {} cx: {} cy: {} skew: {} distortions: {:?}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.intrinsics.skew,
            self.distortions,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_model() -> CalibrationModel {
        CalibrationModel::from_matrix(
            &[
                1665.45464, 0.0, 963.191669, 0.0, 1664.78960, 528.436841, 0.0, 0.0, 1.0,
            ],
            [0.217038905, -1.11778713, -3.21833581e-04, 6.37111795e-04, 2.30756867],
        )
        .unwrap()
    }

    #[test]
    fn test_from_matrix_reads_row_major() {
        let model = sample_model();
        assert_eq!(model.intrinsics().fx, 1665.45464);
        assert_eq!(model.intrinsics().fy, 1664.78960);
        assert_eq!(model.intrinsics().cx, 963.191669);
        assert_eq!(model.intrinsics().cy, 528.436841);
        assert_eq!(model.intrinsics().skew, 0.0);
        assert_eq!(model.distortions()[4], 2.30756867);
        assert!(model.has_distortion());
        assert_eq!(model.intrinsic_matrix()[(0, 2)], 963.191669);
    }

    #[test]
    fn test_from_matrix_rejects_projective_last_row() {
        let result = CalibrationModel::from_matrix(
            &[500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.1, 0.0, 1.0],
            [0.0; 5],
        );
        assert!(matches!(result, Err(CameraModelError::InvalidParams(_))));
    }

    #[test]
    fn test_new_rejects_bad_intrinsics() {
        let bad_focal = Intrinsics {
            fx: 0.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        };
        assert!(matches!(
            CalibrationModel::new(bad_focal, [0.0; 5]),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));

        let bad_center = Intrinsics {
            fx: 500.0,
            cx: f64::NAN,
            ..bad_focal
        };
        assert!(matches!(
            CalibrationModel::new(bad_center, [0.0; 5]),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        ));

        let good = Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        };
        assert!(matches!(
            CalibrationModel::new(good, [0.0, f64::INFINITY, 0.0, 0.0, 0.0]),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_pixel_normalized_round_trip() {
        let model = sample_model();
        let normalized = Vector2::new(0.12, -0.08);
        let pixel = model.pixel_from_normalized(&normalized);
        let back = model.normalized_from_pixel(&pixel).unwrap();
        assert_relative_eq!(back.x, normalized.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, normalized.y, epsilon = 1e-9);
    }

    #[test]
    fn test_principal_axis_hits_principal_point() {
        let model = sample_model();
        let pixel = model.project_camera_point(&Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(pixel.x, 963.191669, epsilon = 1e-9);
        assert_relative_eq!(pixel.y, 528.436841, epsilon = 1e-9);
    }

    #[test]
    fn test_skew_enters_projection() {
        let model = CalibrationModel::new(
            Intrinsics {
                fx: 500.0,
                fy: 400.0,
                cx: 320.0,
                cy: 240.0,
                skew: 2.0,
            },
            [0.0; 5],
        )
        .unwrap();
        let pixel = model.pixel_from_normalized(&Vector2::new(0.1, 0.2));
        assert_relative_eq!(pixel.x, 500.0 * 0.1 + 2.0 * 0.2 + 320.0, epsilon = 1e-12);
        assert_relative_eq!(pixel.y, 400.0 * 0.2 + 240.0, epsilon = 1e-12);
        let back = model.normalized_from_pixel(&pixel).unwrap();
        assert_relative_eq!(back.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(back.y, 0.2, epsilon = 1e-12);
    }
}
