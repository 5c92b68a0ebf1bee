//! Reprojection statistics.

use crate::camera::CalibrationModel;
use crate::pose::Pose;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of per-point pixel distances between observed and reprojected
/// points.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    /// Statistics over a list of pixel distances.
    ///
    /// Returns `None` for an empty list or if any distance is not finite.
    pub fn from_distances(errors: &[f64]) -> Option<Self> {
        if errors.is_empty() || errors.iter().any(|e| !e.is_finite()) {
            return None;
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;

        let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let sum_squared: f64 = errors.iter().map(|x| x.powi(2)).sum();
        let rmse = (sum_squared / n).sqrt();

        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted = errors.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = if sorted.len() % 2 == 0 {
            let mid = sorted.len() / 2;
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[sorted.len() / 2]
        };

        Some(Self {
            rmse,
            min,
            max,
            mean,
            stddev,
            median,
        })
    }
}

/// Reprojects `points3d` through `pose` and `calibration` and compares them
/// with `points2d`, index by index.
///
/// Returns `None` when there are no points, the slices differ in length, or a
/// reprojection is not finite.
pub fn compute_reprojection_error(
    calibration: &CalibrationModel,
    pose: &Pose,
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Option<ProjectionError> {
    if points3d.len() != points2d.len() {
        return None;
    }
    let errors: Vec<f64> = points3d
        .iter()
        .zip(points2d)
        .map(|(p3d, p2d)| {
            let projected = calibration.project_camera_point(&pose.transform_point(p3d));
            (projected - p2d).norm()
        })
        .collect();
    ProjectionError::from_distances(&errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn test_statistics() {
        let stats = ProjectionError::from_distances(&[3.0, 1.0, 4.0, 0.0]).unwrap();
        assert_relative_eq!(stats.mean, 2.0);
        assert_relative_eq!(stats.rmse, (26.0f64 / 4.0).sqrt());
        assert_relative_eq!(stats.median, 2.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.stddev, (10.0f64 / 4.0).sqrt());
    }

    #[test]
    fn test_statistics_reject_empty_and_nan() {
        assert!(ProjectionError::from_distances(&[]).is_none());
        assert!(ProjectionError::from_distances(&[1.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_reprojection_error_of_exact_points_is_zero() {
        let calibration = CalibrationModel::new(
            Intrinsics {
                fx: 600.0,
                fy: 600.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            [0.1, -0.05, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let pose = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 1.0));
        let objects = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, -0.1, 0.0)];
        let mut images: Vec<_> = objects
            .iter()
            .map(|p| calibration.project_camera_point(&pose.transform_point(p)))
            .collect();

        let exact = compute_reprojection_error(&calibration, &pose, &objects, &images).unwrap();
        assert!(exact.rmse < 1e-12);

        images[1].x += 2.0;
        let shifted = compute_reprojection_error(&calibration, &pose, &objects, &images).unwrap();
        assert_relative_eq!(shifted.max, 2.0, epsilon = 1e-9);
        assert_relative_eq!(shifted.rmse, 2.0f64.sqrt(), epsilon = 1e-9);

        assert!(compute_reprojection_error(&calibration, &pose, &objects, &images[..1]).is_none());
    }
}
