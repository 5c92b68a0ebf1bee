//! Projector: target-frame points to distorted pixel coordinates.
//!
//! Each point is moved into the camera frame by the [`Pose`], divided by its
//! depth, distorted with the rad-tan polynomial and mapped through the
//! intrinsic matrix. No point is clipped or dropped, so output index `i`
//! always corresponds to input index `i`. Points at or behind the camera
//! plane yield mirrored or non-finite coordinates; callers that draw them
//! must clip.

use crate::camera::CalibrationModel;
use crate::pose::Pose;
use nalgebra::{Matrix2xX, Matrix3xX, Vector2, Vector3};

pub fn project_point(calibration: &CalibrationModel, pose: &Pose, point: &Vector3<f64>) -> Vector2<f64> {
    calibration.project_camera_point(&pose.transform_point(point))
}

/// Projects a list of points, preserving order and cardinality.
pub fn project_points(
    calibration: &CalibrationModel,
    pose: &Pose,
    points: &[Vector3<f64>],
) -> Vec<Vector2<f64>> {
    points
        .iter()
        .map(|p| project_point(calibration, pose, p))
        .collect()
}

/// Batch form over a 3×N matrix, one point per column.
pub fn project_matrix(
    calibration: &CalibrationModel,
    pose: &Pose,
    points: &Matrix3xX<f64>,
) -> Matrix2xX<f64> {
    let mut projected = Matrix2xX::zeros(points.ncols());
    for (i, column) in points.column_iter().enumerate() {
        let pixel = project_point(calibration, pose, &column.into_owned());
        projected.set_column(i, &pixel);
    }
    projected
}
