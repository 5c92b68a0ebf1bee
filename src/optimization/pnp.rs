//! This module provides the cost function and optimization routines
//! for estimating a camera pose from planar 3D-2D correspondences.
//!
//! It uses the `tiny_solver` crate for non-linear optimization. The pose is
//! parameterised as a 6-vector `[rx, ry, rz, tx, ty, tz]` (axis-angle
//! rotation followed by translation) and the residual is the pixel
//! difference between the observed corner and the full projection through
//! rotation, perspective division, distortion and intrinsics.

use crate::camera::{rad_tan, CalibrationModel, Intrinsics};
use crate::geometry::{self, ProjectionError};
use crate::optimization::{Optimizer, SolverOptions};
use crate::pose::homography::estimate_planar_pose;
use crate::pose::{Pose, PoseError, MIN_CORRESPONDENCES};

use log::{debug, info};
use nalgebra::{DVector, Matrix2xX, Matrix3xX, RealField, Vector2, Vector3};
use std::collections::HashMap;
use std::fmt;
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::OptimizerOptions;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

const POSE_KEY: &str = "pose";

/// Rotates `point` by the axis-angle vector `rvec` (Rodrigues' formula).
///
/// Near the identity the first-order form `p + r × p` is used, which keeps
/// derivatives finite when evaluated on dual numbers at `r = 0`.
pub fn rotate_axis_angle<T: RealField>(rvec: &Vector3<T>, point: &Vector3<T>) -> Vector3<T> {
    let theta2 = rvec.norm_squared();
    let small: T = nalgebra::convert(1e-12);
    if theta2 > small {
        let theta = theta2.sqrt();
        let axis = rvec / theta.clone();
        let (sin, cos) = (theta.clone().sin(), theta.cos());
        let k_dot_p = axis.dot(point);
        point * cos.clone() + axis.cross(point) * sin + axis * (k_dot_p * (T::one() - cos))
    } else {
        point + rvec.cross(point)
    }
}

/// Cost function for estimating a [`Pose`].
///
/// This structure holds the 3D-2D correspondences and the fixed calibration
/// used during pose refinement. It implements the [`Optimizer`] trait.
#[derive(Clone)]
pub struct PnpOptimizationCost {
    calibration: CalibrationModel,
    /// 3D points in the target frame (3×N matrix), one column per point.
    points3d: Matrix3xX<f64>,
    /// Corresponding observed 2D points in pixels (2×N matrix).
    points2d: Matrix2xX<f64>,
    options: SolverOptions,
    pose: Option<Pose>,
}

/// Reprojection residual for `tiny_solver`.
///
/// One residual block covers all correspondences, two rows per point.
#[derive(Debug, Clone)]
struct PnpCost {
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
    intrinsics: Intrinsics,
    distortions: [f64; 5],
}

impl PnpCost {
    fn new(calibration: &CalibrationModel, points3d: &Matrix3xX<f64>, points2d: &Matrix2xX<f64>) -> Self {
        let points3d = (0..points3d.ncols())
            .map(|i| points3d.column(i).into_owned())
            .collect();
        let points2d = (0..points2d.ncols())
            .map(|i| points2d.column(i).into_owned())
            .collect();
        Self {
            points3d,
            points2d,
            intrinsics: *calibration.intrinsics(),
            distortions: *calibration.distortions(),
        }
    }
}

impl<T: RealField> Factor<T> for PnpCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let pose = &params[0];
        let rvec = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let tvec = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

        let fx: T = nalgebra::convert(self.intrinsics.fx);
        let fy: T = nalgebra::convert(self.intrinsics.fy);
        let cx: T = nalgebra::convert(self.intrinsics.cx);
        let cy: T = nalgebra::convert(self.intrinsics.cy);
        let skew: T = nalgebra::convert(self.intrinsics.skew);

        let mut residuals = DVector::zeros(self.points2d.len() * 2);

        for (i, (p3d, p2d)) in self.points3d.iter().zip(&self.points2d).enumerate() {
            let object = Vector3::new(
                nalgebra::convert::<f64, T>(p3d.x),
                nalgebra::convert::<f64, T>(p3d.y),
                nalgebra::convert::<f64, T>(p3d.z),
            );
            let camera = rotate_axis_angle(&rvec, &object) + &tvec;

            let x = camera.x.clone() / camera.z.clone();
            let y = camera.y.clone() / camera.z.clone();
            let (xd, yd) = rad_tan::distort(x, y, &self.distortions);

            let u = fx.clone() * xd + skew.clone() * yd.clone() + cx.clone();
            let v = fy.clone() * yd + cy.clone();

            residuals[i * 2] = nalgebra::convert::<f64, T>(p2d.x) - u;
            residuals[i * 2 + 1] = nalgebra::convert::<f64, T>(p2d.y) - v;
        }
        residuals
    }
}

impl PnpOptimizationCost {
    /// Creates a new pose optimization problem.
    ///
    /// # Arguments
    ///
    /// * `calibration` - Fixed intrinsics and distortion of the camera.
    /// * `points3d` - A 3×N matrix of object points in the target frame.
    /// * `points2d` - A 2×N matrix of the corresponding observed pixels.
    /// * `options` - Iteration budget and acceptance thresholds.
    ///
    /// # Errors
    ///
    /// * [`PoseError::MismatchedLengths`] when the column counts differ.
    /// * [`PoseError::InsufficientCorrespondences`] for fewer than 4 points.
    pub fn new(
        calibration: CalibrationModel,
        points3d: Matrix3xX<f64>,
        points2d: Matrix2xX<f64>,
        options: SolverOptions,
    ) -> Result<Self, PoseError> {
        if points3d.ncols() != points2d.ncols() {
            return Err(PoseError::MismatchedLengths {
                objects: points3d.ncols(),
                images: points2d.ncols(),
            });
        }
        if points3d.ncols() < MIN_CORRESPONDENCES {
            return Err(PoseError::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                actual: points3d.ncols(),
            });
        }
        Ok(Self {
            calibration,
            points3d,
            points2d,
            options,
            pose: None,
        })
    }

    /// Current estimate, if any stage has run.
    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    fn object_points(&self) -> Vec<Vector3<f64>> {
        (0..self.points3d.ncols())
            .map(|i| self.points3d.column(i).into_owned())
            .collect()
    }

    fn image_points(&self) -> Vec<Vector2<f64>> {
        (0..self.points2d.ncols())
            .map(|i| self.points2d.column(i).into_owned())
            .collect()
    }
}

impl fmt::Debug for PnpOptimizationCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PnpOptimizationCost Summary:\n calibration: {:?}\n points3d size: {}, points2d size: {}\n pose: {:?}",
            self.calibration,
            self.points3d.ncols(),
            self.points2d.ncols(),
            self.pose,
        )
    }
}

impl Optimizer for PnpOptimizationCost {
    /// Closed-form pose from the plane-induced homography.
    ///
    /// Observed pixels are first undistorted. A point whose undistortion does
    /// not converge contributes its distorted normalized coordinate instead;
    /// the refinement stage uses the full distortion model either way.
    fn linear_estimation(&mut self) -> Result<(), PoseError> {
        let normalized: Vec<Vector2<f64>> = self
            .image_points()
            .iter()
            .map(|pixel| {
                self.calibration
                    .normalized_from_pixel(pixel)
                    .unwrap_or_else(|err| {
                        debug!("Undistortion failed for {pixel:?} ({err}), using distorted coordinate");
                        self.calibration.distorted_normalized(pixel)
                    })
            })
            .collect();

        let pose = estimate_planar_pose(
            &self.object_points(),
            &normalized,
            self.options.planarity_tolerance,
        )?;
        self.pose = Some(pose);
        Ok(())
    }

    /// Refines the pose with `tiny_solver` Levenberg-Marquardt.
    fn optimize(&mut self, verbose: bool) -> Result<(), PoseError> {
        let initial = match self.pose {
            Some(pose) => pose,
            None => {
                self.linear_estimation()?;
                self.pose
                    .ok_or_else(|| PoseError::NotConverged("no initial estimate".to_string()))?
            }
        };

        if verbose {
            info!("Starting pose optimization...");
            info!("Initial pose: {:?}", initial);
            info!("Number of point correspondences: {}", self.points3d.ncols());
        }

        let mut problem = tiny_solver::Problem::new();
        let cost_function = PnpCost::new(&self.calibration, &self.points3d, &self.points2d);
        let num_residuals = self.points2d.ncols() * 2;
        problem.add_residual_block(num_residuals, &[POSE_KEY], Box::new(cost_function), None);

        let rvec = initial.rvec();
        let tvec = initial.translation();
        let initial_params = DVector::from_vec(vec![rvec.x, rvec.y, rvec.z, tvec.x, tvec.y, tvec.z]);
        let mut initial_values = HashMap::new();
        initial_values.insert(POSE_KEY.to_string(), initial_params);

        let optimizer = LevenbergMarquardtOptimizer::default();
        let solver_options = OptimizerOptions {
            max_iteration: self.options.max_iterations,
            ..OptimizerOptions::default()
        };

        let result = optimizer
            .optimize(&problem, &initial_values, Some(solver_options))
            .ok_or_else(|| PoseError::NotConverged("Levenberg-Marquardt failed".to_string()))?;

        let params = result
            .get(POSE_KEY)
            .ok_or_else(|| PoseError::NotConverged("pose block missing from result".to_string()))?;
        if params.len() != 6 || params.iter().any(|v| !v.is_finite()) {
            return Err(PoseError::NotConverged(
                "optimized parameters are not finite".to_string(),
            ));
        }

        let pose = Pose::from_rvec_tvec(
            &Vector3::new(params[0], params[1], params[2]),
            &Vector3::new(params[3], params[4], params[5]),
        );
        self.pose = Some(pose);

        if verbose {
            info!("Optimized pose: {:?}", pose);
        }
        Ok(())
    }

    fn compute_reprojection_error(&self) -> Result<ProjectionError, PoseError> {
        let pose = self
            .pose
            .ok_or_else(|| PoseError::NotConverged("no pose estimate".to_string()))?;
        geometry::compute_reprojection_error(
            &self.calibration,
            &pose,
            &self.object_points(),
            &self.image_points(),
        )
        .ok_or_else(|| PoseError::NotConverged("reprojection error is not finite".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::projection::project_points;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn sample_calibration() -> CalibrationModel {
        CalibrationModel::new(
            Intrinsics {
                fx: 461.629,
                fy: 460.152,
                cx: 362.680,
                cy: 246.049,
                skew: 0.0,
            },
            [-0.2834, 0.0739, 0.0001, 1.7618e-05, 0.0],
        )
        .unwrap()
    }

    fn sample_points(pose: &Pose) -> (Matrix3xX<f64>, Matrix2xX<f64>) {
        let objects: Vec<Vector3<f64>> = (0..5)
            .flat_map(|r| (0..6).map(move |c| Vector3::new(c as f64 * 0.03, r as f64 * 0.03, 0.0)))
            .collect();
        let images = project_points(&sample_calibration(), pose, &objects);
        (Matrix3xX::from_columns(&objects), Matrix2xX::from_columns(&images))
    }

    #[test]
    fn test_rotate_axis_angle_matches_rotation3() {
        let rvec = Vector3::new(0.4, -0.3, 0.9);
        let point = Vector3::new(0.1, 0.2, -0.3);
        let expected = Rotation3::new(rvec) * point;
        assert_relative_eq!(rotate_axis_angle(&rvec, &point), expected, epsilon = 1e-12);

        let tiny = Vector3::new(1e-9, 0.0, 0.0);
        assert_relative_eq!(
            rotate_axis_angle(&tiny, &point),
            Rotation3::new(tiny) * point,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_residual_is_zero_at_ground_truth() {
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(0.1, 0.2, -0.1), &Vector3::new(-0.05, -0.04, 0.5));
        let (points3d, points2d) = sample_points(&ground_truth);
        let cost = PnpCost::new(&sample_calibration(), &points3d, &points2d);
        let rvec = ground_truth.rvec();
        let t = ground_truth.translation();
        let params = DVector::from_vec(vec![rvec.x, rvec.y, rvec.z, t.x, t.y, t.z]);
        let residuals: DVector<f64> = cost.residual_func(&[params]);
        assert_eq!(residuals.len(), 60);
        assert!(residuals.amax() < 1e-9);
    }

    #[test]
    fn test_pnp_cost_rejects_mismatched_inputs() {
        let objects = Matrix3xX::from_columns(&[Vector3::zeros(); 5]);
        let images = Matrix2xX::from_columns(&[Vector2::zeros(); 4]);
        let err = PnpOptimizationCost::new(sample_calibration(), objects, images, SolverOptions::default())
            .unwrap_err();
        assert!(matches!(err, PoseError::MismatchedLengths { objects: 5, images: 4 }));
    }

    #[test]
    fn test_optimize_refines_perturbed_estimate() {
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(-0.2, 0.15, 0.05), &Vector3::new(-0.06, -0.05, 0.45));
        let (points3d, points2d) = sample_points(&ground_truth);
        let mut cost =
            PnpOptimizationCost::new(sample_calibration(), points3d, points2d, SolverOptions::default())
                .unwrap();

        cost.linear_estimation().unwrap();
        let linear = cost.pose().unwrap();
        assert!((linear.translation() - ground_truth.translation()).norm() < 1e-3);

        cost.optimize(false).unwrap();
        let refined = cost.pose().unwrap();
        assert_relative_eq!(refined.translation(), ground_truth.translation(), epsilon = 1e-7);
        let error = cost.compute_reprojection_error().unwrap();
        assert!(error.rmse < 1e-6, "rmse {}", error.rmse);
    }

    #[test]
    fn test_optimize_without_linear_estimation() {
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(0.05, -0.1, 0.2), &Vector3::new(-0.04, -0.03, 0.4));
        let (points3d, points2d) = sample_points(&ground_truth);
        let mut cost =
            PnpOptimizationCost::new(sample_calibration(), points3d, points2d, SolverOptions::default())
                .unwrap();
        assert!(cost.pose().is_none());
        cost.optimize(false).unwrap();
        assert_relative_eq!(
            cost.pose().unwrap().camera_position(),
            ground_truth.camera_position(),
            epsilon = 1e-7
        );
    }
}
