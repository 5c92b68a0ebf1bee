//! Camera pose relative to the calibration target.
//!
//! A [`Pose`] maps target-local coordinates into the camera frame
//! (`X_cam = R · X_target + t`). It is solved from scratch on every frame by
//! [`solve_pnp`]: a linear estimate from the plane-induced homography
//! ([`homography`]) refined by Levenberg-Marquardt on the full distorted
//! reprojection error ([`crate::optimization::pnp`]).

pub mod homography;

use crate::camera::{CalibrationModel, CameraModelError};
use crate::correspondence::CorrespondenceSet;
use crate::geometry::ProjectionError;
use crate::optimization::pnp::PnpOptimizationCost;
use crate::optimization::{Optimizer, SolverOptions};
use log::debug;
use nalgebra::{Rotation3, Vector3};

/// Minimum number of correspondences for a planar PnP solve.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum PoseError {
    #[error("PnP requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },
    #[error("Mismatched correspondence lengths: {objects} object points, {images} image points")]
    MismatchedLengths { objects: usize, images: usize },
    #[error("Degenerate point configuration: {0}")]
    Degenerate(String),
    #[error("Object points are not coplanar (out-of-plane ratio {ratio:.3e})")]
    NonPlanarObject { ratio: f64 },
    #[error("Pose optimization did not converge: {0}")]
    NotConverged(String),
    #[error("Solved pose places target points behind the camera")]
    BehindCamera,
    #[error("Reprojection RMS {rms:.3} px exceeds the {limit:.3} px limit")]
    ReprojectionTooLarge { rms: f64, limit: f64 },
    #[error("Camera model error: {0}")]
    Camera(#[from] CameraModelError),
}

/// Rigid transform from the target frame into the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Builds a pose from an axis-angle vector (angle = norm) and a translation.
    pub fn from_rvec_tvec(rvec: &Vector3<f64>, tvec: &Vector3<f64>) -> Self {
        Self::new(Rotation3::new(*rvec), *tvec)
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Axis-angle form of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Camera center expressed in the target frame: `-Rᵀ · t`.
    pub fn camera_position(&self) -> Vector3<f64> {
        -(self.rotation.inverse() * self.translation)
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.matrix().iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

/// A solved pose together with its reprojection statistics.
#[derive(Debug, Clone)]
pub struct PoseSolution {
    pub pose: Pose,
    pub reprojection: ProjectionError,
}

/// Solves the Perspective-n-Point problem for a planar correspondence set.
///
/// The result is either a pose whose reprojection error is within
/// `options.max_rms_px`, or an explicit [`PoseError`]; a degenerate or
/// non-finite pose is never returned.
///
/// # Errors
///
/// * [`PoseError::InsufficientCorrespondences`] for fewer than 4 points.
/// * [`PoseError::Degenerate`] for coincident or collinear object or image
///   points, or a singular homography.
/// * [`PoseError::NonPlanarObject`] when the object points are not coplanar.
/// * [`PoseError::NotConverged`] when the optimizer fails or yields a
///   non-finite pose.
/// * [`PoseError::BehindCamera`] when any object point ends up at non-positive depth.
/// * [`PoseError::ReprojectionTooLarge`] when the final RMS exceeds the limit.
pub fn solve_pnp(
    calibration: &CalibrationModel,
    correspondences: &CorrespondenceSet,
    options: &SolverOptions,
) -> Result<PoseSolution, PoseError> {
    let mut cost = PnpOptimizationCost::new(
        calibration.clone(),
        correspondences.object_matrix(),
        correspondences.image_matrix(),
        options.clone(),
    )?;

    cost.linear_estimation()?;
    if let Some(initial) = cost.pose() {
        debug!("Linear pose estimate: rvec {:?} t {:?}", initial.rvec(), initial.translation());
    }
    cost.optimize(options.verbose)?;

    let pose = cost
        .pose()
        .ok_or_else(|| PoseError::NotConverged("optimizer produced no pose".to_string()))?;
    if !pose.is_finite() {
        return Err(PoseError::NotConverged("pose is not finite".to_string()));
    }
    if correspondences
        .object_points()
        .iter()
        .any(|p| pose.transform_point(p).z <= 0.0)
    {
        return Err(PoseError::BehindCamera);
    }

    let reprojection = cost.compute_reprojection_error()?;
    if !(reprojection.rmse <= options.max_rms_px) {
        return Err(PoseError::ReprojectionTooLarge {
            rms: reprojection.rmse,
            limit: options.max_rms_px,
        });
    }

    Ok(PoseSolution { pose, reprojection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::projection::project_points;
    use crate::target::TargetSpec;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn recorded_calibration() -> CalibrationModel {
        CalibrationModel::from_matrix(
            &[
                1665.45464, 0.0, 963.191669, 0.0, 1664.78960, 528.436841, 0.0, 0.0, 1.0,
            ],
            [0.217038905, -1.11778713, -3.21833581e-04, 6.37111795e-04, 2.30756867],
        )
        .unwrap()
    }

    fn pinhole_calibration() -> CalibrationModel {
        CalibrationModel::new(
            Intrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            [0.0; 5],
        )
        .unwrap()
    }

    fn synthetic_set(
        calibration: &CalibrationModel,
        target: &TargetSpec,
        pose: &Pose,
    ) -> CorrespondenceSet {
        let detected = project_points(calibration, pose, &target.object_points());
        CorrespondenceSet::build(target, Some(&detected)).unwrap()
    }

    fn rotation_angle_between(a: &Rotation3<f64>, b: &Rotation3<f64>) -> f64 {
        (a.inverse() * b).angle()
    }

    #[test]
    fn test_camera_position_is_minus_rt_t() {
        let pose = Pose::from_rvec_tvec(&Vector3::new(0.2, -0.1, 0.3), &Vector3::new(0.1, 0.2, 0.5));
        let expected = -(pose.rotation().matrix().transpose() * pose.translation());
        let position = pose.camera_position();
        assert_relative_eq!(position, expected, epsilon = 1e-12);
        // The camera center maps to the camera-frame origin.
        assert_relative_eq!(pose.transform_point(&position), Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_rvec_round_trip() {
        let rvec = Vector3::new(0.3, -0.2, 0.1);
        let pose = Pose::from_rvec_tvec(&rvec, &Vector3::zeros());
        assert_relative_eq!(pose.rvec(), rvec, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_reprojection_round_trip() {
        let calibration = recorded_calibration();
        let target = TargetSpec::new(10, 7, 0.018).unwrap();
        let poses = [
            Pose::from_rvec_tvec(&Vector3::new(0.1, -0.2, 0.05), &Vector3::new(-0.08, -0.05, 0.45)),
            Pose::from_rvec_tvec(&Vector3::new(-0.35, 0.25, 0.6), &Vector3::new(-0.05, -0.06, 0.5)),
            Pose::from_rvec_tvec(&Vector3::new(2.8, 0.3, -0.1), &Vector3::new(-0.07, 0.04, 0.6)),
        ];

        for ground_truth in poses {
            let set = synthetic_set(&calibration, &target, &ground_truth);
            let solution = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap();
            assert!(solution.reprojection.rmse < 0.5, "rmse {}", solution.reprojection.rmse);

            let reprojected = project_points(&calibration, &solution.pose, set.object_points());
            for (observed, predicted) in set.image_points().iter().zip(&reprojected) {
                assert!((observed - predicted).norm() < 0.5);
            }
            assert_relative_eq!(
                solution.pose.translation(),
                ground_truth.translation(),
                epsilon = 1e-6
            );
            assert!(rotation_angle_between(solution.pose.rotation(), ground_truth.rotation()) < 1e-6);
        }
    }

    #[test]
    fn test_solve_frontal_pose() {
        let calibration = pinhole_calibration();
        let target = TargetSpec::new(10, 7, 0.018).unwrap();
        let d = 0.5;
        let ground_truth = Pose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, d));
        let set = synthetic_set(&calibration, &target, &ground_truth);

        let solution = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap();
        assert!(rotation_angle_between(solution.pose.rotation(), &Rotation3::identity()) < 1e-8);
        assert_relative_eq!(
            solution.pose.translation(),
            &Vector3::new(0.0, 0.0, d),
            epsilon = 1e-8
        );

        let position = solution.pose.camera_position();
        assert_relative_eq!(position.x, 0.0, epsilon = 1e-8);
        assert_relative_eq!(position.y, 0.0, epsilon = 1e-8);
        assert_relative_eq!(position.z, -d, epsilon = 1e-8);
    }

    #[test]
    fn test_solve_minimal_square() {
        let calibration = pinhole_calibration();
        let target = TargetSpec::new(2, 2, 0.1).unwrap();
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(0.2, 0.1, -0.1), &Vector3::new(-0.05, -0.05, 0.8));
        let set = synthetic_set(&calibration, &target, &ground_truth);
        let solution = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap();
        assert!(solution.reprojection.rmse < 0.5);
        assert_relative_eq!(
            solution.pose.camera_position(),
            ground_truth.camera_position(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_solve_is_deterministic() {
        let calibration = recorded_calibration();
        let target = TargetSpec::new(10, 7, 0.018).unwrap();
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(0.3, -0.1, 0.2), &Vector3::new(-0.06, -0.04, 0.4));
        let mut set_points = project_points(&calibration, &ground_truth, &target.object_points());
        // Perturb deterministically so the optimizer has work to do.
        for (i, p) in set_points.iter_mut().enumerate() {
            p.x += 0.2 * ((i * 7 % 5) as f64 - 2.0) / 2.0;
            p.y -= 0.2 * ((i * 3 % 5) as f64 - 2.0) / 2.0;
        }
        let set = CorrespondenceSet::build(&target, Some(&set_points)).unwrap();

        let first = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap();
        let second = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap();
        assert_eq!(first.pose, second.pose);
        assert_eq!(first.reprojection.rmse, second.reprojection.rmse);
    }

    #[test]
    fn test_solve_rejects_too_few_points() {
        let set = CorrespondenceSet::from_raw(
            vec![Vector3::zeros(), Vector3::x(), Vector3::y()],
            vec![Vector2::zeros(), Vector2::x(), Vector2::y()],
        );
        let err = solve_pnp(&pinhole_calibration(), &set, &SolverOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PoseError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_solve_rejects_collinear_points() {
        let objects: Vec<_> = (0..6).map(|i| Vector3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let images: Vec<_> = (0..6).map(|i| Vector2::new(100.0 + 10.0 * i as f64, 200.0)).collect();
        let set = CorrespondenceSet::from_raw(objects, images);
        let err = solve_pnp(&pinhole_calibration(), &set, &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, PoseError::Degenerate(_)), "{err:?}");
    }

    #[test]
    fn test_solve_rejects_collinear_image_points() {
        // A valid board whose corners were all detected on one image row.
        let calibration = recorded_calibration();
        let target = TargetSpec::new(10, 7, 0.018).unwrap();
        for step in [0.05, 1.0, 20.0] {
            let corners: Vec<_> = (0..target.point_count())
                .map(|i| {
                    let x = 800.0 + (i % 10) as f64 * step + (i / 10) as f64 * 0.3 * step;
                    Vector2::new(x, 300.0)
                })
                .collect();
            let set = CorrespondenceSet::build(&target, Some(&corners)).unwrap();
            let err = solve_pnp(&calibration, &set, &SolverOptions::default()).unwrap_err();
            assert!(matches!(err, PoseError::Degenerate(_)), "step {step}: {err:?}");
        }
    }

    #[test]
    fn test_solve_rejects_non_planar_points() {
        let objects = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(0.0, 0.1, 0.0),
            Vector3::new(0.1, 0.1, 0.1),
            Vector3::new(0.05, 0.02, -0.1),
        ];
        let images = vec![Vector2::new(10.0, 10.0); 5];
        let set = CorrespondenceSet::from_raw(objects, images);
        let err = solve_pnp(&pinhole_calibration(), &set, &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, PoseError::NonPlanarObject { .. }), "{err:?}");
    }

    #[test]
    fn test_solve_rejects_inconsistent_observations() {
        let calibration = pinhole_calibration();
        let target = TargetSpec::new(4, 3, 0.05).unwrap();
        let ground_truth =
            Pose::from_rvec_tvec(&Vector3::new(0.1, 0.1, 0.0), &Vector3::new(-0.05, -0.05, 0.6));
        let mut detected = project_points(&calibration, &ground_truth, &target.object_points());
        // Swap two corners so no rigid pose explains the observations.
        detected.swap(0, 11);
        let set = CorrespondenceSet::build(&target, Some(&detected)).unwrap();
        let options = SolverOptions {
            max_rms_px: 1.0,
            ..SolverOptions::default()
        };
        let err = solve_pnp(&calibration, &set, &options).unwrap_err();
        assert!(
            matches!(
                err,
                PoseError::ReprojectionTooLarge { .. }
                    | PoseError::BehindCamera
                    | PoseError::NotConverged(_)
            ),
            "{err:?}"
        );
    }
}
