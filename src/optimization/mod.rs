//! The `optimization` module provides the pose refinement used by the PnP solver.
//!
//! This module defines the [`Optimizer`] trait, which outlines the common
//! interface of a two-stage estimator:
//! 1. A linear estimation step that produces a closed-form initial guess.
//! 2. A non-linear optimization step (Levenberg-Marquardt through
//!    `tiny_solver`) that minimises the reprojection error between observed
//!    2D image points and projected 3D object points.
//!
//! The concrete cost for camera pose estimation lives in [`pnp`].

pub mod pnp;

pub use pnp::PnpOptimizationCost;

use crate::geometry::ProjectionError;
use crate::pose::PoseError;

/// Limits and thresholds for the pose solver.
///
/// These are compiled-in defaults; they are not part of the runtime
/// configuration surface.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Iteration budget of the Levenberg-Marquardt refinement.
    pub max_iterations: usize,
    /// Largest accepted RMS reprojection error, in pixels.
    pub max_rms_px: f64,
    /// Largest accepted ratio of out-of-plane to in-plane spread of the
    /// object points.
    pub planarity_tolerance: f64,
    /// Log optimizer progress at `info` level.
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_rms_px: 3.0,
            planarity_tolerance: 1e-6,
            verbose: false,
        }
    }
}

/// A trait for two-stage estimation tasks.
///
/// Types implementing `Optimizer` hold a set of 3D-2D correspondences and
/// refine an estimate by minimising the reprojection error.
pub trait Optimizer {
    /// Computes a closed-form initial estimate.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the estimate was computed and stored.
    /// * `Err(PoseError)` - If the data is insufficient or degenerate.
    fn linear_estimation(&mut self) -> Result<(), PoseError>
    where
        Self: Sized;

    /// Performs non-linear optimization starting from the current estimate.
    ///
    /// Runs [`Optimizer::linear_estimation`] first when no estimate exists.
    ///
    /// # Arguments
    ///
    /// * `verbose` - If `true`, the optimizer logs progress at `info` level.
    fn optimize(&mut self, verbose: bool) -> Result<(), PoseError>;

    /// Reprojection statistics of the current estimate.
    fn compute_reprojection_error(&self) -> Result<ProjectionError, PoseError>;
}
