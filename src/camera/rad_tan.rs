//! Radial-tangential (Brown-Conrady) distortion polynomial.
//!
//! The forward model is written once, generically over
//! [`nalgebra::RealField`], so the projector (plain `f64`) and the
//! tiny-solver residual (dual numbers) evaluate exactly the same polynomial.
//!
//! For an ideal normalized point `(x, y)` with `r² = x² + y²`:
//!
//! ```text
//! radial = 1 + k1·r² + k2·r⁴ + k3·r⁶
//! x_d = x·radial + 2·p1·x·y + p2·(r² + 2·x²)
//! y_d = y·radial + p1·(r² + 2·y²) + 2·p2·x·y
//! ```

use crate::camera::CameraModelError;
use nalgebra::{Matrix2, RealField, Vector2};

/// Tolerance on the residual and step norm of the undistortion iteration.
const UNDISTORT_EPS: f64 = 1e-12;
const UNDISTORT_MAX_ITERATIONS: u32 = 50;

/// Applies the distortion polynomial to an ideal normalized point.
pub fn distort<T: RealField>(x: T, y: T, distortions: &[f64; 5]) -> (T, T) {
    let k1: T = nalgebra::convert(distortions[0]);
    let k2: T = nalgebra::convert(distortions[1]);
    let p1: T = nalgebra::convert(distortions[2]);
    let p2: T = nalgebra::convert(distortions[3]);
    let k3: T = nalgebra::convert(distortions[4]);
    let one = T::one();
    let two: T = nalgebra::convert(2.0);

    let xy = x.clone() * y.clone();
    let x2 = x.clone() * x.clone();
    let y2 = y.clone() * y.clone();
    let r2 = x2.clone() + y2.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();

    let radial = one + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let x_distorted = x * radial.clone()
        + two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x2);
    let y_distorted =
        y * radial + p1 * (r2 + two.clone() * y2) + two * p2 * xy;

    (x_distorted, y_distorted)
}

/// Jacobian of [`distort`] with respect to the ideal point `(x, y)`.
pub fn distortion_jacobian(x: f64, y: f64, distortions: &[f64; 5]) -> Matrix2<f64> {
    let [k1, k2, p1, p2, k3] = *distortions;
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;
    // d(radial)/d(r²)
    let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;

    let j00 = radial + 2.0 * x * x * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
    let j01 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
    let j10 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
    let j11 = radial + 2.0 * y * y * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

    Matrix2::new(j00, j01, j10, j11)
}

/// Inverts the distortion polynomial with Newton's method.
///
/// `distorted` is a normalized image coordinate after the intrinsic matrix has
/// been removed. The iteration starts at the distorted point itself.
///
/// # Errors
///
/// [`CameraModelError::NumericalError`] when the Jacobian becomes singular,
/// the iterate turns non-finite, or the iteration budget runs out.
pub fn undistort(
    distorted: &Vector2<f64>,
    distortions: &[f64; 5],
) -> Result<Vector2<f64>, CameraModelError> {
    let mut point = *distorted;

    for _ in 0..UNDISTORT_MAX_ITERATIONS {
        let (xd, yd) = distort(point.x, point.y, distortions);
        let error = Vector2::new(xd, yd) - distorted;
        if error.norm() < UNDISTORT_EPS {
            return Ok(point);
        }

        let jacobian = distortion_jacobian(point.x, point.y, distortions);
        let delta = jacobian.try_inverse().map(|inv| inv * error).ok_or_else(|| {
            CameraModelError::NumericalError("Distortion Jacobian is singular".to_string())
        })?;

        point -= delta;
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(CameraModelError::NumericalError(
                "Undistortion diverged".to_string(),
            ));
        }
        if delta.norm() < UNDISTORT_EPS {
            return Ok(point);
        }
    }

    Err(CameraModelError::NumericalError(format!(
        "Undistortion did not converge after {UNDISTORT_MAX_ITERATIONS} iterations"
    )))
}
