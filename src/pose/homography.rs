//! Linear pose initialisation for planar targets.
//!
//! The object points are expressed in the frame of their own plane, a
//! homography from that plane to the ideal normalized image plane is
//! estimated with the Hartley-normalized DLT, and the homography is
//! decomposed into `[r1 r2 t]`. Working in normalized coordinates means the
//! intrinsic matrix is already removed, so `H ~ [r1 r2 t]` directly.

use super::{Pose, PoseError};
use nalgebra::{DMatrix, Matrix2, Matrix3, Rotation3, Vector2, Vector3};

/// Smallest accepted ratio of minor to major spread of the image points.
const MIN_IMAGE_SPREAD: f64 = 1e-3;

/// Orthonormal frame attached to a plane of object points.
///
/// Columns 0 and 1 of `basis` span the plane, column 2 is its normal; the
/// basis is right-handed.
#[derive(Debug, Clone)]
pub struct PlaneFrame {
    origin: Vector3<f64>,
    basis: Matrix3<f64>,
}

impl PlaneFrame {
    /// Fits a plane to `points` by SVD of the centred coordinates.
    ///
    /// `planarity_tolerance` bounds the ratio of the smallest to the largest
    /// singular value.
    ///
    /// # Errors
    ///
    /// * [`PoseError::Degenerate`] for coincident or collinear points.
    /// * [`PoseError::NonPlanarObject`] when the points do not lie on a plane.
    pub fn fit(points: &[Vector3<f64>], planarity_tolerance: f64) -> Result<Self, PoseError> {
        if points.len() < 3 {
            return Err(PoseError::Degenerate(format!(
                "need at least 3 points to fit a plane, got {}",
                points.len()
            )));
        }

        let origin = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
        let mut scatter = Matrix3::zeros();
        for p in points {
            let d = p - origin;
            scatter += d * d.transpose();
        }

        let eigen = scatter.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let spread: Vec<f64> = order
            .iter()
            .map(|&i| eigen.eigenvalues[i].max(0.0).sqrt())
            .collect();

        if !(spread[0] > f64::EPSILON) {
            return Err(PoseError::Degenerate("object points coincide".to_string()));
        }
        if spread[1] / spread[0] < 1e-6 {
            return Err(PoseError::Degenerate("object points are collinear".to_string()));
        }
        let ratio = spread[2] / spread[0];
        if ratio > planarity_tolerance {
            return Err(PoseError::NonPlanarObject { ratio });
        }

        let u = eigen.eigenvectors.column(order[0]).normalize();
        let v = eigen.eigenvectors.column(order[1]).normalize();
        let n = u.cross(&v).normalize();
        let v = n.cross(&u);
        let basis = Matrix3::from_columns(&[u, v, n]);

        Ok(Self { origin, basis })
    }

    /// In-plane coordinates of a point.
    pub fn to_plane(&self, point: &Vector3<f64>) -> Vector2<f64> {
        let local = self.basis.transpose() * (point - self.origin);
        Vector2::new(local.x, local.y)
    }

    /// Re-expresses a pose of the plane frame as a pose of the object frame.
    fn compose(&self, plane_pose: &Pose) -> Pose {
        let rotation = plane_pose.rotation().matrix() * self.basis.transpose();
        let rotation = Rotation3::from_matrix_unchecked(rotation);
        let translation = plane_pose.translation() - rotation * self.origin;
        Pose::new(rotation, translation)
    }
}

/// Similarity transform moving the centroid to the origin and the mean
/// distance to `sqrt(2)`.
fn normalize_points_2d(points: &[Vector2<f64>]) -> Option<(Vec<Vector2<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector2<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !(mean_dist > f64::EPSILON) || !mean_dist.is_finite() {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let transform = Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points.iter().map(|p| (p - centroid) * s).collect();
    Some((normalized, transform))
}

/// Ratio of the minor to the major principal spread of 2D points; `0.0` when
/// the points coincide.
fn spread_ratio_2d(points: &[Vector2<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let centroid = points.iter().sum::<Vector2<f64>>() / points.len() as f64;
    let mut scatter = Matrix2::zeros();
    for p in points {
        let d = p - centroid;
        scatter += d * d.transpose();
    }
    let eigenvalues = scatter.symmetric_eigenvalues();
    let major = eigenvalues.max().max(0.0).sqrt();
    let minor = eigenvalues.min().max(0.0).sqrt();
    if major > f64::EPSILON && major.is_finite() {
        minor / major
    } else {
        0.0
    }
}

/// Estimates `H` such that `image ~ H · world` with the normalized DLT.
///
/// # Errors
///
/// [`PoseError::Degenerate`] for fewer than 4 points, coincident points or a
/// failed decomposition.
pub fn dlt_homography(world: &[Vector2<f64>], image: &[Vector2<f64>]) -> Result<Matrix3<f64>, PoseError> {
    let n = world.len();
    if n < 4 || image.len() != n {
        return Err(PoseError::Degenerate(format!(
            "homography needs at least 4 matched points, got {n}"
        )));
    }

    let (world_n, t_w) = normalize_points_2d(world)
        .ok_or_else(|| PoseError::Degenerate("plane points coincide".to_string()))?;
    let (image_n, t_i) = normalize_points_2d(image)
        .ok_or_else(|| PoseError::Degenerate("image points coincide".to_string()))?;

    // At least 9 rows so the SVD exposes the full right null space.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| PoseError::Degenerate("svd failed".to_string()))?;
    let h_row = v_t.row(svd.singular_values.imin());

    let mut h = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h[(r, c)] = h_row[3 * r + c];
        }
    }

    let t_i_inv = t_i
        .try_inverse()
        .ok_or_else(|| PoseError::Degenerate("normalization is singular".to_string()))?;
    let h = t_i_inv * h * t_w;

    if !h.iter().all(|v| v.is_finite()) || h.norm() <= f64::EPSILON {
        return Err(PoseError::Degenerate("homography is not finite".to_string()));
    }
    Ok(h)
}

/// Decomposes a plane → normalized-image homography into a pose of the plane.
///
/// The rotation is projected onto SO(3) and the sign is chosen so the plane
/// lies in front of the camera.
///
/// # Errors
///
/// [`PoseError::Degenerate`] when the homography columns vanish.
pub fn pose_from_homography(h: &Matrix3<f64>) -> Result<Pose, PoseError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm1 = h1.norm();
    let norm2 = h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(PoseError::Degenerate(
            "homography cannot be decomposed".to_string(),
        ));
    }
    let mut lambda = 2.0 / (norm1 + norm2);
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let t = h3 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(PoseError::Degenerate(
            "homography cannot be decomposed".to_string(),
        ));
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(PoseError::Degenerate(
                "svd failed during rotation projection".to_string(),
            ))
        }
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    Ok(Pose::new(Rotation3::from_matrix_unchecked(r_orth), t))
}

/// Linear pose estimate from coplanar object points and ideal normalized
/// image points.
///
/// # Errors
///
/// * [`PoseError::Degenerate`] when either point set is coincident or
///   collinear. Collinear image points only arise when the board is seen
///   edge-on, which has no usable pose.
/// * [`PoseError::NonPlanarObject`] from the plane fit.
pub fn estimate_planar_pose(
    object_points: &[Vector3<f64>],
    normalized_points: &[Vector2<f64>],
    planarity_tolerance: f64,
) -> Result<Pose, PoseError> {
    let frame = PlaneFrame::fit(object_points, planarity_tolerance)?;
    let image_spread = spread_ratio_2d(normalized_points);
    if image_spread < MIN_IMAGE_SPREAD {
        return Err(PoseError::Degenerate(format!(
            "image points are collinear (spread ratio {image_spread:.2e})"
        )));
    }
    let plane_points: Vec<Vector2<f64>> = object_points.iter().map(|p| frame.to_plane(p)).collect();
    let h = dlt_homography(&plane_points, normalized_points)?;
    let plane_pose = pose_from_homography(&h)?;
    Ok(frame.compose(&plane_pose))
}
