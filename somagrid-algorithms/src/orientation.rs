//! Principal axes and axis-aligned frame snapping
//!
//! A cluster's covariance is reduced to two principal directions by power
//! iteration, completed to a right-handed basis and snapped to the nearest of
//! the 24 proper axis-aligned rotations.

use serde::{Deserialize, Serialize};
use somagrid_core::{AxisRotation, Matrix3, OrientedFrame, Point3f, Vector3f};
use std::sync::RwLock;

/// Orientation estimation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Power iteration steps per principal axis
    pub power_iterations: usize,
    /// Reuse the first snapped rotation for every later cluster
    pub lock_axes: bool,
    /// Clusters with fewer points are not oriented at all
    pub min_points_for_fit: usize,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            power_iterations: 16,
            lock_axes: true,
            min_points_for_fit: 60,
        }
    }
}

/// Centroid and estimated (unsnapped) principal basis of a cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalAxes {
    pub centroid: Point3f,
    pub axes: [Vector3f; 3],
}

const FIRST_SEED: [f32; 3] = [1.0, 0.2, 0.1];
const SECOND_SEED: [f32; 3] = [0.3, 1.0, 0.2];
const UNDERFLOW: f32 = 1e-12;

/// Centroid and population covariance of the indexed points
pub fn centroid_and_covariance(points: &[Point3f], indices: &[usize]) -> (Point3f, Matrix3<f32>) {
    let n = indices.len().max(1) as f32;
    let centroid = indices
        .iter()
        .fold(Point3f::origin(), |acc, &i| acc + points[i].coords)
        / n;

    let mut cov = Matrix3::zeros();
    for &i in indices {
        let d = points[i] - centroid;
        cov += d * d.transpose();
    }
    (centroid, cov / n)
}

/// Dominant eigenvector estimate of `matrix` starting from `seed`
///
/// Stops early when the product underflows, in which case the last
/// normalised iterate (possibly the seed itself) is returned.
pub fn power_iterate(matrix: &Matrix3<f32>, seed: Vector3f, iterations: usize) -> Vector3f {
    let mut v = seed.try_normalize(UNDERFLOW).unwrap_or_else(Vector3f::x);
    for _ in 0..iterations {
        let av = matrix * v;
        let n = av.norm();
        if n < UNDERFLOW {
            break;
        }
        v = av / n;
    }
    v
}

fn reject_from(v: &Vector3f, axis: &Vector3f) -> Option<Vector3f> {
    (v - axis * v.dot(axis)).try_normalize(UNDERFLOW)
}

/// Any unit vector orthogonal to `axis`
fn any_orthogonal(axis: &Vector3f) -> Vector3f {
    let helper = if axis.x.abs() < 0.9 { Vector3f::x() } else { Vector3f::y() };
    reject_from(&helper, axis).unwrap_or_else(Vector3f::z)
}

/// Estimate the right-handed principal basis of the indexed points
///
/// # Arguments
/// * `points` - The full cloud
/// * `indices` - The cluster's members
/// * `iterations` - Power iteration steps per axis
///
/// # Returns
/// * `PrincipalAxes` - Centroid plus orthonormal `v0`, `v1`, `v2`
pub fn principal_axes(points: &[Point3f], indices: &[usize], iterations: usize) -> PrincipalAxes {
    let (centroid, cov) = centroid_and_covariance(points, indices);

    let v0 = power_iterate(&cov, Vector3f::from(FIRST_SEED), iterations);

    let mut seed = Vector3f::from(SECOND_SEED);
    for _ in 0..2 {
        seed = reject_from(&seed, &v0).unwrap_or_else(|| any_orthogonal(&v0));
    }
    // iterate in the complement of v0 so rounding along v0 is not amplified
    let projector = Matrix3::identity() - v0 * v0.transpose();
    let v1 = power_iterate(&(projector * cov * projector), seed, iterations);
    let v1 = reject_from(&v1, &v0).unwrap_or(seed);

    let cross = v0.cross(&v1);
    let mut v2 = cross.try_normalize(UNDERFLOW).unwrap_or_else(|| any_orthogonal(&v0));
    if cross.dot(&v2) < 0.0 {
        v2 = -v2;
    }

    PrincipalAxes {
        centroid,
        axes: [v0, v1, v2],
    }
}

/// The axis rotation maximising `sum_i |dot(axes[i], rotation.axis(i))|`
///
/// Ties keep the earliest candidate of [`AxisRotation::all`].
pub fn snap_to_axes(axes: &[Vector3f; 3]) -> AxisRotation {
    let mut best = AxisRotation::identity();
    let mut best_score = f32::NEG_INFINITY;
    for candidate in AxisRotation::all() {
        let score: f32 = (0..3).map(|i| axes[i].dot(&candidate.axis(i)).abs()).sum();
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

/// Shared snapped rotation for one extractor
///
/// Written at most once until [`AxisLock::reset`]; every reader after the
/// first write observes the same rotation.
#[derive(Debug, Default)]
pub struct AxisLock {
    slot: RwLock<Option<AxisRotation>>,
}

impl AxisLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The locked rotation, if any
    pub fn get(&self) -> Option<AxisRotation> {
        match self.slot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Return the locked rotation, publishing `candidate` if none is set yet
    pub fn get_or_init(&self, candidate: AxisRotation) -> AxisRotation {
        if let Some(locked) = self.get() {
            return locked;
        }
        let mut guard = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard.get_or_insert(candidate)
    }

    pub fn is_locked(&self) -> bool {
        self.get().is_some()
    }

    /// Clear the lock so the next oriented cluster publishes a new rotation
    pub fn reset(&self) {
        let mut guard = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }
}

/// Orient one cluster, honouring `lock` when given
pub fn estimate_frame(
    points: &[Point3f],
    indices: &[usize],
    config: &OrientationConfig,
    lock: Option<&AxisLock>,
) -> OrientedFrame {
    let pca = principal_axes(points, indices, config.power_iterations);
    let rotation = match lock {
        Some(lock) if config.lock_axes => match lock.get() {
            Some(locked) => locked,
            None => lock.get_or_init(snap_to_axes(&pca.axes)),
        },
        _ => snap_to_axes(&pca.axes),
    };
    OrientedFrame::new(pca.centroid, rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Box of lattice points with extents scaled per axis, rotated by `r`
    fn box_points(counts: [usize; 3], spacing: [f32; 3], r: &Matrix3<f32>) -> Vec<Point3f> {
        let mut pts = Vec::new();
        for i in 0..counts[0] {
            for j in 0..counts[1] {
                for k in 0..counts[2] {
                    let local = Vector3f::new(
                        (i as f32 - (counts[0] - 1) as f32 * 0.5) * spacing[0],
                        (j as f32 - (counts[1] - 1) as f32 * 0.5) * spacing[1],
                        (k as f32 - (counts[2] - 1) as f32 * 0.5) * spacing[2],
                    );
                    pts.push(Point3f::new(0.5, -0.2, 1.0) + r * local);
                }
            }
        }
        pts
    }

    #[test]
    fn test_principal_axes_orthonormal() {
        let pts = box_points([12, 6, 3], [0.01, 0.01, 0.01], &Matrix3::identity());
        let indices: Vec<usize> = (0..pts.len()).collect();
        let pca = principal_axes(&pts, &indices, 16);

        let [v0, v1, v2] = pca.axes;
        assert_relative_eq!(v0.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(v1.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(v2.norm(), 1.0, epsilon = 1e-5);
        assert!(v0.dot(&v1).abs() < 1e-4);
        assert!(v0.cross(&v1).dot(&v2) > 0.99);
        assert!(v0.x.abs() > 0.99, "longest extent should dominate: {v0:?}");
        assert_relative_eq!(pca.centroid, Point3f::new(0.5, -0.2, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_covariance_falls_back_to_seed() {
        let pts = vec![Point3f::new(1.0, 2.0, 3.0); 10];
        let indices: Vec<usize> = (0..pts.len()).collect();
        let pca = principal_axes(&pts, &indices, 16);

        let seed = Vector3f::from(FIRST_SEED).normalize();
        assert_relative_eq!(pca.axes[0], seed, epsilon = 1e-6);
        let frame = OrientedFrame::new(pca.centroid, snap_to_axes(&pca.axes));
        assert!(frame.is_orthonormal(1e-5));
    }

    #[test]
    fn test_snap_recovers_axis_rotation() {
        for rotation in AxisRotation::all() {
            let tilt = nalgebra::Rotation3::from_euler_angles(0.05, -0.04, 0.03);
            let axes = [
                tilt * rotation.axis(0),
                tilt * rotation.axis(1),
                tilt * rotation.axis(2),
            ];
            assert_eq!(snap_to_axes(&axes), rotation);
        }
    }

    #[test]
    fn test_snap_identity_for_axis_aligned_box() {
        let pts = box_points([14, 10, 6], [0.005, 0.005, 0.005], &Matrix3::identity());
        let indices: Vec<usize> = (0..pts.len()).collect();
        let pca = principal_axes(&pts, &indices, 16);
        let snapped = snap_to_axes(&pca.axes);

        // axes may flip sign but must stay on the canonical lines
        for i in 0..3 {
            assert_relative_eq!(snapped.axis(i).abs(), Vector3f::from_fn(|r, _| (r == i) as u8 as f32));
        }
    }

    #[test]
    fn test_axis_lock_lifecycle() {
        let lock = AxisLock::new();
        assert!(lock.get().is_none());

        let rotations = AxisRotation::all();
        assert_eq!(lock.get_or_init(rotations[5]), rotations[5]);
        assert_eq!(lock.get_or_init(rotations[9]), rotations[5]);
        assert!(lock.is_locked());

        lock.reset();
        assert!(!lock.is_locked());
        assert_eq!(lock.get_or_init(rotations[9]), rotations[9]);
    }

    #[test]
    fn test_estimate_frame_uses_lock() {
        let pts = box_points([12, 6, 3], [0.01, 0.01, 0.01], &Matrix3::identity());
        let indices: Vec<usize> = (0..pts.len()).collect();
        let lock = AxisLock::new();
        let forced = AxisRotation::all()[13];
        lock.get_or_init(forced);

        let config = OrientationConfig::default();
        let frame = estimate_frame(&pts, &indices, &config, Some(&lock));
        assert_eq!(frame.rotation, forced);

        let unlocked = OrientationConfig {
            lock_axes: false,
            ..Default::default()
        };
        let frame = estimate_frame(&pts, &indices, &unlocked, Some(&lock));
        assert_ne!(frame.rotation, forced);
    }
}
