//! Oriented frames and axis-aligned rotations

use crate::point::{Point3f, Vector3f};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// A proper rotation that maps each local axis onto a signed canonical axis
///
/// The columns of `matrix` are the images of the local x, y and z axes.
/// Every entry is -1, 0 or 1 and the determinant is +1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRotation {
    pub matrix: Matrix3<f32>,
}

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

impl AxisRotation {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Enumerate the 24 proper axis-aligned rotations
    ///
    /// Permutations of the canonical axes combined with sign choices, keeping
    /// only the right-handed ones. The identity comes first.
    pub fn all() -> Vec<AxisRotation> {
        let mut out = Vec::with_capacity(24);
        for perm in PERMUTATIONS {
            for signs in 0..8u8 {
                let column = |i: usize| {
                    let sign = if signs & (1 << i) == 0 { 1.0 } else { -1.0 };
                    canonical_axis(perm[i]) * sign
                };
                let (c0, c1, c2) = (column(0), column(1), column(2));
                if c0.cross(&c1).dot(&c2) < 0.0 {
                    continue;
                }
                out.push(AxisRotation {
                    matrix: Matrix3::from_columns(&[c0, c1, c2]),
                });
            }
        }
        out
    }

    /// Image of local axis `i` (0 = x, 1 = y, 2 = z)
    pub fn axis(&self, i: usize) -> Vector3f {
        self.matrix.column(i).into_owned()
    }

    pub fn determinant(&self) -> f32 {
        self.matrix.determinant()
    }
}

impl Default for AxisRotation {
    fn default() -> Self {
        Self::identity()
    }
}

fn canonical_axis(i: usize) -> Vector3f {
    match i {
        0 => Vector3f::x(),
        1 => Vector3f::y(),
        _ => Vector3f::z(),
    }
}

/// Origin plus a right-handed orthonormal basis
///
/// Local coordinates are `(dot(p - origin, v0), dot(p - origin, v1), dot(p - origin, v2))`.
/// Local y (`v1`) is the layer axis used by cell voting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedFrame {
    pub origin: Point3f,
    pub rotation: AxisRotation,
}

impl OrientedFrame {
    pub fn new(origin: Point3f, rotation: AxisRotation) -> Self {
        Self { origin, rotation }
    }

    pub fn v0(&self) -> Vector3f {
        self.rotation.axis(0)
    }

    pub fn v1(&self) -> Vector3f {
        self.rotation.axis(1)
    }

    pub fn v2(&self) -> Vector3f {
        self.rotation.axis(2)
    }

    /// Express a world point in this frame
    pub fn to_local(&self, point: &Point3f) -> Vector3f {
        self.rotation.matrix.transpose() * (point - self.origin)
    }

    /// Map local coordinates back to world space
    pub fn to_world(&self, local: &Vector3f) -> Point3f {
        self.origin + self.rotation.matrix * local
    }

    /// Map a local direction to world space (no translation)
    pub fn direction_to_world(&self, local: &Vector3f) -> Vector3f {
        self.rotation.matrix * local
    }

    /// Pairwise orthogonal, unit length and right-handed within `epsilon`
    pub fn is_orthonormal(&self, epsilon: f32) -> bool {
        let (a, b, c) = (self.v0(), self.v1(), self.v2());
        let unit = [a, b, c].iter().all(|v| (v.norm() - 1.0).abs() <= epsilon);
        let orthogonal =
            a.dot(&b).abs() <= epsilon && a.dot(&c).abs() <= epsilon && b.dot(&c).abs() <= epsilon;
        unit && orthogonal && (self.rotation.determinant() - 1.0).abs() <= epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_all_rotations_are_proper_and_distinct() {
        let rotations = AxisRotation::all();
        assert_eq!(rotations.len(), 24);

        for (i, r) in rotations.iter().enumerate() {
            assert_relative_eq!(r.determinant(), 1.0);
            assert_relative_eq!(r.matrix.transpose() * r.matrix, Matrix3::identity());
            for other in &rotations[i + 1..] {
                assert_ne!(r.matrix, other.matrix);
            }
        }
        assert_eq!(rotations[0], AxisRotation::identity());
    }

    #[test]
    fn test_frame_local_world_roundtrip() {
        let rotation = AxisRotation::all()[7];
        let frame = OrientedFrame::new(Point3f::new(1.0, -2.0, 0.5), rotation);
        let p = Point3f::new(0.3, 0.7, -1.1);

        let local = frame.to_local(&p);
        assert_relative_eq!(frame.to_world(&local), p, epsilon = 1e-6);
        assert!(frame.is_orthonormal(1e-6));
    }
}
