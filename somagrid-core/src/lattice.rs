//! Cubic lattice description, cell keys and faces

use crate::point::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// Periodic cubic lattice in an oriented frame's local coordinates
///
/// `offset` holds, per axis, the local coordinate of a cell center, wrapped to
/// `[-unit/2, unit/2)`. Cell `i` on an axis is centred at `offset + i * unit`
/// and spans `[offset + (i - 0.5) * unit, offset + (i + 0.5) * unit)`, so the
/// cell containing the frame origin is index 0 whenever the origin is within half
/// a unit of a cell center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub unit: f32,
    pub offset: Vector3f,
}

impl GridSpec {
    pub fn new(unit: f32, offset: Vector3f) -> Self {
        Self {
            unit,
            offset: offset.map(|o| wrap_phase(o, unit)),
        }
    }

    /// Integer cell index along one axis for a local coordinate
    pub fn index_along(&self, axis: usize, coord: f32) -> i32 {
        ((coord - self.offset[axis]) / self.unit + 0.5).floor() as i32
    }

    /// Fractional position within the containing cell, in `[0, 1)`
    pub fn fraction_along(&self, axis: usize, coord: f32) -> f32 {
        let t = (coord - self.offset[axis]) / self.unit + 0.5;
        let f = t - t.floor();
        if f >= 1.0 {
            0.0
        } else {
            f
        }
    }

    /// Cell containing a local point
    pub fn cell_of(&self, local: &Vector3f) -> CellKey {
        CellKey::new(
            self.index_along(0, local.x),
            self.index_along(1, local.y),
            self.index_along(2, local.z),
        )
    }

    /// Continuous local center of a cell
    pub fn cell_center(&self, cell: CellKey) -> Vector3f {
        Vector3f::new(
            self.offset.x + cell.ix as f32 * self.unit,
            self.offset.y + cell.iy as f32 * self.unit,
            self.offset.z + cell.iz as f32 * self.unit,
        )
    }
}

/// Wrap a center phase into `[-unit/2, unit/2)`
pub fn wrap_phase(offset: f32, unit: f32) -> f32 {
    if !(unit > 0.0) || !offset.is_finite() {
        return 0.0;
    }
    let wrapped = offset - unit * (offset / unit).round();
    if wrapped >= 0.5 * unit {
        wrapped - unit
    } else if wrapped < -0.5 * unit {
        wrapped + unit
    } else {
        wrapped
    }
}

/// Integer triple identifying one lattice cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub ix: i32,
    pub iy: i32,
    pub iz: i32,
}

impl CellKey {
    pub const fn new(ix: i32, iy: i32, iz: i32) -> Self {
        Self { ix, iy, iz }
    }

    /// Neighbouring cell one step along `dir`
    pub fn step(&self, dir: FaceDirection) -> CellKey {
        let [dx, dy, dz] = dir.offset();
        CellKey::new(self.ix + dx, self.iy + dy, self.iz + dz)
    }

    /// Index along a single axis
    pub fn along(&self, axis: usize) -> i32 {
        match axis {
            0 => self.ix,
            1 => self.iy,
            _ => self.iz,
        }
    }

    /// Shift along a single axis
    pub fn shifted(&self, axis: usize, delta: i32) -> CellKey {
        let mut k = *self;
        match axis {
            0 => k.ix += delta,
            1 => k.iy += delta,
            _ => k.iz += delta,
        }
        k
    }
}

/// One of the six face directions of a lattice cube, in local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceDirection {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl FaceDirection {
    pub const ALL: [FaceDirection; 6] = [
        FaceDirection::PosX,
        FaceDirection::NegX,
        FaceDirection::PosY,
        FaceDirection::NegY,
        FaceDirection::PosZ,
        FaceDirection::NegZ,
    ];

    /// Normal axis (0 = x, 1 = y, 2 = z)
    pub fn axis(&self) -> usize {
        match self {
            FaceDirection::PosX | FaceDirection::NegX => 0,
            FaceDirection::PosY | FaceDirection::NegY => 1,
            FaceDirection::PosZ | FaceDirection::NegZ => 2,
        }
    }

    pub fn sign(&self) -> i32 {
        match self {
            FaceDirection::PosX | FaceDirection::PosY | FaceDirection::PosZ => 1,
            _ => -1,
        }
    }

    pub fn offset(&self) -> [i32; 3] {
        let mut o = [0; 3];
        o[self.axis()] = self.sign();
        o
    }

    /// Unit normal in local coordinates
    pub fn normal(&self) -> Vector3f {
        let [x, y, z] = self.offset();
        Vector3f::new(x as f32, y as f32, z as f32)
    }

    /// The two in-plane local axes, in ascending order
    pub fn tangent_axes(&self) -> (usize, usize) {
        match self.axis() {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FaceDirection::PosX => "+X",
            FaceDirection::NegX => "-X",
            FaceDirection::PosY => "+Y",
            FaceDirection::NegY => "-Y",
            FaceDirection::PosZ => "+Z",
            FaceDirection::NegZ => "-Z",
        }
    }
}

/// A visible square face of an accepted cell, in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub cell: CellKey,
    pub direction: FaceDirection,
    pub center: Point3f,
    pub tangent_u: Vector3f,
    pub tangent_v: Vector3f,
    pub half_size: f32,
}

impl Face {
    /// Side length of the emitted square
    pub fn side(&self) -> f32 {
        2.0 * self.half_size
    }

    /// Corner positions, counter-clockwise in the (u, v) tangent plane
    pub fn corners(&self) -> [Point3f; 4] {
        let a = self.tangent_u * self.half_size;
        let b = self.tangent_v * self.half_size;
        [
            self.center + a + b,
            self.center - a + b,
            self.center - a - b,
            self.center + a - b,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wrap_phase_range() {
        let u = 0.03;
        for raw in [-0.1f32, -0.015, -0.0149, 0.0, 0.014, 0.015, 0.029, 0.07] {
            let w = wrap_phase(raw, u);
            assert!(w >= -0.5 * u && w < 0.5 * u, "{raw} wrapped to {w}");
            let k = ((raw - w) / u).round();
            assert_relative_eq!(raw - w, k * u, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cell_indexing_around_origin() {
        let grid = GridSpec::new(0.03, Vector3f::zeros());

        assert_eq!(grid.cell_of(&Vector3f::new(0.0, 0.0, 0.0)), CellKey::new(0, 0, 0));
        assert_eq!(grid.cell_of(&Vector3f::new(0.014, -0.014, 0.0)), CellKey::new(0, 0, 0));
        assert_eq!(grid.cell_of(&Vector3f::new(0.016, -0.016, 0.046)), CellKey::new(1, -1, 2));
        assert_relative_eq!(grid.fraction_along(0, 0.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(grid.cell_center(CellKey::new(1, 0, -1)), Vector3f::new(0.03, 0.0, -0.03));
    }

    #[test]
    fn test_face_direction_geometry() {
        for dir in FaceDirection::ALL {
            let (a, b) = dir.tangent_axes();
            assert!(a != dir.axis() && b != dir.axis() && a < b);
            assert_relative_eq!(dir.normal().norm(), 1.0);
        }
        let cell = CellKey::new(0, 0, 0);
        assert_eq!(cell.step(FaceDirection::NegY), CellKey::new(0, -1, 0));
        assert_eq!(cell.shifted(2, 3), CellKey::new(0, 0, 3));
    }
}
