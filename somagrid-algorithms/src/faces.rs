//! Boundary face extraction for accepted cells
//!
//! A face is emitted on every side of an accepted cell whose neighbour is not
//! accepted, provided enough cluster points lie in a slab around the face plane
//! and cover its in-plane window. Emitted squares have a fixed size that does
//! not depend on the fitted unit.

use serde::{Deserialize, Serialize};
use somagrid_core::{CellKey, Face, FaceDirection, GridSpec, OrientedFrame, Point3f, Vector3f};
use std::collections::{HashMap, HashSet};

/// Face emission and evidence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub enabled: bool,
    /// Side length of emitted squares (m)
    pub face_size: f32,
    /// Half thickness of the evidence slab along the face normal (m)
    pub half_thickness: f32,
    /// Lower bound for the slab half thickness (m)
    pub plane_distance_tol: f32,
    /// Coverage window half-size as a multiple of the face half-size
    pub inplane_slack: f32,
    /// Slab widening for frame tilt
    pub tilt_slab_multiplier: f32,
    /// Coverage grid resolution per side, clamped to `3..=16`
    pub coverage_grid: usize,
    pub min_coverage_frac: f32,
    pub min_coverage_cells: usize,
    /// Require evidence in at least three in-plane quadrants
    pub require_quadrants: bool,
    pub min_evidence_points: usize,
    /// Skip the evidence test and emit every boundary face
    pub emit_all_boundary_faces: bool,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            face_size: 0.025,
            half_thickness: 0.005,
            plane_distance_tol: 0.006,
            inplane_slack: 1.2,
            tilt_slab_multiplier: 2.0,
            coverage_grid: 6,
            min_coverage_frac: 0.25,
            min_coverage_cells: 6,
            require_quadrants: false,
            min_evidence_points: 6,
            emit_all_boundary_faces: false,
        }
    }
}

impl FaceConfig {
    pub fn half_size(&self) -> f32 {
        0.5 * self.face_size
    }

    fn slab_tolerance(&self) -> f32 {
        self.half_thickness.max(1e-4).max(self.plane_distance_tol) * self.tilt_slab_multiplier.max(1.0)
    }

    fn coverage_half(&self) -> f32 {
        self.half_size() * self.inplane_slack.max(1.0)
    }

    fn grid_resolution(&self) -> usize {
        self.coverage_grid.clamp(3, 16)
    }
}

/// `cell`'s neighbour across `dir` is not accepted
pub fn is_boundary(cell: CellKey, dir: FaceDirection, accepted: &HashSet<CellKey>) -> bool {
    !accepted.contains(&cell.step(dir))
}

/// Points supporting one candidate face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaceEvidence {
    pub hits: usize,
    pub occupied_cells: usize,
    pub quadrants: usize,
}

/// Gather evidence for a face of normal axis `axis` centred at `center` (local)
pub fn face_evidence(local: &[Vector3f], center: &Vector3f, axis: usize, config: &FaceConfig) -> FaceEvidence {
    let (a, b) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let tol = config.slab_tolerance();
    let half = config.coverage_half();
    let g = config.grid_resolution();
    let bin = 2.0 * half / g as f32;

    let mut occupied = vec![false; g * g];
    let mut evidence = FaceEvidence::default();
    let mut quadrants = [false; 4];

    for p in local {
        let d = p - center;
        if d[axis].abs() > tol {
            continue;
        }
        let (u, v) = (d[a], d[b]);
        if u.abs() > half || v.abs() > half {
            continue;
        }
        evidence.hits += 1;

        let iu = (((u + half) / bin).floor() as isize).clamp(0, g as isize - 1) as usize;
        let iv = (((v + half) / bin).floor() as isize).clamp(0, g as isize - 1) as usize;
        let slot = &mut occupied[iu * g + iv];
        if !*slot {
            *slot = true;
            evidence.occupied_cells += 1;
        }

        let q = match (u >= 0.0, v >= 0.0) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        quadrants[q] = true;
    }

    evidence.quadrants = quadrants.iter().filter(|&&q| q).count();
    evidence
}

/// Decide whether `evidence` confirms a face
pub fn is_confirmed(evidence: &FaceEvidence, config: &FaceConfig) -> bool {
    if evidence.hits < config.min_evidence_points {
        return false;
    }
    let g = config.grid_resolution();
    let frac = evidence.occupied_cells as f32 / (g * g) as f32;
    if frac < config.min_coverage_frac.clamp(0.0, 1.0) {
        return false;
    }
    if evidence.occupied_cells < config.min_coverage_cells.max(1) {
        return false;
    }
    !(config.require_quadrants && evidence.quadrants < 3)
}

/// Evidence test for the face of `cell` across `dir`
pub fn has_face_support(
    local: &[Vector3f],
    cell: CellKey,
    dir: FaceDirection,
    grid: &GridSpec,
    config: &FaceConfig,
) -> bool {
    let center = face_center_local(cell, dir, grid);
    is_confirmed(&face_evidence(local, &center, dir.axis(), config), config)
}

/// Local center of a face: the cell center moved half a unit along the normal
pub fn face_center_local(cell: CellKey, dir: FaceDirection, grid: &GridSpec) -> Vector3f {
    grid.cell_center(cell) + dir.normal() * (0.5 * grid.unit)
}

/// Emit the confirmed boundary faces of `cells`
///
/// # Arguments
/// * `cells` - Accepted cells of one cluster
/// * `local` - The cluster's points in the frame's local coordinates
/// * `frame` - Frame mapping local coordinates back to world space
/// * `grid` - The fitted lattice
/// * `config` - Face settings
///
/// # Returns
/// * `Vec<Face>` - World-space squares of side `config.face_size`
pub fn extract_faces(
    cells: &[CellKey],
    local: &[Vector3f],
    frame: &OrientedFrame,
    grid: &GridSpec,
    config: &FaceConfig,
) -> Vec<Face> {
    if !config.enabled {
        return Vec::new();
    }
    let accepted: HashSet<CellKey> = cells.iter().copied().collect();
    let half_size = config.half_size();

    let mut faces = Vec::new();
    for &cell in cells {
        for dir in FaceDirection::ALL {
            if !is_boundary(cell, dir, &accepted) {
                continue;
            }
            if !config.emit_all_boundary_faces && !has_face_support(local, cell, dir, grid, config) {
                continue;
            }
            let (a, b) = dir.tangent_axes();
            faces.push(Face {
                cell,
                direction: dir,
                center: frame.to_world(&face_center_local(cell, dir, grid)),
                tangent_u: frame.rotation.axis(a),
                tangent_v: frame.rotation.axis(b),
                half_size,
            });
        }
    }
    faces
}

/// World-space cell centers and their 6-neighbour adjacency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellSkeleton {
    pub centers: Vec<Point3f>,
    /// Index pairs into `centers`, each listed once with the lower index first
    pub edges: Vec<(usize, usize)>,
}

pub fn cell_skeleton(cells: &[CellKey], frame: &OrientedFrame, grid: &GridSpec) -> CellSkeleton {
    let slots: HashMap<CellKey, usize> = cells.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let centers = cells
        .iter()
        .map(|&c| frame.to_world(&grid.cell_center(c)))
        .collect();

    let mut edges = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        for dir in [FaceDirection::PosX, FaceDirection::PosY, FaceDirection::PosZ] {
            if let Some(&j) = slots.get(&cell.step(dir)) {
                edges.push((i.min(j), i.max(j)));
            }
        }
    }
    CellSkeleton { centers, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use somagrid_core::AxisRotation;

    fn grid() -> GridSpec {
        GridSpec::new(0.03, Vector3f::zeros())
    }

    /// Points filling a block of cells on a 10-per-unit lattice
    fn solid(cells: &[CellKey]) -> Vec<Vector3f> {
        let mut pts = Vec::new();
        for c in cells {
            for i in 0..10 {
                for j in 0..10 {
                    for k in 0..10 {
                        pts.push(Vector3f::new(
                            c.ix as f32 * 0.03 - 0.0135 + i as f32 * 0.003,
                            c.iy as f32 * 0.03 - 0.0135 + j as f32 * 0.003,
                            c.iz as f32 * 0.03 - 0.0135 + k as f32 * 0.003,
                        ));
                    }
                }
            }
        }
        pts
    }

    #[test]
    fn test_boundary() {
        let accepted: HashSet<CellKey> = [CellKey::new(0, 0, 0), CellKey::new(1, 0, 0)].into_iter().collect();
        assert!(!is_boundary(CellKey::new(0, 0, 0), FaceDirection::PosX, &accepted));
        assert!(is_boundary(CellKey::new(0, 0, 0), FaceDirection::NegX, &accepted));
        assert!(is_boundary(CellKey::new(1, 0, 0), FaceDirection::PosY, &accepted));
    }

    #[test]
    fn test_single_cell_emits_six_faces() {
        let cells = [CellKey::new(0, 0, 0)];
        let local = solid(&cells);
        let frame = OrientedFrame::new(Point3f::new(1.0, 2.0, 3.0), AxisRotation::identity());
        let config = FaceConfig::default();

        let faces = extract_faces(&cells, &local, &frame, &grid(), &config);
        assert_eq!(faces.len(), 6);
        for face in &faces {
            assert_relative_eq!(face.side(), 0.025);
            let offset = face.center - frame.origin;
            assert_relative_eq!(offset, face.direction.normal() * 0.015, epsilon = 1e-6);
            assert_relative_eq!(face.tangent_u.dot(&face.direction.normal()), 0.0);
            assert_relative_eq!(face.tangent_v.dot(&face.direction.normal()), 0.0);
        }
    }

    #[test]
    fn test_no_internal_faces() {
        let cells = [CellKey::new(0, 0, 0), CellKey::new(1, 0, 0)];
        let local = solid(&cells);
        let frame = OrientedFrame::new(Point3f::origin(), AxisRotation::identity());

        let faces = extract_faces(&cells, &local, &frame, &grid(), &FaceConfig::default());
        assert_eq!(faces.len(), 10);
        assert!(!faces
            .iter()
            .any(|f| f.cell == CellKey::new(0, 0, 0) && f.direction == FaceDirection::PosX));
    }

    #[test]
    fn test_missing_evidence_suppresses_face() {
        let cells = [CellKey::new(0, 0, 0)];
        // only the lower half of the cell is populated
        let local: Vec<Vector3f> = solid(&cells).into_iter().filter(|p| p.y < -0.005).collect();
        let frame = OrientedFrame::new(Point3f::origin(), AxisRotation::identity());
        let config = FaceConfig::default();

        let faces = extract_faces(&cells, &local, &frame, &grid(), &config);
        assert!(!faces.iter().any(|f| f.direction == FaceDirection::PosY));

        let all = FaceConfig {
            emit_all_boundary_faces: true,
            ..Default::default()
        };
        assert_eq!(extract_faces(&cells, &local, &frame, &grid(), &all).len(), 6);
    }

    #[test]
    fn test_face_size_independent_of_unit() {
        let cells = [CellKey::new(0, 0, 0)];
        let frame = OrientedFrame::new(Point3f::origin(), AxisRotation::identity());
        let config = FaceConfig {
            emit_all_boundary_faces: true,
            ..Default::default()
        };
        for unit in [0.026, 0.03, 0.034] {
            let g = GridSpec::new(unit, Vector3f::zeros());
            let faces = extract_faces(&cells, &[], &frame, &g, &config);
            assert!(faces.iter().all(|f| (f.side() - 0.025).abs() < 1e-7));
        }
    }

    #[test]
    fn test_quadrant_rule() {
        let center = Vector3f::new(0.015, 0.0, 0.0);
        let config = FaceConfig {
            require_quadrants: true,
            min_coverage_cells: 1,
            min_coverage_frac: 0.0,
            ..Default::default()
        };
        let one_corner: Vec<Vector3f> = (0..20)
            .map(|i| Vector3f::new(0.015, 0.001 + i as f32 * 0.0005, 0.002))
            .collect();
        let evidence = face_evidence(&one_corner, &center, 0, &config);

        assert_eq!(evidence.hits, 20);
        assert_eq!(evidence.quadrants, 1);
        assert!(!is_confirmed(&evidence, &config));
    }

    #[test]
    fn test_skeleton_edges() {
        let cells = [CellKey::new(0, 0, 0), CellKey::new(1, 0, 0), CellKey::new(1, 0, 1), CellKey::new(3, 0, 0)];
        let frame = OrientedFrame::new(Point3f::origin(), AxisRotation::identity());
        let skeleton = cell_skeleton(&cells, &frame, &grid());

        assert_eq!(skeleton.centers.len(), 4);
        assert_eq!(skeleton.edges, vec![(0, 1), (1, 2)]);
        assert_relative_eq!(skeleton.centers[2], Point3f::new(0.03, 0.0, 0.03));
    }
}
