//! Cell voting, layer selection and cell acceptance

use serde::{Deserialize, Serialize};
use somagrid_core::{CellKey, GridSpec, Vector3f};
use std::collections::HashMap;

/// Weight of the vote a point casts for its own cell
pub const CENTER_VOTE: u32 = 2;
/// Weight of a vote cast across a nearby cell boundary
pub const SPILLOVER_VOTE: u32 = 1;

/// Voting and acceptance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Boundary band per axis as a fraction of the unit
    pub boundary_band: [f32; 3],
    /// Raw point count a cell needs
    pub cell_min_points: u32,
    /// Half-size of the support box as a fraction of the unit
    pub box_half_frac: f32,
    pub min_box_points: usize,
    /// Points the peak layer needs to be selected
    pub layer_min_points: usize,
    /// Multiplier for the top layer's threshold, clamped to `[0.5, 1]`
    pub top_layer_relax: f32,
    pub vote_keep_top_frac: f32,
    pub vote_min_abs: u32,
    pub layer_keep_top_frac: f32,
    pub layer_vote_min_abs: u32,
    pub max_cells_per_cluster: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            boundary_band: [0.15, 0.12, 0.15],
            cell_min_points: 14,
            box_half_frac: 0.75,
            min_box_points: 10,
            layer_min_points: 120,
            top_layer_relax: 0.8,
            vote_keep_top_frac: 0.25,
            vote_min_abs: 50,
            layer_keep_top_frac: 0.25,
            layer_vote_min_abs: 30,
            max_cells_per_cluster: 128,
        }
    }
}

/// Accumulated evidence for one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellVote {
    pub cell: CellKey,
    pub votes: u32,
    pub points: u32,
}

/// Votes per cell in discovery order plus the per-layer point histogram
#[derive(Debug, Clone, Default)]
pub struct VoteMap {
    cells: Vec<CellVote>,
    index: HashMap<CellKey, usize>,
    layers: Vec<(i32, usize)>,
    layer_index: HashMap<i32, usize>,
}

impl VoteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` votes and one point to `cell`
    pub fn add(&mut self, cell: CellKey, weight: u32) {
        let slot = match self.index.get(&cell) {
            Some(&slot) => slot,
            None => {
                self.cells.push(CellVote {
                    cell,
                    votes: 0,
                    points: 0,
                });
                self.index.insert(cell, self.cells.len() - 1);
                self.cells.len() - 1
            }
        };
        let entry = &mut self.cells[slot];
        entry.votes += weight;
        entry.points += 1;
    }

    /// Count one point in layer `iy`
    pub fn add_layer_point(&mut self, iy: i32) {
        match self.layer_index.get(&iy) {
            Some(&slot) => self.layers[slot].1 += 1,
            None => {
                self.layer_index.insert(iy, self.layers.len());
                self.layers.push((iy, 1));
            }
        }
    }

    pub fn get(&self, cell: &CellKey) -> Option<&CellVote> {
        self.index.get(cell).map(|&slot| &self.cells[slot])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CellVote> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Points per layer, in discovery order
    pub fn layer_counts(&self) -> &[(i32, usize)] {
        &self.layers
    }

    /// Highest vote over all cells
    pub fn max_votes(&self) -> u32 {
        self.cells.iter().map(|c| c.votes).max().unwrap_or(0)
    }

    /// Highest vote among the cells of layer `iy`
    pub fn layer_max_votes(&self, iy: i32) -> u32 {
        self.cells
            .iter()
            .filter(|c| c.cell.iy == iy)
            .map(|c| c.votes)
            .max()
            .unwrap_or(0)
    }
}

/// Bucket local points into lattice cells
///
/// Each point casts a center vote for its own cell and, per axis, at most one
/// spillover vote for the neighbour across the nearer edge when it lies inside
/// that axis's boundary band. The layer histogram counts each point once, in
/// its own cell's layer.
pub fn cast_votes(local: &[Vector3f], grid: &GridSpec, config: &VotingConfig) -> VoteMap {
    let mut map = VoteMap::new();
    let bands = config.boundary_band.map(|b| b.clamp(0.0, 1.0));

    for p in local {
        let home = grid.cell_of(p);
        map.add(home, CENTER_VOTE);

        for axis in 0..3 {
            let frac = grid.fraction_along(axis, p[axis]);
            if frac < bands[axis] {
                map.add(home.shifted(axis, -1), SPILLOVER_VOTE);
            } else if frac > 1.0 - bands[axis] {
                map.add(home.shifted(axis, 1), SPILLOVER_VOTE);
            }
        }

        map.add_layer_point(home.iy);
    }

    map
}

/// The peak layer, if its point count reaches `min_points`
///
/// Ties go to the layer discovered first.
pub fn select_layer(layer_counts: &[(i32, usize)], min_points: usize) -> Option<i32> {
    let mut peak: Option<(i32, usize)> = None;
    for &(iy, count) in layer_counts {
        if peak.map_or(true, |(_, best)| count > best) {
            peak = Some((iy, count));
        }
    }
    peak.filter(|&(_, count)| count >= min_points).map(|(iy, _)| iy)
}

/// At least `min_points` local points inside the box of half-size
/// `unit * half_frac` around the cell's continuous center
pub fn has_box_support(
    cell: CellKey,
    local: &[Vector3f],
    grid: &GridSpec,
    half_frac: f32,
    min_points: usize,
) -> bool {
    if min_points == 0 {
        return true;
    }
    let center = grid.cell_center(cell);
    let h = grid.unit * half_frac;
    local
        .iter()
        .filter(|p| {
            let d = *p - center;
            d.x.abs() <= h && d.y.abs() <= h && d.z.abs() <= h
        })
        .take(min_points)
        .count()
        >= min_points
}

fn keep_top_threshold(min_abs: u32, max_votes: u32, frac: f32) -> u32 {
    min_abs.max((max_votes as f32 * frac.clamp(0.0, 1.0)).ceil() as u32)
}

/// Global and per-layer vote thresholds for one candidate layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteThresholds {
    pub global: u32,
    pub layer: u32,
}

impl VoteThresholds {
    pub fn effective(&self) -> u32 {
        self.global.max(self.layer)
    }
}

/// Thresholds applied to cells of `layer`, the topmost selected layer
pub fn vote_thresholds(votes: &VoteMap, layer: i32, config: &VotingConfig) -> VoteThresholds {
    let global = keep_top_threshold(config.vote_min_abs, votes.max_votes(), config.vote_keep_top_frac);
    let base = keep_top_threshold(
        config.layer_vote_min_abs,
        votes.layer_max_votes(layer),
        config.layer_keep_top_frac,
    );
    let relax = config.top_layer_relax.clamp(0.5, 1.0);
    VoteThresholds {
        global,
        layer: (base as f32 * relax).ceil() as u32,
    }
}

/// Accept cells of `layer` that pass the vote, point-count and box tests
///
/// Cells are visited in discovery order and acceptance stops at
/// `max_cells_per_cluster`.
pub fn accept_cells(
    votes: &VoteMap,
    local: &[Vector3f],
    grid: &GridSpec,
    layer: i32,
    config: &VotingConfig,
) -> Vec<CellVote> {
    let threshold = vote_thresholds(votes, layer, config).effective();

    let mut accepted = Vec::new();
    for cv in votes.iter().filter(|cv| cv.cell.iy == layer) {
        if accepted.len() >= config.max_cells_per_cluster {
            break;
        }
        if cv.votes < threshold || cv.points < config.cell_min_points {
            continue;
        }
        if !has_box_support(cv.cell, local, grid, config.box_half_frac, config.min_box_points) {
            continue;
        }
        accepted.push(*cv);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::new(0.03, Vector3f::zeros())
    }

    /// `n^3` points on a lattice filling the middle of cell (cx, cy, cz)
    fn filled_cell(cx: i32, cy: i32, cz: i32, n: usize) -> Vec<Vector3f> {
        let step = 0.02 / n as f32;
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    pts.push(Vector3f::new(
                        cx as f32 * 0.03 - 0.01 + (i as f32 + 0.5) * step,
                        cy as f32 * 0.03 - 0.01 + (j as f32 + 0.5) * step,
                        cz as f32 * 0.03 - 0.01 + (k as f32 + 0.5) * step,
                    ));
                }
            }
        }
        pts
    }

    #[test]
    fn test_center_and_spillover_votes() {
        let g = grid();
        let config = VotingConfig::default();
        // near the -x edge and the +y edge of cell (0,0,0)
        let local = vec![Vector3f::new(-0.013, 0.0135, 0.0)];
        let votes = cast_votes(&local, &g, &config);

        assert_eq!(votes.get(&CellKey::new(0, 0, 0)).map(|c| c.votes), Some(CENTER_VOTE));
        assert_eq!(votes.get(&CellKey::new(-1, 0, 0)).map(|c| c.votes), Some(SPILLOVER_VOTE));
        assert_eq!(votes.get(&CellKey::new(0, 1, 0)).map(|c| c.votes), Some(SPILLOVER_VOTE));
        assert!(votes.get(&CellKey::new(0, 0, 1)).is_none());
        assert_eq!(votes.len(), 3);
        assert_eq!(votes.layer_counts(), &[(0, 1)]);
    }

    #[test]
    fn test_discovery_order_is_kept() {
        let g = grid();
        let local = vec![
            Vector3f::new(0.06, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.06, 0.0, 0.0),
        ];
        let votes = cast_votes(&local, &g, &VotingConfig::default());
        let order: Vec<CellKey> = votes.iter().map(|c| c.cell).collect();

        assert_eq!(order, vec![CellKey::new(2, 0, 0), CellKey::new(0, 0, 0)]);
        assert_eq!(votes.get(&CellKey::new(2, 0, 0)).map(|c| (c.votes, c.points)), Some((4, 2)));
    }

    #[test]
    fn test_select_layer_peak_only() {
        let counts = vec![(0, 150), (1, 300), (2, 300)];
        assert_eq!(select_layer(&counts, 120), Some(1));
        assert_eq!(select_layer(&counts, 301), None);
        assert_eq!(select_layer(&[], 0), None);
    }

    #[test]
    fn test_box_support() {
        let g = grid();
        let local = filled_cell(0, 0, 0, 4);

        assert!(has_box_support(CellKey::new(0, 0, 0), &local, &g, 0.75, 10));
        assert!(!has_box_support(CellKey::new(3, 0, 0), &local, &g, 0.75, 10));
        assert!(!has_box_support(CellKey::new(0, 0, 0), &local, &g, 0.75, 65));
    }

    #[test]
    fn test_accept_single_layer() {
        let g = grid();
        let mut local = filled_cell(0, 0, 0, 6);
        local.extend(filled_cell(1, 0, 0, 6));
        // a sparser cell on a second layer is never accepted
        local.extend(filled_cell(0, 1, 0, 5));

        let config = VotingConfig::default();
        let votes = cast_votes(&local, &g, &config);
        let layer = select_layer(votes.layer_counts(), config.layer_min_points).unwrap();
        assert_eq!(layer, 0);

        let cells: Vec<CellKey> = accept_cells(&votes, &local, &g, layer, &config)
            .iter()
            .map(|c| c.cell)
            .collect();
        assert_eq!(cells, vec![CellKey::new(0, 0, 0), CellKey::new(1, 0, 0)]);
    }

    #[test]
    fn test_thresholds_and_cap() {
        let g = grid();
        let mut local = filled_cell(0, 0, 0, 6);
        local.extend(filled_cell(1, 0, 0, 6));
        local.extend(filled_cell(2, 0, 0, 6));

        let config = VotingConfig {
            max_cells_per_cluster: 2,
            ..Default::default()
        };
        let votes = cast_votes(&local, &g, &config);
        let t = vote_thresholds(&votes, 0, &config);
        assert_eq!(t.global, 108);
        assert_eq!(t.layer, 87);
        assert_eq!(t.effective(), 108);

        let accepted = accept_cells(&votes, &local, &g, 0, &config);
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].cell, CellKey::new(0, 0, 0));
    }
}
