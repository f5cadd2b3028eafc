//! Piece extraction pipeline
//!
//! One build pass runs colour classification, per-label voxel clustering and the
//! shape gate over the whole cloud, then orients, grids, votes and extracts faces
//! per surviving cluster. Per-cluster work is independent apart from the axis
//! lock, which is resolved by orienting the first eligible cluster before the
//! others run in parallel.

use crate::clustering::{clustering_voxel_size, voxel_clusters, ClusteringConfig};
use crate::color::{classify_colors, ColorClass, ColorConfig, ColorMode};
use crate::faces::{cell_skeleton, extract_faces, CellSkeleton, FaceConfig};
use crate::grid::{fit_grid, GridFit, GridFitConfig};
use crate::orientation::{estimate_frame, AxisLock, OrientationConfig};
use crate::shape::{compute_stats, ClusterStats, ShapeGateConfig, ShapeRejection};
use crate::voting::{accept_cells, cast_votes, select_layer, CellVote, VotingConfig};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use somagrid_core::{
    AxisRotation, CellKey, ColoredPointCloud3f, Error, Face, OrientedFrame, Point3f, Result, Rgb, Vector3f,
};
use std::time::Instant;

/// Settings for every pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub color: ColorConfig,
    pub clustering: ClusteringConfig,
    pub shape_gate: ShapeGateConfig,
    pub orientation: OrientationConfig,
    pub grid: GridFitConfig,
    pub voting: VotingConfig,
    pub faces: FaceConfig,
}

impl PipelineConfig {
    /// Reject settings no build could run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if !(self.grid.unit_guess > 0.0) || !self.grid.unit_guess.is_finite() {
            return invalid(format!("unit guess must be positive, got {}", self.grid.unit_guess));
        }
        if self.grid.auto_unit {
            if !(self.grid.unit_min > 0.0) {
                return invalid(format!("unit range minimum must be positive, got {}", self.grid.unit_min));
            }
            if self.grid.unit_min > self.grid.unit_max {
                return invalid(format!(
                    "unit range [{}, {}] is inverted",
                    self.grid.unit_min, self.grid.unit_max
                ));
            }
            if self.grid.unit_steps == 0 {
                return invalid("unit range has no steps".to_string());
            }
        }
        if self.grid.offset_bins == 0 {
            return invalid("offset histogram needs at least one bin".to_string());
        }
        if !(3..=16).contains(&self.faces.coverage_grid) {
            return invalid(format!(
                "coverage grid must be within 3..=16, got {}",
                self.faces.coverage_grid
            ));
        }
        if !(self.faces.face_size > 0.0) {
            return invalid(format!("face size must be positive, got {}", self.faces.face_size));
        }
        if !(self.clustering.default_voxel_size > 0.0) {
            return invalid(format!(
                "default voxel size must be positive, got {}",
                self.clustering.default_voxel_size
            ));
        }
        if self.color.mode == ColorMode::KMeans && !(2..=12).contains(&self.color.kmeans.k) {
            return invalid(format!("k-means K must be within 2..=12, got {}", self.color.kmeans.k));
        }
        Ok(())
    }
}

/// Where a cluster's processing ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    /// Failed the shape gate
    Rejected,
    /// Too few points for an orientation fit
    TooSmall,
    NoVotes,
    /// The peak layer had too few points
    NoLayer,
    NoAcceptedCells,
    Accepted,
}

/// Everything measured and produced for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// Position in the build's cluster list
    pub id: usize,
    pub label: i32,
    pub name: String,
    pub display_color: Rgb,
    pub indices: Vec<usize>,
    pub stats: ClusterStats,
    pub status: ClusterStatus,
    pub rejection: Option<ShapeRejection>,
    pub frame: Option<OrientedFrame>,
    pub grid: Option<GridFit>,
    pub layer: Option<i32>,
    pub cells: Vec<CellVote>,
    pub skeleton: CellSkeleton,
    pub faces: Vec<Face>,
}

impl ClusterResult {
    fn new(id: usize, candidate: &Candidate, status: ClusterStatus) -> Self {
        Self {
            id,
            label: candidate.class.label,
            name: candidate.class.name.clone(),
            display_color: candidate.class.display_color,
            indices: candidate.indices.clone(),
            stats: candidate.stats,
            status,
            rejection: candidate.gate.clone().err(),
            frame: None,
            grid: None,
            layer: None,
            cells: Vec::new(),
            skeleton: CellSkeleton::default(),
            faces: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ClusterStatus::Accepted
    }

    pub fn cell_keys(&self) -> Vec<CellKey> {
        self.cells.iter().map(|c| c.cell).collect()
    }
}

/// Outcome of one build pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub point_count: usize,
    pub voxel_size: f32,
    pub color_mode: ColorMode,
    /// Connected components before the shape gate
    pub pre_gate_clusters: usize,
    pub gate_dropped: usize,
    /// The axis lock after the pass
    pub locked_rotation: Option<AxisRotation>,
    /// Components that reached the shape gate, in label then discovery order
    pub clusters: Vec<ClusterResult>,
}

impl BuildReport {
    fn empty(color_mode: ColorMode) -> Self {
        Self {
            point_count: 0,
            voxel_size: 0.0,
            color_mode,
            pre_gate_clusters: 0,
            gate_dropped: 0,
            locked_rotation: None,
            clusters: Vec::new(),
        }
    }

    pub fn accepted(&self) -> impl Iterator<Item = &ClusterResult> {
        self.clusters.iter().filter(|c| c.is_accepted())
    }

    /// Every emitted face across all clusters
    pub fn faces(&self) -> impl Iterator<Item = &Face> {
        self.clusters.iter().flat_map(|c| c.faces.iter())
    }

    pub fn face_count(&self) -> usize {
        self.clusters.iter().map(|c| c.faces.len()).sum()
    }

    /// Number of clusters per final status
    pub fn status_counts(&self) -> Vec<(ClusterStatus, usize)> {
        self.clusters
            .iter()
            .map(|c| c.status)
            .counts()
            .into_iter()
            .sorted_by_key(|(status, _)| *status as u8)
            .collect()
    }
}

/// A connected component with its gate verdict
struct Candidate {
    class: ColorClass,
    indices: Vec<usize>,
    stats: ClusterStats,
    gate: std::result::Result<(), ShapeRejection>,
}

/// Runs build passes with a persistent axis lock
///
/// The lock survives across [`PieceExtractor::build`] calls until
/// [`PieceExtractor::reset_axis_lock`] clears it.
#[derive(Debug, Default)]
pub struct PieceExtractor {
    config: PipelineConfig,
    axis_lock: AxisLock,
}

impl PieceExtractor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            axis_lock: AxisLock::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration; the axis lock is kept
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn axis_lock(&self) -> &AxisLock {
        &self.axis_lock
    }

    pub fn reset_axis_lock(&self) {
        self.axis_lock.reset();
        log::info!("axis lock reset");
    }

    /// Run one pass over parallel position and colour arrays
    ///
    /// Missing colours default to white.
    pub fn build_from_arrays(&self, positions: &[Point3f], colors: Option<&[Rgb]>) -> Result<BuildReport> {
        let cloud = ColoredPointCloud3f::from_parts(positions, colors)?;
        self.build(&cloud)
    }

    /// Run one pass over a coloured cloud
    pub fn build(&self, cloud: &ColoredPointCloud3f) -> Result<BuildReport> {
        self.config.validate()?;
        let config = &self.config;

        if cloud.is_empty() {
            log::warn!("build called with an empty point cloud");
            return Ok(BuildReport::empty(config.color.mode));
        }

        let start = Instant::now();
        let points = cloud.positions();
        let colors = cloud.colors();

        let labels = classify_colors(&colors, &config.color);
        let voxel_size = clustering_voxel_size(&points, &config.clustering);

        let candidates: Vec<Candidate> = labels
            .classes
            .par_iter()
            .map(|class| {
                let indices = labels.indices_of(class.label);
                if indices.len() < config.clustering.min_points_per_cluster {
                    return Vec::new();
                }
                voxel_clusters(
                    &points,
                    &indices,
                    voxel_size,
                    config.clustering.connectivity,
                    config.clustering.min_points_per_cluster,
                )
                .into_iter()
                .filter_map(|cluster| {
                    let stats = compute_stats(&points, &cluster, voxel_size)?;
                    Some(Candidate {
                        class: class.clone(),
                        gate: config.shape_gate.check(&stats),
                        indices: cluster,
                        stats,
                    })
                })
                .collect::<Vec<_>>()
            })
            .flatten()
            .collect();

        let mut gate_dropped = 0;
        for c in candidates.iter() {
            if let Err(reason) = &c.gate {
                gate_dropped += 1;
                log::debug!(
                    "drop '{}' | {} | N={} Lmax={:.3}m Vol={:.3e}m^3 Aspect={:.2} Vox={} pts/vox={:.2}",
                    c.class.name,
                    reason,
                    c.stats.point_count,
                    c.stats.longest,
                    c.stats.volume,
                    c.stats.aspect,
                    c.stats.voxel_count,
                    c.stats.points_per_voxel
                );
            }
        }

        // The lock must be published by one cluster before any other reads it.
        let first = candidates
            .iter()
            .position(|c| c.gate.is_ok() && c.indices.len() >= config.orientation.min_points_for_fit);
        let mut first_result = first.map(|i| self.process(i, &candidates[i], &points));

        let mut slots: Vec<Option<ClusterResult>> = candidates
            .par_iter()
            .enumerate()
            .map(|(i, c)| (Some(i) != first).then(|| self.process(i, c, &points)))
            .collect();
        if let Some(i) = first {
            slots[i] = first_result.take();
        }
        let clusters: Vec<ClusterResult> = slots.into_iter().flatten().collect();

        let report = BuildReport {
            point_count: cloud.len(),
            voxel_size,
            color_mode: config.color.mode,
            pre_gate_clusters: candidates.len(),
            gate_dropped,
            locked_rotation: self.axis_lock.get(),
            clusters,
        };

        log::info!(
            "built {} clusters (filtered {}) from {} points in {:?} | voxel={:.4}m mode={:?} faces={} statuses={:?}",
            report.pre_gate_clusters - report.gate_dropped,
            report.gate_dropped,
            report.point_count,
            start.elapsed(),
            voxel_size,
            config.color.mode,
            report.face_count(),
            report.status_counts()
        );

        Ok(report)
    }

    fn process(&self, id: usize, candidate: &Candidate, points: &[Point3f]) -> ClusterResult {
        let config = &self.config;
        if candidate.gate.is_err() {
            return ClusterResult::new(id, candidate, ClusterStatus::Rejected);
        }
        let indices = &candidate.indices;
        if indices.len() < config.orientation.min_points_for_fit {
            log::warn!("cluster {} ({}) too small: {} points", id, candidate.class.name, indices.len());
            return ClusterResult::new(id, candidate, ClusterStatus::TooSmall);
        }

        let mut result = ClusterResult::new(id, candidate, ClusterStatus::Accepted);

        let frame = estimate_frame(points, indices, &config.orientation, Some(&self.axis_lock));
        let local: Vec<Vector3f> = indices.iter().map(|&i| frame.to_local(&points[i])).collect();
        let grid = fit_grid(&local, &config.grid);
        result.frame = Some(frame);
        result.grid = Some(grid);

        let votes = cast_votes(&local, &grid.spec, &config.voting);
        if votes.is_empty() {
            log::warn!("cluster {} ({}): no votes", id, candidate.class.name);
            result.status = ClusterStatus::NoVotes;
            return result;
        }

        let Some(layer) = select_layer(votes.layer_counts(), config.voting.layer_min_points) else {
            log::warn!("cluster {} ({}): no layer reaches {} points", id, candidate.class.name, config.voting.layer_min_points);
            result.status = ClusterStatus::NoLayer;
            return result;
        };
        result.layer = Some(layer);

        let cells = accept_cells(&votes, &local, &grid.spec, layer, &config.voting);
        if cells.is_empty() {
            log::warn!("cluster {} ({}): no accepted cells", id, candidate.class.name);
            result.status = ClusterStatus::NoAcceptedCells;
            return result;
        }

        let keys: Vec<CellKey> = cells.iter().map(|c| c.cell).collect();
        result.skeleton = cell_skeleton(&keys, &frame, &grid.spec);
        result.faces = extract_faces(&keys, &local, &frame, &grid.spec, &config.faces);
        result.cells = cells;

        log::debug!(
            "cluster {} ({}) | u={:.4}m cells={} layer={} faces={}",
            id,
            candidate.class.name,
            grid.spec.unit,
            result.cells.len(),
            layer,
            result.faces.len()
        );
        result
    }
}
