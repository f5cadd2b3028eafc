//! Bounding-geometry statistics and the shape gate
//!
//! Clusters whose axis-aligned extents, volume, elongation or voxel density are
//! implausible for a single piece are rejected before any orientation or grid
//! work is spent on them.

use crate::clustering::VoxelKey;
use serde::{Deserialize, Serialize};
use somagrid_core::{Aabb, Point3f, Vector3f};
use std::collections::HashSet;
use thiserror::Error;

/// Measured geometry of one cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub point_count: usize,
    pub aabb: Aabb,
    pub size: Vector3f,
    pub longest: f32,
    /// Smallest extent, floored at 1e-9
    pub shortest: f32,
    /// AABB volume, floored at 1e-12
    pub volume: f32,
    /// `longest / shortest`
    pub aspect: f32,
    pub voxel_count: usize,
    /// Infinite when `voxel_count` is zero
    pub points_per_voxel: f32,
}

/// Compute [`ClusterStats`] for the indexed subset of `points`
///
/// Voxel occupancy uses the same voxel size as clustering. Returns `None` for
/// an empty index set.
pub fn compute_stats(points: &[Point3f], indices: &[usize], voxel_size: f32) -> Option<ClusterStats> {
    let aabb = Aabb::from_points(indices.iter().map(|&i| &points[i]))?;
    let size = aabb.size();
    let longest = size.x.max(size.y).max(size.z);
    let shortest = size.x.min(size.y).min(size.z).max(1e-9);
    let volume = (size.x * size.y * size.z).max(1e-12);

    let voxel_count = if voxel_size > 0.0 {
        indices
            .iter()
            .map(|&i| VoxelKey::of(&points[i], voxel_size))
            .collect::<HashSet<_>>()
            .len()
    } else {
        0
    };
    let points_per_voxel = if voxel_count > 0 {
        indices.len() as f32 / voxel_count as f32
    } else {
        f32::INFINITY
    };

    Some(ClusterStats {
        point_count: indices.len(),
        aabb,
        size,
        longest,
        shortest,
        volume,
        aspect: longest / shortest,
        voxel_count,
        points_per_voxel,
    })
}

/// Plausibility bounds for a single piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeGateConfig {
    pub enabled: bool,
    /// Longest extent bounds (m)
    pub min_longest: f32,
    pub max_longest: f32,
    /// AABB volume bounds (m^3)
    pub min_volume: f32,
    pub max_volume: f32,
    /// Non-positive disables the check
    pub max_aspect: f32,
    /// Zero disables the check
    pub max_voxel_count: usize,
    /// Non-positive disables the check
    pub min_points_per_voxel: f32,
}

impl Default for ShapeGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_longest: 0.03,
            max_longest: 0.12,
            min_volume: 1e-5,
            max_volume: 1.2e-3,
            max_aspect: 5.0,
            max_voxel_count: 4000,
            min_points_per_voxel: 3.0,
        }
    }
}

/// Reason a cluster failed the shape gate
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeRejection {
    #[error("longest extent {value:.3} m below minimum {limit:.3} m")]
    TooShort { value: f32, limit: f32 },

    #[error("longest extent {value:.3} m above maximum {limit:.3} m")]
    TooLong { value: f32, limit: f32 },

    #[error("AABB volume {value:.3e} m^3 below minimum {limit:.3e} m^3")]
    TooSmallVolume { value: f32, limit: f32 },

    #[error("AABB volume {value:.3e} m^3 above maximum {limit:.3e} m^3")]
    TooLargeVolume { value: f32, limit: f32 },

    #[error("aspect ratio {value:.2} above maximum {limit:.2}")]
    TooElongated { value: f32, limit: f32 },

    #[error("voxel count {value} above maximum {limit}")]
    TooManyVoxels { value: usize, limit: usize },

    #[error("{value:.2} points per voxel below minimum {limit:.2}")]
    TooSparse { value: f32, limit: f32 },
}

impl ShapeGateConfig {
    /// Test `stats` against every enabled criterion, reporting the first failure
    pub fn check(&self, stats: &ClusterStats) -> Result<(), ShapeRejection> {
        if !self.enabled {
            return Ok(());
        }
        if stats.longest < self.min_longest {
            return Err(ShapeRejection::TooShort {
                value: stats.longest,
                limit: self.min_longest,
            });
        }
        if stats.longest > self.max_longest {
            return Err(ShapeRejection::TooLong {
                value: stats.longest,
                limit: self.max_longest,
            });
        }
        if stats.volume < self.min_volume {
            return Err(ShapeRejection::TooSmallVolume {
                value: stats.volume,
                limit: self.min_volume,
            });
        }
        if stats.volume > self.max_volume {
            return Err(ShapeRejection::TooLargeVolume {
                value: stats.volume,
                limit: self.max_volume,
            });
        }
        if self.max_aspect > 0.0 && stats.aspect > self.max_aspect {
            return Err(ShapeRejection::TooElongated {
                value: stats.aspect,
                limit: self.max_aspect,
            });
        }
        if self.max_voxel_count > 0 && stats.voxel_count > self.max_voxel_count {
            return Err(ShapeRejection::TooManyVoxels {
                value: stats.voxel_count,
                limit: self.max_voxel_count,
            });
        }
        if self.min_points_per_voxel > 0.0 && stats.points_per_voxel < self.min_points_per_voxel {
            return Err(ShapeRejection::TooSparse {
                value: stats.points_per_voxel,
                limit: self.min_points_per_voxel,
            });
        }
        Ok(())
    }
}
