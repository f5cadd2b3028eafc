//! Voxel connectivity clustering
//!
//! Points sharing one colour label are quantised into cubic voxels; occupied
//! voxels are graph nodes and a breadth-first search over face (6) or full (26)
//! adjacency enumerates connected components.

use serde::{Deserialize, Serialize};
use somagrid_core::{Aabb, Point3f};
use std::collections::{HashMap, HashSet, VecDeque};

/// Voxel adjacency used by the breadth-first search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Face-adjacent voxels only
    Six,
    /// Face, edge and corner neighbours
    TwentySix,
}

impl Connectivity {
    /// Neighbour offsets for this connectivity
    pub fn offsets(&self) -> Vec<VoxelKey> {
        let mut out = Vec::with_capacity(26);
        for dx in -1..=1i32 {
            for dy in -1..=1i32 {
                for dz in -1..=1i32 {
                    let manhattan = dx.abs() + dy.abs() + dz.abs();
                    if manhattan == 0 {
                        continue;
                    }
                    if *self == Connectivity::Six && manhattan != 1 {
                        continue;
                    }
                    out.push(VoxelKey::new(dx, dy, dz));
                }
            }
        }
        out
    }
}

/// Spatial clustering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Multiplier applied to the density-estimated voxel size
    pub voxel_size_scale: f32,
    /// Voxel size used when the density estimate is degenerate (m)
    pub default_voxel_size: f32,
    /// Components with fewer points are discarded
    pub min_points_per_cluster: usize,
    pub connectivity: Connectivity,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            voxel_size_scale: 1.5,
            default_voxel_size: 0.01,
            min_points_per_cluster: 200,
            connectivity: Connectivity::TwentySix,
        }
    }
}

/// Integer voxel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelKey {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Voxel containing `p` for an edge length `voxel_size`
    pub fn of(p: &Point3f, voxel_size: f32) -> Self {
        let inv = 1.0 / voxel_size.max(1e-6);
        Self::new(
            (p.x * inv).floor() as i32,
            (p.y * inv).floor() as i32,
            (p.z * inv).floor() as i32,
        )
    }

    fn offset_by(&self, d: &VoxelKey) -> Self {
        Self::new(self.x + d.x, self.y + d.y, self.z + d.z)
    }
}

/// Density based voxel edge length: `cbrt(aabb_volume / n)`
///
/// Returns `None` for an empty slice or a non-finite estimate.
pub fn estimate_voxel_size_from_density(points: &[Point3f]) -> Option<f32> {
    let aabb = Aabb::from_points(points)?;
    let volume = aabb.volume().max(1e-12);
    let n = points.len().max(1) as f32;
    let s = (volume / n).cbrt().max(1e-6);
    s.is_finite().then_some(s)
}

/// Voxel size for clustering: the density estimate (or the configured
/// default when degenerate) times the configured scale
pub fn clustering_voxel_size(points: &[Point3f], config: &ClusteringConfig) -> f32 {
    let base = match estimate_voxel_size_from_density(points) {
        Some(s) if s > 0.0 => s,
        _ => config.default_voxel_size,
    };
    base * config.voxel_size_scale.max(0.001)
}

/// Bucket point indices per occupied voxel
///
/// The returned key list preserves first-occupancy order, which keeps the
/// component enumeration deterministic.
pub fn voxelize(
    points: &[Point3f],
    indices: &[usize],
    voxel_size: f32,
) -> (HashMap<VoxelKey, Vec<usize>>, Vec<VoxelKey>) {
    let mut map: HashMap<VoxelKey, Vec<usize>> = HashMap::with_capacity(indices.len() / 4 + 8);
    let mut order = Vec::new();
    for &i in indices {
        let key = VoxelKey::of(&points[i], voxel_size);
        map.entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::with_capacity(8)
            })
            .push(i);
    }
    (map, order)
}

/// Connected components of the voxelised index subset
///
/// Each returned cluster is the union of the point indices of its voxels, in
/// voxel visiting order. Components with fewer than `min_points` points are
/// dropped. Clusters partition the surviving indices.
pub fn voxel_clusters(
    points: &[Point3f],
    indices: &[usize],
    voxel_size: f32,
    connectivity: Connectivity,
    min_points: usize,
) -> Vec<Vec<usize>> {
    let (map, order) = voxelize(points, indices, voxel_size);
    let neighbors = connectivity.offsets();

    let mut results = Vec::new();
    let mut visited: HashSet<VoxelKey> = HashSet::with_capacity(map.len());
    let mut queue = VecDeque::new();

    for seed in order {
        if !visited.insert(seed) {
            continue;
        }

        let mut voxels = Vec::new();
        queue.push_back(seed);
        while let Some(v) = queue.pop_front() {
            voxels.push(v);
            for d in &neighbors {
                let n = v.offset_by(d);
                if !map.contains_key(&n) || visited.contains(&n) {
                    continue;
                }
                visited.insert(n);
                queue.push_back(n);
            }
        }

        let count: usize = voxels.iter().map(|v| map[v].len()).sum();
        if count < min_points {
            log::trace!("dropping component of {} points below minimum {}", count, min_points);
            continue;
        }

        let mut cluster = Vec::with_capacity(count);
        for v in &voxels {
            cluster.extend_from_slice(&map[v]);
        }
        results.push(cluster);
    }

    results
}
