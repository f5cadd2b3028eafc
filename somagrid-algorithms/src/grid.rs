//! Periodic cubic grid fitting in an oriented frame
//!
//! The unit length is chosen from a candidate range by how sharply the folded
//! coordinates of a point sample concentrate in a histogram; the X and Z offsets
//! put cell centers on the density peak and the Y offset is anchored at the
//! mean height.
//!
//! A peak fixes the phase only up to half a unit. In a surface scan the densest
//! planes are faces, which are cell boundaries, so the X and Z phases are moved
//! by half a unit when that puts strictly more points into a single slab.

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use somagrid_core::{wrap_phase, GridSpec, Vector3f};

/// Grid fitting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridFitConfig {
    /// Unit used when auto estimation is off or fails (m)
    pub unit_guess: f32,
    pub auto_unit: bool,
    pub unit_min: f32,
    pub unit_max: f32,
    /// Candidate count over `[unit_min, unit_max]`, endpoints included
    pub unit_steps: usize,
    /// Histogram bins for the 1-D offset search
    pub offset_bins: usize,
    /// Maximum number of points sampled for unit estimation
    pub sample_count: usize,
    pub sample_seed: u64,
}

impl Default for GridFitConfig {
    fn default() -> Self {
        Self {
            unit_guess: 0.03,
            auto_unit: true,
            unit_min: 0.026,
            unit_max: 0.034,
            unit_steps: 17,
            offset_bins: 128,
            sample_count: 2000,
            sample_seed: 12345,
        }
    }
}

impl GridFitConfig {
    /// Evenly spaced unit candidates
    pub fn unit_candidates(&self) -> Vec<f32> {
        if self.unit_steps <= 1 || self.unit_max <= self.unit_min {
            return vec![self.unit_min];
        }
        let step = (self.unit_max - self.unit_min) / (self.unit_steps - 1) as f32;
        (0..self.unit_steps)
            .map(|i| self.unit_min + i as f32 * step)
            .collect()
    }
}

/// Result of a 1-D offset search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetFit {
    /// Center phase in `[-unit/2, unit/2)`
    pub offset: f32,
    pub peak_count: usize,
    /// `1 - peak_count / total`, lower is tighter
    pub score: f32,
}

/// Find the center phase that aligns cell centers with the densest fold bin
///
/// Values are folded to `[0, 1)` in units of `unit` and histogrammed into
/// `bins` bins. The first bin holding the maximum count wins.
pub fn best_offset_1d(values: &[f32], unit: f32, bins: usize) -> OffsetFit {
    let bins = bins.max(1);
    let mut hist = vec![0usize; bins];
    let inv = 1.0 / unit;

    for &t in values {
        let y = t * inv;
        let frac = y - y.floor();
        let b = ((frac * bins as f32).floor() as isize).clamp(0, bins as isize - 1) as usize;
        hist[b] += 1;
    }

    let (mut peak_bin, mut peak_count) = (0, 0);
    for (b, &count) in hist.iter().enumerate() {
        if count > peak_count {
            peak_bin = b;
            peak_count = count;
        }
    }

    let bin_center = (peak_bin as f32 + 0.5) / bins as f32;
    OffsetFit {
        offset: wrap_phase(bin_center * unit, unit),
        peak_count,
        score: 1.0 - peak_count as f32 / values.len().max(1) as f32,
    }
}

/// Points in the most populated slab for a center phase `offset`
fn fullest_slab(values: &[f32], unit: f32, offset: f32) -> usize {
    values
        .iter()
        .map(|&t| ((t - offset) / unit + 0.5).floor() as i32)
        .counts()
        .into_values()
        .max()
        .unwrap_or(0)
}

/// Resolve the half-unit ambiguity of a peak-centred phase
///
/// Returns the half-unit shifted phase when it gathers strictly more points
/// into one slab, else `offset` unchanged.
pub fn settle_phase(values: &[f32], unit: f32, offset: f32) -> f32 {
    let shifted = wrap_phase(offset + 0.5 * unit, unit);
    if fullest_slab(values, unit, shifted) > fullest_slab(values, unit, offset) {
        shifted
    } else {
        offset
    }
}

/// Up to `cap` local points drawn without replacement with a fixed seed
///
/// When the input already fits under the cap every point is used, in order.
pub fn sample_points(local: &[Vector3f], cap: usize, seed: u64) -> Vec<Vector3f> {
    if local.len() <= cap {
        return local.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, local.len(), cap)
        .into_iter()
        .map(|i| local[i])
        .collect()
}

/// Best unit candidate and its summed per-axis score
///
/// Returns `None` when no candidate produced a finite score.
pub fn estimate_unit(local: &[Vector3f], config: &GridFitConfig) -> Option<(f32, f32)> {
    if local.is_empty() {
        return None;
    }
    let sample = sample_points(local, config.sample_count.max(1), config.sample_seed);
    let xs: Vec<f32> = sample.iter().map(|p| p.x).collect();
    let ys: Vec<f32> = sample.iter().map(|p| p.y).collect();
    let zs: Vec<f32> = sample.iter().map(|p| p.z).collect();

    let mut best: Option<(f32, f32)> = None;
    for unit in config.unit_candidates() {
        if !(unit > 1e-6) {
            continue;
        }
        let score = best_offset_1d(&xs, unit, config.offset_bins).score
            + best_offset_1d(&ys, unit, config.offset_bins).score
            + best_offset_1d(&zs, unit, config.offset_bins).score;
        if !score.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((unit, score));
        }
    }
    best
}

/// A fitted grid plus the diagnostics that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridFit {
    pub spec: GridSpec,
    /// Summed periodicity score of the chosen unit, when it was estimated
    pub unit_score: Option<f32>,
    /// Histogram scores of the final X and Z offset searches
    pub offset_scores: [f32; 2],
    /// The configured guess was used because estimation failed
    pub used_fallback: bool,
}

/// Fit unit and offsets to points already expressed in the oriented frame
pub fn fit_grid(local: &[Vector3f], config: &GridFitConfig) -> GridFit {
    let guess = config.unit_guess.max(1e-4);
    let (unit, unit_score, used_fallback) = if config.auto_unit {
        match estimate_unit(local, config) {
            Some((unit, score)) => (unit, Some(score), false),
            None => {
                log::warn!("grid unit estimation failed, falling back to {:.4} m", guess);
                (guess, None, true)
            }
        }
    } else {
        (guess, None, false)
    };

    let xs: Vec<f32> = local.iter().map(|p| p.x).collect();
    let zs: Vec<f32> = local.iter().map(|p| p.z).collect();
    let fit_x = best_offset_1d(&xs, unit, config.offset_bins);
    let fit_z = best_offset_1d(&zs, unit, config.offset_bins);
    let offset_x = settle_phase(&xs, unit, fit_x.offset);
    let offset_z = settle_phase(&zs, unit, fit_z.offset);
    if offset_x != fit_x.offset || offset_z != fit_z.offset {
        log::debug!(
            "grid phase moved off the density peak: x {:.5} -> {:.5}, z {:.5} -> {:.5}",
            fit_x.offset,
            offset_x,
            fit_z.offset,
            offset_z
        );
    }

    let offset_y = if local.is_empty() {
        0.0
    } else {
        local.iter().map(|p| p.y).sum::<f32>() / local.len() as f32
    };

    GridFit {
        spec: GridSpec::new(unit, Vector3f::new(offset_x, offset_y, offset_z)),
        unit_score,
        offset_scores: [fit_x.score, fit_z.score],
        used_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Points on the six faces of a cube of side `side` centred at (c, c, c),
    /// sampled on an interior `n x n` grid per face
    fn hollow_cube(c: f32, side: f32, n: usize) -> Vec<Vector3f> {
        let h = side * 0.5;
        let step = side / n as f32;
        let mut pts = Vec::with_capacity(6 * n * n);
        for i in 0..n {
            for j in 0..n {
                let a = c - h + (i as f32 + 0.5) * step;
                let b = c - h + (j as f32 + 0.5) * step;
                for s in [-h, h] {
                    pts.push(Vector3f::new(c + s, a, b));
                    pts.push(Vector3f::new(a, c + s, b));
                    pts.push(Vector3f::new(a, b, c + s));
                }
            }
        }
        pts
    }

    #[test]
    fn test_unit_candidates_inclusive() {
        let config = GridFitConfig::default();
        let candidates = config.unit_candidates();

        assert_eq!(candidates.len(), 17);
        assert_relative_eq!(candidates[0], 0.026);
        assert_relative_eq!(candidates[8], 0.030, epsilon = 1e-6);
        assert_relative_eq!(candidates[16], 0.034, epsilon = 1e-6);
    }

    #[test]
    fn test_best_offset_centers_on_peak() {
        let u = 0.03;
        let mut values = vec![0.007f32; 50];
        values.extend([0.001, 0.012, 0.021, 0.026]);
        let fit = best_offset_1d(&values, u, 128);

        assert_eq!(fit.peak_count, 50);
        assert_relative_eq!(fit.offset, 0.007, epsilon = u / 128.0);
        assert_relative_eq!(fit.score, 1.0 - 50.0 / 54.0, epsilon = 1e-6);
    }

    #[test]
    fn test_best_offset_wraps_high_phase() {
        let u = 0.03;
        let values = vec![0.028f32, 0.058, -0.002];
        let fit = best_offset_1d(&values, u, 64);

        assert_eq!(fit.peak_count, 3);
        assert_relative_eq!(fit.offset, -0.002, epsilon = u / 64.0);
        assert!(fit.offset >= -0.5 * u && fit.offset < 0.5 * u);
    }

    #[test]
    fn test_best_offset_empty() {
        let fit = best_offset_1d(&[], 0.03, 128);
        assert_eq!(fit.peak_count, 0);
        assert_relative_eq!(fit.score, 1.0);
    }

    #[test]
    fn test_sample_points_deterministic() {
        let local: Vec<Vector3f> = (0..5000).map(|i| Vector3f::new(i as f32, 0.0, 0.0)).collect();
        let a = sample_points(&local, 100, 12345);
        let b = sample_points(&local, 100, 12345);

        assert_eq!(a.len(), 100);
        assert_eq!(a, b);
        let mut xs: Vec<i64> = a.iter().map(|p| p.x as i64).collect();
        xs.sort_unstable();
        xs.dedup();
        assert_eq!(xs.len(), 100, "sampling must not repeat points");

        assert_eq!(sample_points(&local[..10], 100, 1).len(), 10);
    }

    #[test]
    fn test_estimate_unit_recovers_cube_side() {
        let pts = hollow_cube(0.004, 0.03, 10);
        let (unit, score) = estimate_unit(&pts, &GridFitConfig::default()).unwrap();

        assert_relative_eq!(unit, 0.03, epsilon = 1e-5);
        assert!(score < 2.1, "score {score}");
    }

    #[test]
    fn test_fit_grid_fixed_unit() {
        let pts = hollow_cube(0.004, 0.03, 10);
        let config = GridFitConfig {
            auto_unit: false,
            ..Default::default()
        };
        let fit = fit_grid(&pts, &config);

        assert_relative_eq!(fit.spec.unit, 0.03);
        assert!(fit.unit_score.is_none());
        assert!(!fit.used_fallback);
        // mean height is a cell center, and the face planes become cell edges
        assert_relative_eq!(fit.spec.offset.y, 0.004, epsilon = 1e-5);
        for axis in [0, 2] {
            assert_relative_eq!(fit.spec.offset[axis], 0.004, epsilon = 0.03 / 128.0);
        }
    }

    #[test]
    fn test_settle_phase_keeps_filled_center() {
        // ten evenly spaced rows filling one cell around 0.0014
        let values: Vec<f32> = (0..10).map(|k| -0.0112 + 0.0028 * k as f32).collect();
        let u = 0.03;
        assert_relative_eq!(settle_phase(&values, u, 0.0014), 0.0014);

        // two filled cells side by side tie, so the peak phase stays
        let mut pair = values.clone();
        pair.extend(values.iter().map(|v| v + u));
        assert_relative_eq!(settle_phase(&pair, u, 0.0014), 0.0014);
    }

    #[test]
    fn test_settle_phase_moves_edges_onto_faces() {
        // two dense face planes with sparse rows between them
        let mut values = vec![-0.0149f32; 40];
        values.extend(vec![0.0149f32; 40]);
        values.extend((0..10).map(|k| -0.0135 + 0.003 * k as f32));
        let u = 0.03;

        let settled = settle_phase(&values, u, -0.015);
        assert_relative_eq!(settled, 0.0, epsilon = 1e-6);
        let grid = GridSpec::new(u, Vector3f::new(settled, 0.0, 0.0));
        assert!(values.iter().all(|&x| grid.index_along(0, x) == 0));
    }

    #[test]
    fn test_fit_grid_empty_falls_back() {
        let fit = fit_grid(&[], &GridFitConfig::default());
        assert!(fit.used_fallback);
        assert_relative_eq!(fit.spec.unit, 0.03);
    }
}
