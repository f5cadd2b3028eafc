//! Colour classification
//!
//! Every point receives an integer colour label. Two families of classifiers are
//! available:
//!
//! * **Fixed palette**: the colour is converted to HSV; dull or dark colours
//!   (saturation/value below the configured minimums) are [`UNCLASSIFIED`].
//!   Otherwise the hue is matched against the configured hue windows using the
//!   selected [`PalettePolicy`].
//! * **K-means**: colours are mapped to CIE-Lab or raw RGB feature vectors and
//!   clustered with a seeded k-means++ initialisation, so the labelling is
//!   deterministic for a given input.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use somagrid_core::{Rgb, UNCLASSIFIED};

/// How colours are turned into labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Hue windows from a fixed palette
    FixedPalette,
    /// Data-driven k-means over colour features
    KMeans,
}

/// Hue assignment rule used by the fixed palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PalettePolicy {
    /// The hue must fall inside a window; among containing windows the one whose
    /// center is circularly closest wins. Hues outside every window are unclassified.
    HueWindow,
    /// The window with the circularly closest center always wins once the
    /// saturation/value gate passes.
    NearestCenter,
}

/// Feature space for k-means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Lab,
    Rgb,
}

/// A `[min_deg, max_deg]` interval on the hue circle, wrap-around allowed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HueWindow {
    pub name: String,
    pub min_deg: f32,
    pub max_deg: f32,
    /// Colour used when rendering clusters of this label
    pub display_color: Rgb,
}

impl HueWindow {
    pub fn new(name: &str, min_deg: f32, max_deg: f32, display_color: Rgb) -> Self {
        Self {
            name: name.to_string(),
            min_deg,
            max_deg,
            display_color,
        }
    }

    /// Whether the hue (degrees) lies inside the window
    pub fn contains(&self, hue: f32) -> bool {
        if (self.min_deg - self.max_deg).abs() < 1e-6 {
            return (hue - self.min_deg).abs() < 1e-6;
        }
        if self.min_deg <= self.max_deg {
            hue >= self.min_deg && hue <= self.max_deg
        } else {
            (hue >= self.min_deg && hue <= 360.0) || (hue >= 0.0 && hue <= self.max_deg)
        }
    }

    /// Circular midpoint of the window
    pub fn center(&self) -> f32 {
        if self.min_deg <= self.max_deg {
            return 0.5 * (self.min_deg + self.max_deg);
        }
        let span = (360.0 - self.min_deg) + self.max_deg;
        let c = self.min_deg + 0.5 * span;
        if c >= 360.0 {
            c - 360.0
        } else {
            c
        }
    }
}

/// The palette of coloured pieces in the work-cell
pub fn default_hue_windows() -> Vec<HueWindow> {
    vec![
        HueWindow::new("Red", 350.0, 8.0, [255, 0, 0]),
        HueWindow::new("Orange", 18.0, 38.0, [255, 128, 0]),
        HueWindow::new("Yellow", 45.0, 70.0, [255, 255, 0]),
        HueWindow::new("YellowGreen", 82.0, 104.0, [153, 255, 51]),
        HueWindow::new("Green", 122.0, 160.0, [0, 255, 0]),
        HueWindow::new("SkyBlue", 195.0, 205.0, [0, 191, 255]),
        HueWindow::new("Navy", 206.0, 280.0, [0, 26, 128]),
    ]
}

/// K-means settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Number of colour clusters, 2..=12
    pub k: usize,
    pub color_space: ColorSpace,
    /// Maximum assignment/update rounds
    pub iterations: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 7,
            color_space: ColorSpace::Lab,
            iterations: 10,
            seed: 0xC0FFEE,
        }
    }
}

/// Colour classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub mode: ColorMode,
    pub policy: PalettePolicy,
    /// Minimum HSV saturation in [0, 1]
    pub min_saturation: f32,
    /// Minimum HSV value in [0, 1]
    pub min_value: f32,
    pub windows: Vec<HueWindow>,
    /// Also cluster points labelled [`UNCLASSIFIED`]
    pub include_unclassified: bool,
    pub kmeans: KMeansConfig,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            mode: ColorMode::FixedPalette,
            policy: PalettePolicy::HueWindow,
            min_saturation: 0.20,
            min_value: 0.20,
            windows: default_hue_windows(),
            include_unclassified: false,
            kmeans: KMeansConfig::default(),
        }
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

pub fn rgb_to_hsv(color: Rgb) -> Hsv {
    let r = color[0] as f32 / 255.0;
    let g = color[1] as f32 / 255.0;
    let b = color[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    Hsv { h: h % 360.0, s, v: max }
}

/// sRGB to CIE-Lab (D65 white point)
pub fn rgb_to_lab(color: Rgb) -> Vector3<f32> {
    fn linearize(u: f32) -> f32 {
        if u <= 0.04045 {
            u / 12.92
        } else {
            ((u + 0.055) / 1.055).powf(2.4)
        }
    }
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let r = linearize(color[0] as f32 / 255.0);
    let g = linearize(color[1] as f32 / 255.0);
    let b = linearize(color[2] as f32 / 255.0);

    let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
    let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
    let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

    let (fx, fy, fz) = (f(x / 0.95047), f(y), f(z / 1.08883));
    Vector3::new(116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

/// Circular distance between two hues in degrees, in `[0, 180]`
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % 360.0;
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Label a single colour against the configured palette
pub fn label_by_palette(color: Rgb, config: &ColorConfig) -> i32 {
    let hsv = rgb_to_hsv(color);
    if hsv.s < config.min_saturation || hsv.v < config.min_value {
        return UNCLASSIFIED;
    }

    let mut best = UNCLASSIFIED;
    let mut best_dist = f32::INFINITY;
    for (i, window) in config.windows.iter().enumerate() {
        if config.policy == PalettePolicy::HueWindow && !window.contains(hsv.h) {
            continue;
        }
        let d = hue_distance(hsv.h, window.center());
        if d < best_dist {
            best_dist = d;
            best = i as i32;
        }
    }
    best
}

/// A colour class produced by classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorClass {
    pub label: i32,
    pub name: String,
    pub display_color: Rgb,
}

/// Per-point labels plus the classes that clustering should visit
#[derive(Debug, Clone)]
pub struct ColorLabels {
    pub labels: Vec<i32>,
    pub classes: Vec<ColorClass>,
}

impl ColorLabels {
    /// Indices of all points carrying `label`, in ascending order
    pub fn indices_of(&self, label: i32) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Classify every colour according to `config`
pub fn classify_colors(colors: &[Rgb], config: &ColorConfig) -> ColorLabels {
    let (labels, mut classes) = match config.mode {
        ColorMode::FixedPalette => {
            let labels: Vec<i32> = colors
                .par_iter()
                .map(|c| label_by_palette(*c, config))
                .collect();
            let classes = config
                .windows
                .iter()
                .enumerate()
                .map(|(i, w)| ColorClass {
                    label: i as i32,
                    name: w.name.clone(),
                    display_color: w.display_color,
                })
                .collect::<Vec<_>>();
            (labels, classes)
        }
        ColorMode::KMeans => {
            let labels = kmeans_labels(colors, &config.kmeans);
            let k = labels.iter().copied().max().map_or(0, |m| m + 1);
            let classes = (0..k)
                .map(|label| ColorClass {
                    label,
                    name: format!("K{label}"),
                    display_color: mean_color(colors, &labels, label),
                })
                .collect::<Vec<_>>();
            (labels, classes)
        }
    };

    if config.include_unclassified {
        classes.push(ColorClass {
            label: UNCLASSIFIED,
            name: "Unclassified".to_string(),
            display_color: [255, 255, 255],
        });
    }

    ColorLabels { labels, classes }
}

fn mean_color(colors: &[Rgb], labels: &[i32], label: i32) -> Rgb {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (c, _) in colors.iter().zip(labels).filter(|(_, &l)| l == label) {
        for ch in 0..3 {
            sum[ch] += c[ch] as u64;
        }
        count += 1;
    }
    if count == 0 {
        return [255, 255, 255];
    }
    [
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ]
}

fn color_feature(color: Rgb, space: ColorSpace) -> Vector3<f32> {
    match space {
        ColorSpace::Lab => rgb_to_lab(color),
        ColorSpace::Rgb => Vector3::new(color[0] as f32, color[1] as f32, color[2] as f32),
    }
}

fn closest_center(x: &Vector3<f32>, centers: &[Vector3<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (k, c) in centers.iter().enumerate() {
        let d = (x - c).norm_squared();
        if d < best_dist {
            best_dist = d;
            best = k;
        }
    }
    best
}

/// Seeded k-means++ clustering of colours; labels are in `[0, k)`
pub fn kmeans_labels(colors: &[Rgb], config: &KMeansConfig) -> Vec<i32> {
    let n = colors.len();
    if n == 0 {
        return Vec::new();
    }
    let k = config.k.clamp(2, 12);
    let data: Vec<Vector3<f32>> = colors
        .par_iter()
        .map(|c| color_feature(*c, config.color_space))
        .collect();

    // k-means++ seeding
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut centers = Vec::with_capacity(k);
    centers.push(data[rng.gen_range(0..n)]);
    let mut dist = vec![0.0f32; n];
    while centers.len() < k {
        let mut sum = 0.0f32;
        for (i, x) in data.iter().enumerate() {
            let c = &centers[closest_center(x, &centers)];
            dist[i] = (x - c).norm_squared();
            sum += dist[i];
        }
        let r = rng.gen::<f32>() * sum;
        let mut acc = 0.0f32;
        let mut pick = 0;
        for (i, d) in dist.iter().enumerate() {
            acc += d;
            if acc >= r {
                pick = i;
                break;
            }
        }
        centers.push(data[pick]);
    }

    let mut labels = vec![usize::MAX; n];
    for _ in 0..config.iterations.max(1) {
        let assigned: Vec<usize> = data.par_iter().map(|x| closest_center(x, &centers)).collect();
        let changed = assigned != labels;
        labels = assigned;

        let mut sums = vec![Vector3::zeros(); k];
        let mut counts = vec![0usize; k];
        for (x, &l) in data.iter().zip(&labels) {
            sums[l] += x;
            counts[l] += 1;
        }
        for ((center, sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                *center = *sum / count as f32;
            }
        }

        if !changed {
            break;
        }
    }

    labels.into_iter().map(|l| l as i32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rgb_to_hsv_primaries() {
        let red = rgb_to_hsv([255, 0, 0]);
        assert_relative_eq!(red.h, 0.0);
        assert_relative_eq!(red.s, 1.0);
        assert_relative_eq!(red.v, 1.0);

        assert_relative_eq!(rgb_to_hsv([0, 255, 0]).h, 120.0, epsilon = 1e-3);
        assert_relative_eq!(rgb_to_hsv([0, 0, 255]).h, 240.0, epsilon = 1e-3);
        assert_relative_eq!(rgb_to_hsv([255, 0, 255]).h, 300.0, epsilon = 1e-3);

        let gray = rgb_to_hsv([128, 128, 128]);
        assert_relative_eq!(gray.s, 0.0);
    }

    #[test]
    fn test_lab_white_and_black() {
        let white = rgb_to_lab([255, 255, 255]);
        assert_relative_eq!(white.x, 100.0, epsilon = 0.1);
        assert!(white.y.abs() < 0.5 && white.z.abs() < 0.5);

        let black = rgb_to_lab([0, 0, 0]);
        assert_relative_eq!(black.x, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_hue_window_wraps() {
        let red = HueWindow::new("Red", 350.0, 8.0, [255, 0, 0]);
        assert!(red.contains(355.0));
        assert!(red.contains(3.0));
        assert!(!red.contains(20.0));
        assert_relative_eq!(red.center(), 359.0);

        let green = HueWindow::new("Green", 122.0, 160.0, [0, 255, 0]);
        assert_relative_eq!(green.center(), 141.0);
        assert!(!green.contains(120.0));
    }

    #[test]
    fn test_hue_distance_is_circular() {
        assert_relative_eq!(hue_distance(350.0, 10.0), 20.0);
        assert_relative_eq!(hue_distance(10.0, 350.0), 20.0);
        assert_relative_eq!(hue_distance(90.0, 270.0), 180.0);
    }

    #[test]
    fn test_window_policy_labels() {
        let config = ColorConfig::default();

        assert_eq!(label_by_palette([255, 0, 0], &config), 0);
        assert_eq!(label_by_palette([255, 128, 0], &config), 1);
        assert_eq!(label_by_palette([0, 0, 255], &config), 6);
        // pure green sits at 120 deg, just below the Green window
        assert_eq!(label_by_palette([0, 255, 0], &config), UNCLASSIFIED);
        // saturation gate
        assert_eq!(label_by_palette([128, 128, 128], &config), UNCLASSIFIED);
        // value gate
        assert_eq!(label_by_palette([30, 0, 0], &config), UNCLASSIFIED);
    }

    #[test]
    fn test_nearest_center_policy_always_assigns() {
        let config = ColorConfig {
            policy: PalettePolicy::NearestCenter,
            ..Default::default()
        };

        assert_eq!(label_by_palette([0, 255, 0], &config), 4);
        assert_eq!(label_by_palette([255, 0, 0], &config), 0);
        assert_eq!(label_by_palette([128, 128, 128], &config), UNCLASSIFIED);
    }

    #[test]
    fn test_classify_includes_unclassified_class() {
        let config = ColorConfig {
            include_unclassified: true,
            ..Default::default()
        };
        let labels = classify_colors(&[[255, 0, 0], [10, 10, 10]], &config);

        assert_eq!(labels.labels, vec![0, UNCLASSIFIED]);
        assert_eq!(labels.classes.len(), config.windows.len() + 1);
        assert_eq!(labels.indices_of(UNCLASSIFIED), vec![1]);
    }

    #[test]
    fn test_kmeans_separates_distinct_colors() {
        let mut colors = Vec::new();
        for i in 0..50u8 {
            colors.push([250 - i % 5, i % 5, 0]);
            colors.push([i % 5, 0, 250 - i % 5]);
        }
        let config = KMeansConfig {
            k: 2,
            ..Default::default()
        };
        let labels = kmeans_labels(&colors, &config);

        assert_eq!(labels.len(), colors.len());
        let red_label = labels[0];
        let blue_label = labels[1];
        assert_ne!(red_label, blue_label);
        for (i, &l) in labels.iter().enumerate() {
            let expected = if i % 2 == 0 { red_label } else { blue_label };
            assert_eq!(l, expected);
        }
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let colors: Vec<Rgb> = (0..200u32)
            .map(|i| [(i * 37 % 256) as u8, (i * 91 % 256) as u8, (i * 13 % 256) as u8])
            .collect();
        let config = KMeansConfig::default();

        assert_eq!(kmeans_labels(&colors, &config), kmeans_labels(&colors, &config));
    }
}
