//! Benchmarks for the full extraction pass and its heaviest stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use somagrid_algorithms::{
    classify_colors, fit_grid, voxel_clusters, ColorConfig, Connectivity, GridFitConfig,
    PieceExtractor, PipelineConfig,
};
use somagrid_core::{ColoredPointCloud3f, Point3f, Rgb, Vector3f};

const UNIT: f32 = 0.03;
const COLORS: [Rgb; 4] = [[220, 20, 20], [230, 200, 20], [30, 180, 40], [20, 40, 200]];

/// Row of `pieces` L-shaped pieces, `per_axis`^3 points per cell
fn generate_scene(pieces: usize, per_axis: usize) -> ColoredPointCloud3f {
    let cells = [[0, 0, 0], [1, 0, 0], [0, 0, 1]];
    let step = UNIT / per_axis as f32;
    let mut positions = Vec::new();
    let mut colors = Vec::new();

    for p in 0..pieces {
        let origin = Point3f::new(p as f32 * 0.15, 0.0, 0.0);
        let color = COLORS[p % COLORS.len()];
        for cell in &cells {
            for i in 0..per_axis {
                for j in 0..per_axis {
                    for k in 0..per_axis {
                        let offset = |c: i32, n: usize| c as f32 * UNIT + (n as f32 + 0.5) * step - UNIT * 0.5;
                        positions.push(Point3f::new(
                            origin.x + offset(cell[0], i),
                            origin.y + offset(cell[1], j),
                            origin.z + offset(cell[2], k),
                        ));
                        colors.push(color);
                    }
                }
            }
        }
    }

    ColoredPointCloud3f::from_parts(&positions, Some(&colors)).unwrap()
}

fn bench_full_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for &pieces in &[1usize, 4, 8] {
        let cloud = generate_scene(pieces, 10);
        group.bench_with_input(
            BenchmarkId::new("pieces", format!("{}p_{}pts", pieces, cloud.len())),
            &cloud,
            |b, cloud| {
                let extractor = PieceExtractor::new(PipelineConfig::default()).unwrap();
                b.iter(|| {
                    extractor.reset_axis_lock();
                    let report = extractor.build(black_box(cloud)).unwrap();
                    black_box(report);
                });
            },
        );
    }

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let cloud = generate_scene(4, 10);
    let positions = cloud.positions();
    let colors = cloud.colors();
    let all: Vec<usize> = (0..positions.len()).collect();
    let local: Vec<Vector3f> = positions.iter().map(|p| p.coords).collect();

    c.bench_function("classify_colors", |b| {
        let config = ColorConfig::default();
        b.iter(|| black_box(classify_colors(black_box(&colors), &config)));
    });

    c.bench_function("voxel_clusters", |b| {
        b.iter(|| {
            black_box(voxel_clusters(
                black_box(&positions),
                &all,
                0.0045,
                Connectivity::TwentySix,
                200,
            ))
        });
    });

    c.bench_function("fit_grid_auto_unit", |b| {
        let config = GridFitConfig::default();
        b.iter(|| black_box(fit_grid(black_box(&local), &config)));
    });
}

criterion_group!(benches, bench_full_build, bench_stages);
criterion_main!(benches);
