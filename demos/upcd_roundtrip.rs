//! UPCD round trip demo
//!
//! Writes a sensor-local scan of one cube to a UPCD file together with its
//! world transform, reads it back into world space, runs a build and exports
//! the report and the configuration used as JSON.

use anyhow::Context;
use nalgebra::{Matrix4, Vector3};
use somagrid::prelude::*;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("somagrid UPCD round trip demo");
    println!("=============================");

    let out_dir = std::env::temp_dir().join("somagrid_demo");
    std::fs::create_dir_all(&out_dir).context("Failed to create output directory")?;
    let scan_path = out_dir.join("pcd_0001.bin");
    let config_path = out_dir.join("pipeline.json");
    let report_path = out_dir.join("report.json");

    // a filled 0.03 m cube in sensor coordinates
    let mut local = ColoredPointCloud3f::new();
    for i in 0..10 {
        for j in 0..10 {
            for k in 0..10 {
                let at = |n: i32| -0.0126 + 0.0028 * n as f32;
                local.push(ColoredPoint3f::new(Point3f::new(at(i), at(j), at(k)), [230, 200, 20]));
            }
        }
    }

    // sensor sits 1.2 m in front of the table
    let sensor_to_world = Matrix4::new_translation(&Vector3::new(0.4, 0.0, 1.2));
    UpcdWriter::write_file(
        &local,
        &scan_path,
        &UpcdWriteOptions {
            coordinate_space: CoordinateSpace::Local,
            include_colors: true,
            transform: sensor_to_world,
        },
    )?;
    println!("Wrote {} points to {}", local.len(), scan_path.display());

    let loaded = UpcdReader::read_file(&scan_path, &UpcdReadOptions::default())?;
    println!(
        "Read back {} points ({:?} space), bounds {:?}",
        loaded.cloud.len(),
        loaded.coordinate_space,
        loaded.cloud.bounding_box()
    );

    let mut config = PipelineConfig::default();
    // a filled cube is smaller than the default gate's minimum extent
    config.shape_gate.min_longest = 0.02;
    config.shape_gate.min_points_per_voxel = 0.0;
    config.grid.auto_unit = false;
    save_config(&config, &config_path)?;
    println!("Saved configuration to {}", config_path.display());

    let extractor = PieceExtractor::new(load_config(&config_path)?)?;
    let report = extractor.build(&loaded.cloud)?;
    for cluster in report.accepted() {
        println!(
            "{}: {} cells, {} faces, frame origin {:?}",
            cluster.name,
            cluster.cells.len(),
            cluster.faces.len(),
            cluster.frame.map(|f| f.origin)
        );
        for face in &cluster.faces {
            println!("  {} at {:?}", face.direction.label(), face.center);
        }
    }

    write_report_json(&report, &report_path, &ReportExportOptions::default())?;
    println!("Wrote report to {}", report_path.display());
    Ok(())
}
