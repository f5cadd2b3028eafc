//! I/O for somagrid
//!
//! This crate reads and writes UPCD binary point clouds, loads and saves the
//! pipeline configuration as JSON and exports build reports.

pub mod upcd;
pub mod config;
pub mod export;
pub mod error;

pub use error::*;
pub use upcd::{
    read_merged, read_upcd, transform_point, write_upcd, CoordinateSpace, UpcdCloud, UpcdHeader,
    UpcdReadOptions, UpcdReader, UpcdWriteOptions, UpcdWriter,
};
pub use config::{config_from_str, config_to_string, load_config, save_config};
pub use export::{read_report_json, report_to_json, write_report_json, ReportExportOptions};

use somagrid_core::{ColoredPointCloud3f, Result};
use std::path::Path;

/// Auto-detect format and read a coloured point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P, options: &UpcdReadOptions) -> Result<ColoredPointCloud3f> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some("bin") | Some("upcd") => Ok(UpcdReader::read_file(path, options)?.cloud),
        _ => Err(somagrid_core::Error::UnsupportedFormat(format!(
            "Unsupported point cloud format: {:?}",
            path.extension()
        ))),
    }
}
