//! JSON export of build reports

use crate::error::IoError;
use somagrid_algorithms::BuildReport;
use somagrid_core::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Report export settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportExportOptions {
    pub pretty: bool,
    /// Keep per-cluster point index lists, which dominate the output size
    pub include_indices: bool,
}

impl Default for ReportExportOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            include_indices: false,
        }
    }
}

fn prepare<'a>(report: &'a BuildReport, options: &ReportExportOptions) -> std::borrow::Cow<'a, BuildReport> {
    if options.include_indices {
        return std::borrow::Cow::Borrowed(report);
    }
    let mut stripped = report.clone();
    for cluster in &mut stripped.clusters {
        cluster.indices.clear();
    }
    std::borrow::Cow::Owned(stripped)
}

/// Serialise a report to a JSON string
pub fn report_to_json(report: &BuildReport, options: &ReportExportOptions) -> Result<String> {
    let report = prepare(report, options);
    let text = if options.pretty {
        serde_json::to_string_pretty(report.as_ref())
    } else {
        serde_json::to_string(report.as_ref())
    };
    Ok(text.map_err(IoError::from)?)
}

/// Write a report as JSON
pub fn write_report_json<P: AsRef<Path>>(
    report: &BuildReport,
    path: P,
    options: &ReportExportOptions,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let report = prepare(report, options);
    if options.pretty {
        serde_json::to_writer_pretty(&mut writer, report.as_ref()).map_err(IoError::from)?;
    } else {
        serde_json::to_writer(&mut writer, report.as_ref()).map_err(IoError::from)?;
    }
    writer.flush()?;
    log::info!(
        "wrote report with {} clusters and {} faces to {}",
        report.clusters.len(),
        report.face_count(),
        path.display()
    );
    Ok(())
}

/// Read a report previously written by [`write_report_json`]
pub fn read_report_json<P: AsRef<Path>>(path: P) -> Result<BuildReport> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text).map_err(IoError::from)?)
}
