//! JSON pipeline configuration files
//!
//! Every section is `#[serde(default)]`, so a file only needs the fields it
//! overrides. Loaded configurations are validated before they are returned.

use crate::error::IoError;
use somagrid_algorithms::PipelineConfig;
use somagrid_core::Result;
use std::fs;
use std::path::Path;

/// Parse and validate a configuration from JSON text
pub fn config_from_str(json: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = serde_json::from_str(json).map_err(IoError::from)?;
    config.validate()?;
    Ok(config)
}

/// Pretty-printed JSON for a configuration
pub fn config_to_string(config: &PipelineConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config).map_err(IoError::from)?)
}

/// Load a configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let config = config_from_str(&text)?;
    log::debug!("loaded pipeline config from {}", path.display());
    Ok(config)
}

/// Write a configuration file
pub fn save_config<P: AsRef<Path>>(config: &PipelineConfig, path: P) -> Result<()> {
    fs::write(path, config_to_string(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use somagrid_algorithms::{ColorMode, Connectivity};

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{
            "grid": { "unit_guess": 0.025, "auto_unit": false },
            "clustering": { "connectivity": "Six" }
        }"#;
        let config = config_from_str(json).unwrap();

        assert_eq!(config.grid.unit_guess, 0.025);
        assert!(!config.grid.auto_unit);
        assert_eq!(config.grid.offset_bins, 128);
        assert_eq!(config.clustering.connectivity, Connectivity::Six);
        assert_eq!(config.clustering.min_points_per_cluster, 200);
        assert_eq!(config.color.mode, ColorMode::FixedPalette);
        assert_eq!(config.voting, PipelineConfig::default().voting);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config_from_str(r#"{ "faces": { "coverage_grid": 2 } }"#).unwrap_err();
        assert!(matches!(err, somagrid_core::Error::InvalidConfig(_)));

        let err = config_from_str(r#"{ "grid": { "unit_min": 0.04, "unit_max": 0.03 } }"#).unwrap_err();
        assert!(matches!(err, somagrid_core::Error::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json_is_invalid_data() {
        let err = config_from_str("{ \"grid\": ").unwrap_err();
        assert!(matches!(err, somagrid_core::Error::InvalidData(_)));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut config = PipelineConfig::default();
        config.voting.boundary_band = [0.2, 0.1, 0.2];
        config.faces.require_quadrants = true;

        let text = config_to_string(&config).unwrap();
        assert_eq!(config_from_str(&text).unwrap(), config);
    }
}
