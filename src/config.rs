use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attribute that carries the traceability id of every feature.
pub const ID_FIELD_NAME: &str = "qa_assistant_id";
/// Extra attribute written on review features.
pub const QA_ISSUE_FIELD: &str = "qa_issue";
pub const AREA_FIELD: &str = "Area";

/// Polygons below this many hectares are candidates for point conversion.
pub const MIN_AREA_HA_FOR_POLYGON: f64 = 4.0;
pub const M2_PER_HECTARE: f64 = 10_000.0;
/// Simplification tolerance, in degrees.
pub const SIMPLIFY_TOLERANCE: f64 = 1e-4;

/// Per-run toggles supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub simplify: bool,
    pub autofix: bool,
    pub identify_candidates: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            simplify: true,
            autofix: true,
            identify_candidates: true,
        }
    }
}

impl PartitionConfig {
    /// Reads a JSON config file; fields missing from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_enable_everything() {
        let config = PartitionConfig::default();
        assert!(config.simplify && config.autofix && config.identify_candidates);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "simplify": false }}"#).unwrap();

        let config = PartitionConfig::from_json_file(file.path()).unwrap();
        assert!(!config.simplify);
        assert!(config.autofix);
        assert!(config.identify_candidates);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = PartitionConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
