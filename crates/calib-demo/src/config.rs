use crate::calibrate::CalibrationOptions;
use crate::core::PatternSize;
use crate::detect::DetectorParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the pipeline needs besides the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inner corners per row and column; 9x6 unless overridden.
    pub pattern: PatternSize,
    pub detector: DetectorParams,
    pub calibration: CalibrationOptions,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_pattern(mut self, pattern: PatternSize) -> Self {
        self.pattern = pattern;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{
                "pattern": { "cols": 7, "rows": 5 },
                "calibration": { "fix_k3": true }
            }"#,
        )
        .expect("config");
        assert_eq!(cfg.pattern, PatternSize::new(7, 5).expect("pattern"));
        assert!(cfg.calibration.fix_k3);
        assert!(!cfg.calibration.fix_principal_point);
        assert_eq!(cfg.detector, DetectorParams::default());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let res: Result<PipelineConfig, _> =
            serde_json::from_str(r#"{ "pattern": { "cols": 1, "rows": 5 } }"#);
        assert!(res.is_err());
    }

    #[test]
    fn loads_from_file_and_reports_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{ "detector": {{ "threshold_rel": 0.05 }} }}"#).expect("write");
        let cfg = PipelineConfig::from_json_file(file.path()).expect("config");
        assert_eq!(cfg.detector.threshold_rel, 0.05);
        assert_eq!(cfg.pattern, PatternSize::default());

        let missing = PipelineConfig::from_json_file("/definitely/not/here.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut bad = tempfile::NamedTempFile::new().expect("tempfile");
        write!(bad, "not json").expect("write");
        assert!(matches!(
            PipelineConfig::from_json_file(bad.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
