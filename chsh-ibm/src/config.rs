//! Experiment configuration
//!
//! Read from `chsh.json` in the working directory when present; every
//! field is optional and falls back to the defaults below. Credentials are
//! never part of this file.
//!
//! ```json
//! {
//!   "num_phases": 21,
//!   "backend": { "min_num_qubits": 127 },
//!   "output": { "directory": "out", "results_csv": "results.csv" }
//! }
//! ```

use crate::backend::BackendFilter;
use crate::error::{ChshError, Result};
use crate::{DEFAULT_NUM_PHASES, IBM_QUANTUM_API_URL, MAX_WAIT_TIME, POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file name
pub const CONFIG_FILE: &str = "chsh.json";

// =============================================================================
// Backend Selection
// =============================================================================

/// Which device to run on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Explicit backend name; skips least-busy selection
    pub name: Option<String>,

    /// Criteria for least-busy selection
    #[serde(flatten)]
    pub filter: BackendFilter,
}

// =============================================================================
// Output Files
// =============================================================================

/// Where results go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for every output file; must exist
    pub directory: PathBuf,

    /// Logical circuit diagram
    pub circuit_image: String,

    /// ISA circuit diagram
    pub isa_circuit_image: String,

    /// Witness plot
    pub results_image: String,

    /// Optional CSV export of the sweep
    pub results_csv: Option<String>,

    /// Render the three images
    pub render_images: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            circuit_image: "bell_inequality.png".to_string(),
            isa_circuit_image: "bell_inequality_optimized.png".to_string(),
            results_image: "results_graph.png".to_string(),
            results_csv: None,
            render_images: true,
        }
    }
}

impl OutputConfig {
    pub fn circuit_image_path(&self) -> PathBuf {
        self.directory.join(&self.circuit_image)
    }

    pub fn isa_circuit_image_path(&self) -> PathBuf {
        self.directory.join(&self.isa_circuit_image)
    }

    pub fn results_image_path(&self) -> PathBuf {
        self.directory.join(&self.results_image)
    }

    pub fn results_csv_path(&self) -> Option<PathBuf> {
        self.results_csv.as_ref().map(|f| self.directory.join(f))
    }
}

// =============================================================================
// Experiment Configuration
// =============================================================================

/// Complete experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Sweep points over [0, 2π]
    pub num_phases: usize,

    /// Device selection
    pub backend: BackendConfig,

    /// Shots per point; the service default when absent
    pub shots: Option<u32>,

    /// Estimator resilience level (0-2)
    pub resilience_level: u8,

    /// Transpiler optimization level (0-3)
    pub optimization_level: u8,

    /// Output files
    pub output: OutputConfig,

    /// Seconds between job status polls
    pub poll_interval_secs: u64,

    /// Seconds before a job is abandoned
    pub max_wait_secs: u64,

    /// Runtime API base URL
    pub api_url: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            num_phases: DEFAULT_NUM_PHASES,
            backend: BackendConfig::default(),
            shots: None,
            resilience_level: 1,
            optimization_level: 3,
            output: OutputConfig::default(),
            poll_interval_secs: POLL_INTERVAL,
            max_wait_secs: MAX_WAIT_TIME,
            api_url: IBM_QUANTUM_API_URL.to_string(),
        }
    }
}

impl ExperimentConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ChshError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise validated defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.num_phases < 2 {
            return Err(ChshError::InvalidSweepSize(self.num_phases));
        }
        if self.resilience_level > 2 {
            return Err(ChshError::InvalidConfig(format!(
                "resilience_level must be 0-2, got {}",
                self.resilience_level
            )));
        }
        if self.optimization_level > 3 {
            return Err(ChshError::InvalidConfig(format!(
                "optimization_level must be 0-3, got {}",
                self.optimization_level
            )));
        }
        if self.shots == Some(0) {
            return Err(ChshError::InvalidConfig("shots must be positive".into()));
        }
        if self.poll_interval_secs == 0 || self.max_wait_secs == 0 {
            return Err(ChshError::InvalidConfig(
                "poll_interval_secs and max_wait_secs must be positive".into(),
            ));
        }
        if self.api_url.trim().is_empty() {
            return Err(ChshError::InvalidConfig("api_url is empty".into()));
        }

        let output = &self.output;
        let names = [
            ("circuit_image", Some(&output.circuit_image)),
            ("isa_circuit_image", Some(&output.isa_circuit_image)),
            ("results_image", Some(&output.results_image)),
            ("results_csv", output.results_csv.as_ref()),
        ];
        for (field, name) in names {
            if let Some(name) = name {
                if name.trim().is_empty() {
                    return Err(ChshError::InvalidConfig(format!("output.{} is empty", field)));
                }
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.num_phases, 21);
        assert_eq!(config.backend.name, None);
        assert_eq!(config.backend.filter.min_num_qubits, 127);
        assert!(config.backend.filter.operational);
        assert!(!config.backend.filter.simulator);
        assert_eq!(config.optimization_level, 3);
        assert_eq!(config.api_url, "https://api.quantum.ibm.com/runtime");
        assert_eq!(
            config.output.results_image_path(),
            PathBuf::from(".").join("results_graph.png")
        );
        assert!(config.output.results_csv_path().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "num_phases": 41,
                "backend": {"name": "ibm_torino", "min_num_qubits": 100},
                "output": {"directory": "out", "results_csv": "results.csv"},
                "api_url": "https://eu-de.quantum-computing.cloud.ibm.com"
            }"#,
        )
        .unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.num_phases, 41);
        assert_eq!(config.backend.name.as_deref(), Some("ibm_torino"));
        assert_eq!(config.backend.filter.min_num_qubits, 100);
        assert!(config.backend.filter.operational);
        assert_eq!(config.api_url, "https://eu-de.quantum-computing.cloud.ibm.com");
        assert_eq!(config.output.circuit_image, "bell_inequality.png");
        assert_eq!(
            config.output.results_csv_path(),
            Some(PathBuf::from("out").join("results.csv"))
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_validation() {
        let config = ExperimentConfig {
            num_phases: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ChshError::InvalidSweepSize(1))
        ));

        let mut config = ExperimentConfig::default();
        config.output.results_image = " ".into();
        assert!(config.validate().is_err());

        let config = ExperimentConfig {
            resilience_level: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ExperimentConfig {
            shots: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"num_phases": "many"}"#).unwrap();

        let err = ExperimentConfig::load(&path).unwrap_err();
        assert!(matches!(err, ChshError::InvalidConfig(_)));
    }
}
