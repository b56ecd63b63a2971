//! Administrator configuration
//!
//! Holds the threshold table (metric name -> minimum passing score, with a
//! human-readable description) and the commands used to launch the four
//! external metric programs. The file lives at
//! `<data_dir>/audioqa/config.json` and is read once at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metric declared twice in threshold table: {0}")]
    DuplicateMetric(String),
}

/// One row of the threshold table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStandard {
    /// Metric name as produced by the runners (e.g. `SIGMOS_OVRL`)
    pub name: String,
    /// Minimum passing score; `None` means every score fails
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Short description shown next to the score
    #[serde(default)]
    pub description: String,
}

impl MetricStandard {
    fn new(name: &str, min_score: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            min_score: Some(min_score),
            description: description.to_string(),
        }
    }
}

/// Ordered, read-only mapping of metric name to threshold and description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    entries: Vec<MetricStandard>,
}

impl ThresholdTable {
    /// Build a table, rejecting duplicate metric names
    pub fn new(entries: Vec<MetricStandard>) -> Result<Self, ConfigError> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(ConfigError::DuplicateMetric(entry.name.clone()));
            }
        }
        Ok(())
    }

    fn find(&self, metric: &str) -> Option<&MetricStandard> {
        self.entries.iter().find(|e| e.name == metric)
    }

    /// Minimum passing score for a metric, if one is configured
    pub fn threshold(&self, metric: &str) -> Option<f64> {
        self.find(metric).and_then(|e| e.min_score)
    }

    /// Description for a metric, if one is configured
    pub fn description(&self, metric: &str) -> Option<&str> {
        self.find(metric).map(|e| e.description.as_str())
    }

    /// Entries in configured order
    pub fn entries(&self) -> &[MetricStandard] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How to launch one external metric program
///
/// The audio file path is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerCommand {
    /// Executable name (looked up on PATH) or path
    pub program: String,
    /// Arguments placed before the audio path
    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerCommand {
    fn python_module(module: &str) -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), module.to_string()],
        }
    }
}

fn default_srmr() -> RunnerCommand {
    RunnerCommand::python_module("metrics.srmr_metric")
}

fn default_sigmos() -> RunnerCommand {
    RunnerCommand::python_module("metrics.sigmos_metric")
}

fn default_vqscore() -> RunnerCommand {
    RunnerCommand::python_module("metrics.vqscore_metric")
}

fn default_wvmos() -> RunnerCommand {
    RunnerCommand::python_module("metrics.wvmos_metric")
}

/// Commands for the four metric runners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_srmr")]
    pub srmr: RunnerCommand,
    #[serde(default = "default_sigmos")]
    pub sigmos: RunnerCommand,
    #[serde(default = "default_vqscore")]
    pub vqscore: RunnerCommand,
    #[serde(default = "default_wvmos")]
    pub wvmos: RunnerCommand,
    /// Working directory for all runners (where the metric modules live)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            srmr: default_srmr(),
            sigmos: default_sigmos(),
            vqscore: default_vqscore(),
            wvmos: default_wvmos(),
            working_dir: None,
        }
    }
}

fn default_thresholds() -> ThresholdTable {
    ThresholdTable {
        entries: vec![
            MetricStandard::new(
                "SRMR",
                8.0,
                "Technical measurement of reverberation and room acoustics",
            ),
            MetricStandard::new("SIGMOS_DISC", 3.0, "Audio continuity and smoothness"),
            MetricStandard::new("SIGMOS_OVRL", 3.0, "Comprehensive overall audio quality"),
            MetricStandard::new("SIGMOS_REVERB", 3.0, "Perceived reverberation quality"),
            MetricStandard::new("VQScore", 0.6, "Overall voice quality assessment"),
            MetricStandard::new("WVMOS", 2.5, "Predicted subjective quality rating"),
        ],
    }
}

/// Full administrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Passing criteria, displayed verbatim in the dashboard sidebar
    #[serde(default = "default_thresholds")]
    pub thresholds: ThresholdTable,
    /// External metric programs
    #[serde(default)]
    pub runners: RunnerConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            runners: RunnerConfig::default(),
        }
    }
}

impl QualityConfig {
    /// Config file path: `<data_dir>/audioqa/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("audioqa")
            .join("config.json")
    }

    /// Parse a config file, failing on any error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    metrics = config.thresholds.len(),
                    "Loaded config from disk"
                );
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }
}
