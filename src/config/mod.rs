//! Configuration management for Logtune
//!
//! A tuning configuration document declares the log format, the ordered
//! preprocessing regexes, the parsing method under tuning, and the range of
//! every tunable parameter. Everything is validated at load time, before
//! any grid work starts.

use crate::error::{Result, TuneError};
use crate::evaluate::Objective;
use crate::grid::ParameterSpec;
use crate::parsers::Method;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneConfig {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    pub tuning: TuningConfig,
    pub parser: ParserConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

/// Log-source description: message format and preprocessing masks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Log message format with named placeholders, e.g.
    /// `<Date> <Time> <Pid> <Level> <Component>: <Content>`
    pub log_format: String,
    /// Ordered regex substitutions masking variable tokens before parsing
    #[serde(default)]
    pub preprocess: Vec<String>,
}

/// Parsing method selection and its tunable parameter ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub method: Method,
    /// Regex template file; required by (and only by) the regex method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_file: Option<PathBuf>,
    /// Declaration order defines the grid axis order
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ParserConfig {
    /// Cross-check declared parameters against the method's requirements.
    ///
    /// A configuration/method mismatch is detectable before running the
    /// grid, so it fails here at load time rather than mid-search.
    pub fn validate_parameters(&self) -> Result<()> {
        let required = self.method.required_parameters();

        for &name in required {
            if !self.parameters.iter().any(|p| p.name == name) {
                return Err(TuneError::MissingParameter {
                    method: self.method.to_string(),
                    name: name.to_string(),
                    message: "missing required".to_string(),
                });
            }
        }
        for spec in &self.parameters {
            if !required.contains(&spec.name.as_str()) {
                return Err(TuneError::MissingParameter {
                    method: self.method.to_string(),
                    name: spec.name.clone(),
                    message: "does not recognize".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub objective: Objective,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            objective: Objective::Accuracy,
        }
    }
}

/// Search execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Worker count; 0 selects the machine's available parallelism
    #[serde(default)]
    pub workers: usize,
    /// Per-grid-point timeout; a timed-out point is recorded as failed
    #[serde(default = "default_point_timeout")]
    pub point_timeout_secs: u64,
}

fn default_point_timeout() -> u64 {
    60
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            point_timeout_secs: default_point_timeout(),
        }
    }
}

impl TuneConfig {
    /// Load a configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TuneError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TuneError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: TuneConfig = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;
        config.parser.validate_parameters()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TuneError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LOGTUNE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LOGTUNE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "SEARCH__WORKERS" => {
                self.search.workers =
                    value.parse().map_err(|_| TuneError::Config(format!(
                        "Cannot parse '{}' as worker count",
                        value
                    )))?;
            }
            "SEARCH__POINT_TIMEOUT_SECS" => {
                self.search.point_timeout_secs =
                    value.parse().map_err(|_| TuneError::Config(format!(
                        "Cannot parse '{}' as timeout seconds",
                        value
                    )))?;
            }
            "EVALUATION__OBJECTIVE" => {
                self.evaluation.objective = match value {
                    "accuracy" => Objective::Accuracy,
                    "f_measure" => Objective::FMeasure,
                    "goodness" => Objective::Goodness,
                    _ => {
                        return Err(TuneError::Config(format!(
                            "Unknown objective '{}'",
                            value
                        )))
                    }
                };
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TuneError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("logtune").join("config.toml"))
    }
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            meta: MetaConfig::default(),
            tuning: TuningConfig {
                log_format: "<Date> <Time> <Pid> <Level> <Component>: <Content>".to_string(),
                preprocess: vec![
                    r"blk_-?\d+".to_string(),
                    r"(\d+\.){3}\d+(:\d+)?".to_string(),
                ],
            },
            parser: ParserConfig {
                method: Method::Iplom,
                templates_file: None,
                parameters: vec![
                    ParameterSpec::new("step2Support", 0.0, 0.1, 0.05),
                    ParameterSpec::fixed("PST", 0.0),
                    ParameterSpec::new("CT", 0.3, 0.5, 0.1),
                    ParameterSpec::fixed("lowerBound", 0.1),
                    ParameterSpec::fixed("upperBound", 0.9),
                ],
            },
            evaluation: EvaluationConfig::default(),
            search: SearchConfig::default(),
        }
    }
}
