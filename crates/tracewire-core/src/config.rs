//! Agent configuration.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Logical service name written into segments and outbound carriers.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Name of this service instance.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Peers longer than this are shortened before tagging.
    #[serde(default = "default_peer_max_length")]
    pub peer_max_length: usize,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub reporter: ReporterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub plugin: PluginConfig,
}

fn default_service_name() -> String {
    "tracewire-service".to_string()
}

fn default_instance_name() -> String {
    format!("{}@local", std::process::id())
}

fn default_peer_max_length() -> usize {
    200
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            instance_name: default_instance_name(),
            peer_max_length: default_peer_max_length(),
            correlation: CorrelationConfig::default(),
            reporter: ReporterConfig::default(),
            logging: LoggingConfig::default(),
            plugin: PluginConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(crate::Error::Config("service_name must not be empty".into()));
        }
        if self.reporter.queue_capacity == 0 {
            return Err(crate::Error::Config(
                "reporter.queue_capacity must be positive".into(),
            ));
        }
        if self.peer_max_length < 3 {
            return Err(crate::Error::Config(
                "peer_max_length must leave room for the \"...\" suffix".into(),
            ));
        }
        Ok(())
    }
}

/// Limits applied to the correlation header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_element_max_number")]
    pub element_max_number: usize,
    #[serde(default = "default_value_max_length")]
    pub value_max_length: usize,
}

fn default_element_max_number() -> usize {
    3
}

fn default_value_max_length() -> usize {
    128
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            element_max_number: default_element_max_number(),
            value_max_length: default_value_max_length(),
        }
    }
}

/// Segment hand-off settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Segments buffered before new ones are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1500
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Diagnostic logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub http: HttpPluginConfig,
}

/// Settings for the HTTP entry interceptor.
///
/// Thresholds: `0` omits the tag, a negative value records the full value,
/// a positive value keeps that many leading characters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpPluginConfig {
    #[serde(default)]
    pub headers_length_threshold: i32,
    #[serde(default)]
    pub body_length_threshold: i32,
    #[serde(default)]
    pub params_length_threshold: i32,
    /// Tag the status code as seen after the framework's exception handling.
    #[serde(default)]
    pub after_exception_handling: bool,
}
