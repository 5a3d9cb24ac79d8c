//! `.cadence/config.toml` loading.
//!
//! Every field is optional; a missing file yields the defaults. An unreadable
//! or malformed file is an error rather than a silent fallback.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use nodes::CoordinatorConfig;
use pipeline::BackoffSchedule;
use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Persisted memory record.
    pub memory_path: PathBuf,

    /// Directory receiving output and failure records.
    pub output_dir: PathBuf,

    pub step_timeout_secs: u64,
    pub max_retries: u32,

    /// First retry delay; doubled for each retry after.
    pub backoff_base_ms: u64,

    pub recent_topic_window_days: u32,
    pub log_format: LogFormat,

    /// OTLP/gRPC collector; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            memory_path: PathBuf::from(".cadence/memory.json"),
            output_dir: PathBuf::from(".cadence/outputs"),
            step_timeout_secs: 30,
            max_retries: 2,
            backoff_base_ms: 1000,
            recent_topic_window_days: 30,
            log_format: LogFormat::Pretty,
            otlp_endpoint: None,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("invalid configuration in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read configuration {}", path.display()))
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            backoff: BackoffSchedule {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.backoff_base_ms),
            },
            recent_topic_window_days: self.recent_topic_window_days,
            ..CoordinatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config = CliConfig::parse(
            r#"
            memory_path = "/tmp/mem.json"
            max_retries = 4
            backoff_base_ms = 250
            log_format = "json"
            otlp_endpoint = "http://localhost:4317"
            "#,
        )
        .unwrap();

        assert_eq!(config.memory_path, PathBuf::from("/tmp/mem.json"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.step_timeout_secs, 30);

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.backoff.max_retries, 4);
        assert_eq!(coordinator.backoff.delay_for(2), Duration::from_millis(500));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CliConfig::parse("step_timeout = 5").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_retries = \"many\"").unwrap();
        assert!(CliConfig::load(&path).is_err());
    }
}
