//! Typed configuration.
//!
//! Process settings come from environment variables ([`Config::from_env`]).
//! Pipeline tuning (backlog, cadence, rate limits) comes from an optional
//! TOML file ([`PipelineConfig::load`]); every field has a default.
//! The database URL is wrapped in `secrecy::SecretString` to keep it out of logs.

pub mod secrets;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug)]
pub struct Config {
    pub database_url: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub pipeline_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: optional_var("DATABASE_URL").map(SecretString::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            pipeline_path: optional_var("TASKLINE_CONFIG").map(PathBuf::from),
        })
    }

    /// The database URL, for commands that need Postgres.
    pub fn database_url(&self) -> Result<&SecretString> {
        self.database_url.as_ref().ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })
    }

    /// Load the pipeline file named by `TASKLINE_CONFIG`, or defaults.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        match &self.pipeline_path {
            Some(path) => PipelineConfig::load(path),
            None => Ok(PipelineConfig::default()),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Pipeline tuning shared by the generator and the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum tasks admitted but not yet through dispatch.
    pub max_backlog: usize,
    pub generator: GeneratorConfig,
    pub limiter: LimiterConfig,
    pub worker: WorkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_backlog: 100,
            generator: GeneratorConfig::default(),
            limiter: LimiterConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Tick period in microseconds.
    pub interval_us: u64,
    /// Task types are drawn from `0..max_type`.
    pub max_type: i32,
    /// Task values are drawn from `0..max_value`.
    pub max_value: i32,
    /// Per-dispatch timeout.
    pub dispatch_timeout_ms: u64,
    /// Base URL of the worker's HTTP endpoint.
    pub worker_url: String,
    /// Fixed RNG seed for reproducible task streams.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval_us: 500,
            max_type: 10,
            max_value: 100,
            dispatch_timeout_ms: 30_000,
            worker_url: "http://127.0.0.1:50051".to_string(),
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimiterConfig {
    pub tasks_per_second: f64,
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            tasks_per_second: 10.0,
            burst: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub listen_addr: String,
    /// Simulated work: milliseconds per unit of task value.
    pub ms_per_value: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:50051".to_string(),
            ms_per_value: 1,
        }
    }
}

impl WorkerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::Config(format!("worker.listen_addr {:?}: {e}", self.listen_addr)))
    }
}

impl PipelineConfig {
    /// Read and validate a TOML pipeline file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read pipeline config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad pipeline config {}: {e}", path.display())))
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_backlog == 0 {
            return Err(Error::Config("max_backlog must be at least 1".to_string()));
        }
        if self.generator.interval_us == 0 {
            return Err(Error::Config("generator.interval_us must be positive".to_string()));
        }
        if self.generator.max_type <= 0 {
            return Err(Error::Config("generator.max_type must be positive".to_string()));
        }
        if self.generator.max_value <= 0 {
            return Err(Error::Config("generator.max_value must be positive".to_string()));
        }
        if self.generator.dispatch_timeout_ms == 0 {
            return Err(Error::Config(
                "generator.dispatch_timeout_ms must be positive".to_string(),
            ));
        }
        if !self.limiter.tasks_per_second.is_finite() || self.limiter.tasks_per_second <= 0.0 {
            return Err(Error::Config(
                "limiter.tasks_per_second must be a positive number".to_string(),
            ));
        }
        if self.limiter.burst == 0 {
            return Err(Error::Config("limiter.burst must be at least 1".to_string()));
        }
        self.worker.listen_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            max_backlog = 5

            [limiter]
            tasks_per_second = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.max_backlog, 5);
        assert_eq!(config.limiter.tasks_per_second, 2.5);
        assert_eq!(config.limiter.burst, 1);
        assert_eq!(config.generator.interval(), Duration::from_micros(500));
    }

    #[test]
    fn zero_backlog_is_rejected() {
        let err = PipelineConfig::from_toml("max_backlog = 0").unwrap_err();
        assert!(err.to_string().contains("max_backlog"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PipelineConfig::from_toml("max_backlogg = 3").is_err());
    }
}
