use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants::{DEFAULT_SCAN_ROWS, DEFAULT_TOP_N};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows searched for the header before falling back to the first row.
    pub scan_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scan_rows: DEFAULT_SCAN_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub endpoint: String,
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// Minimum spacing between send starts across the whole batch; 0 disables.
    pub min_interval_ms: u64,
    /// Stop the batch after this many contacts fail.
    pub max_failures: usize,
    pub top_n: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.solapi.com/messages/v4/send".to_string(),
            concurrency: 4,
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_ms: 500,
            min_interval_ms: 0,
            max_failures: 10,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Credentials for the SMS gateway, read from the environment.
#[derive(Debug, Clone)]
pub struct SmsCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub sender: String,
}

impl SmsCredentials {
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .map_err(|e| PipelineError::Config(format!("{} is not set: {}", name, e)))
        };
        Ok(Self {
            api_key: read("SMS_API_KEY")?,
            api_secret: read("SMS_API_SECRET")?,
            sender: read("SMS_SENDER")?,
        })
    }
}

impl Config {
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.scan_rows == 0 {
            return Err(PipelineError::Config("ingest.scan_rows must be at least 1".into()));
        }
        if self.dispatch.concurrency == 0 {
            return Err(PipelineError::Config("dispatch.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
