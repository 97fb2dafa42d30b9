use thiserror::Error;

use crate::domain::ColumnRole;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unreadable file: every parse strategy failed ({})", format_attempts(.attempts))]
    UnreadableFile { attempts: Vec<StrategyFailure> },

    #[error("Missing required column for {role}; available columns: {}", .available.join(", "))]
    MissingRequiredColumn {
        role: ColumnRole,
        available: Vec<String>,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a single parse strategy could not produce a grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("not a readable workbook: {0}")]
    Workbook(String),

    #[error("bytes are not valid {0}")]
    Encoding(&'static str),

    #[error("delimited text could not be read: {0}")]
    Delimited(String),

    #[error("no non-empty rows")]
    Empty,
}

/// One failed attempt, kept so an unreadable file can be diagnosed.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: StrategyError,
}

fn format_attempts(attempts: &[StrategyFailure]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.strategy, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure reported by an outbound notifier for one message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Worth retrying: timeouts, connection failures, 5xx, rate limiting.
    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("transport rejected message: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}
