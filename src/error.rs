//! Error types shared by the ticket adapters, configuration, prompts and agents.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChooError>;

#[derive(Error, Debug)]
pub enum ChooError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown adapter type: {0}")]
    UnknownAdapter(String),

    #[error("Unsupported agent CLI: {0}. Currently supported: claude, copilot")]
    UnsupportedAgent(String),

    /// Non-zero exit from an external binary. `stderr` is kept verbatim.
    #[error("{program} command failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("{program} command timed out after {timeout_secs}s: {command}")]
    Timeout {
        program: String,
        timeout_secs: u64,
        command: String,
    },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Issue {0} not found")]
    IssueNotFound(String),

    #[error("Invalid station '{station}'. Available: {}", available.join(", "))]
    InvalidStation {
        station: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Prompt(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChooError {
    #[cfg(test)]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChooError::Timeout { .. })
    }
}
