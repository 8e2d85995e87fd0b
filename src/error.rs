use thiserror::Error;

use crate::registry::StoreError;
use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classification of an activity failure, produced at the ActivityExecutor
/// boundary. The orchestrator and retry loop never see raw backend errors,
/// only this classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Infrastructure failed (network blip, timeout, rate limit). Retried
    /// under the job's retry policy.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The operation can never succeed as issued (bad input, authorization,
    /// validation). Fails the stage immediately, no retry.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ActivityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Transient(_))
    }

    /// The failure message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            ActivityError::Transient(msg) | ActivityError::Permanent(msg) => msg,
        }
    }
}

/// Terminal outcome of a retry run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("cancelled before completion")]
    Cancelled,
}
