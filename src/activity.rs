//! Wraps each external operation (download, execute, upload) as a
//! retryable, cancellable activity.
//!
//! The executor owns the collaborator handles and the classification
//! boundary: raw backend errors are converted into
//! [`ActivityError::Transient`] or [`ActivityError::Permanent`] here, so the
//! orchestrator only ever reasons about the classified kind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ActivityError, RetryError};
use crate::exec::CommandRunner;
use crate::retry::{RetryController, RetryPolicy};
use crate::state_machine::Job;
use crate::transfer::{ResourceTransfer, TransferError};

/// Schedule-to-close deadline for a single activity attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// The kind of external work an activity performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Download,
    Execute,
    Upload,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Download => write!(f, "Download"),
            ActivityKind::Execute => write!(f, "Execute"),
            ActivityKind::Upload => write!(f, "Upload"),
        }
    }
}

/// Bookkeeping for one activity while it runs: which attempt is scheduled,
/// the last error seen, and when the next retry fires. Folded into the job
/// record (log line + `last_error`) once the activity reaches a terminal
/// success or failure.
#[derive(Debug, Clone)]
pub struct ActivityAttempt {
    pub kind: ActivityKind,
    pub target: String,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl ActivityAttempt {
    fn new(kind: ActivityKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            attempt: 1,
            last_error: None,
            next_retry_at: None,
        }
    }

    fn record_retry(&mut self, upcoming: u32, err: &ActivityError, at: DateTime<Utc>) {
        self.attempt = upcoming;
        self.last_error = Some(err.message().to_string());
        self.next_retry_at = Some(at);
    }

    fn finish<T>(&self, result: &Result<T, RetryError>) {
        match result {
            Ok(_) => debug!(
                kind = %self.kind,
                target = %self.target,
                attempts = self.attempt,
                "activity completed"
            ),
            Err(err) => warn!(
                kind = %self.kind,
                target = %self.target,
                attempts = self.attempt,
                error = %err,
                "activity finished without success"
            ),
        }
    }
}

/// Classify a transfer gateway failure for the retry loop.
///
/// Rate limits, server-side errors and transport failures are worth
/// retrying; any other client-side status (malformed key, bad token) can
/// never succeed as issued.
pub(crate) fn classify_transfer(err: TransferError) -> ActivityError {
    match err {
        TransferError::RateLimited { .. } => ActivityError::Transient(err.to_string()),
        TransferError::Api { status, .. } if status >= 500 => {
            ActivityError::Transient(err.to_string())
        }
        TransferError::Api { .. } => ActivityError::Permanent(err.to_string()),
        TransferError::Network(_) => ActivityError::Transient(err.to_string()),
    }
}

/// Runs download/execute/upload activities through [`RetryController`] with
/// injected collaborators.
pub struct ActivityExecutor {
    transfer: Arc<dyn ResourceTransfer>,
    runner: Arc<dyn CommandRunner>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl ActivityExecutor {
    pub fn new(
        transfer: Arc<dyn ResourceTransfer>,
        runner: Arc<dyn CommandRunner>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            transfer,
            runner,
            policy,
            attempt_timeout,
        }
    }

    /// Download one input resource.
    pub async fn run_download(
        &self,
        token: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RetryError> {
        let mut attempt = ActivityAttempt::new(ActivityKind::Download, key);
        let timeout = self.attempt_timeout;
        let result = RetryController::execute(
            &self.policy,
            cancel,
            move || async move {
                match tokio::time::timeout(timeout, self.transfer.download(token, key)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(classify_transfer(e)),
                    Err(_) => Err(deadline_exceeded(timeout)),
                }
            },
            |upcoming, err, at| attempt.record_retry(upcoming, err, at),
        )
        .await;
        attempt.finish(&result);
        result
    }

    /// Run the transform command for the whole job, returning the produced
    /// artifact keys (at least one per declared output).
    pub async fn run_execute(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, RetryError> {
        let mut attempt = ActivityAttempt::new(ActivityKind::Execute, &job.id);
        let timeout = self.attempt_timeout;
        let needed = job.outputs.len();
        let result = RetryController::execute(
            &self.policy,
            cancel,
            move || async move {
                let keys = match tokio::time::timeout(timeout, self.runner.execute(job)).await {
                    Ok(Ok(keys)) => keys,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(deadline_exceeded(timeout)),
                };
                if keys.len() < needed {
                    return Err(ActivityError::Permanent(format!(
                        "transform produced {} artifacts for {needed} declared outputs",
                        keys.len()
                    )));
                }
                if keys.len() > needed {
                    warn!(
                        job = %job.id,
                        produced = keys.len(),
                        declared = needed,
                        "transform produced surplus artifacts, ignoring the extras"
                    );
                }
                Ok(keys)
            },
            |upcoming, err, at| attempt.record_retry(upcoming, err, at),
        )
        .await;
        attempt.finish(&result);
        result
    }

    /// Upload one produced artifact to its remote destination.
    pub async fn run_upload(
        &self,
        token: &str,
        local_key: &str,
        remote_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RetryError> {
        let mut attempt = ActivityAttempt::new(ActivityKind::Upload, remote_url);
        let timeout = self.attempt_timeout;
        let result = RetryController::execute(
            &self.policy,
            cancel,
            move || async move {
                match tokio::time::timeout(timeout, self.transfer.upload(token, local_key, remote_url))
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(classify_transfer(e)),
                    Err(_) => Err(deadline_exceeded(timeout)),
                }
            },
            |upcoming, err, at| attempt.record_retry(upcoming, err, at),
        )
        .await;
        attempt.finish(&result);
        result
    }
}

fn deadline_exceeded(timeout: Duration) -> ActivityError {
    ActivityError::Transient(format!(
        "attempt exceeded the {}ms schedule-to-close deadline",
        timeout.as_millis()
    ))
}
