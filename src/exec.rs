//! The command-execution collaborator: runs the transform command for a job.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ActivityError;
use crate::state_machine::Job;

/// Executes the transform step for a whole job.
///
/// Implementations must be safely re-invokable: a retried execute call for
/// the same job must not corrupt its outputs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the transform and return the produced artifact keys, one per
    /// declared output, in declaration order.
    async fn execute(&self, job: &Job) -> Result<Vec<String>, ActivityError>;
}

/// Runs the configured transform command as a child process.
///
/// The job record is fed to the command as JSON on stdin; the command
/// reports the produced artifact keys as stdout lines. A non-zero exit
/// means the transform rejected its input and is not worth retrying; a
/// spawn or pipe failure is an infrastructure problem and is.
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, job: &Job) -> Result<Vec<String>, ActivityError> {
        let descriptor = serde_json::to_vec(job)
            .map_err(|e| ActivityError::Permanent(format!("unserializable job record: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ActivityError::Transient(format!("failed to spawn {}: {e}", self.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A transform that exits without reading its descriptor closes
            // the pipe early; its exit status is the contract, not the write.
            let _ = stdin.write_all(&descriptor).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ActivityError::Transient(format!("transform command I/O error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActivityError::Permanent(format!(
                "transform command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let keys: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(job = %job.id, produced = keys.len(), "transform command finished");
        Ok(keys)
    }
}
