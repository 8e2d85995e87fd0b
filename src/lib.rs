//! Conveyor — durable orchestration of multi-step file-transformation jobs.
//!
//! A submitted job downloads its input resources, runs a transform command,
//! and uploads the produced artifacts. Every external operation runs as a
//! retryable activity under an exponential-backoff policy, cancellation is
//! cooperative and observed at safe boundaries, and every state transition
//! is persisted to a durable registry so a restarted orchestrator resumes
//! in-flight jobs from their last saved stage.

pub mod activity;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod state_machine;
pub mod transfer;
pub mod ui;

pub use activity::{ActivityExecutor, ActivityKind, DEFAULT_ATTEMPT_TIMEOUT};
pub use config::ConveyorConfig;
pub use error::{ActivityError, ConveyorError, RetryError};
pub use exec::{CommandRunner, ProcessRunner};
pub use orchestrator::{JobOrchestrator, JobStatus};
pub use registry::{FileStore, JobStore, MemoryStore};
pub use retry::{RetryController, RetryPolicy};
pub use state_machine::{AuditRecord, FileRef, Job, JobSpec, JobState};
pub use transfer::{HttpTransferClient, ResourceTransfer};
