mod job;
mod state;

pub use job::{AuditRecord, FileRef, FileSpec, Job, JobSpec, UploadSpec};
pub use state::{JobState, StageOutcome, StateMachine, Transition};
