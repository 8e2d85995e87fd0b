use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;
use crate::error::ConveyorError;

/// A single input or output resource of a job.
///
/// For inputs, `key` is the download key handed to the transfer service.
/// For outputs, `key` is the remote destination and `upload_key` is the
/// artifact produced by the transform, assigned during the Processing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub key: String,
    /// Whether this input participates in the transform step. Always false
    /// for outputs.
    #[serde(default)]
    pub transform: bool,
    /// Produced artifact key, set once the execute stage has run.
    #[serde(default)]
    pub upload_key: Option<String>,
    /// The activity for this ref finished. Persisted so a recovered job
    /// never repeats a finished transfer.
    #[serde(default)]
    pub completed: bool,
}

impl FileRef {
    pub fn input(key: impl Into<String>, transform: bool) -> Self {
        Self {
            key: key.into(),
            transform,
            upload_key: None,
            completed: false,
        }
    }

    pub fn output(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            transform: false,
            upload_key: None,
            completed: false,
        }
    }
}

/// A file-transformation job tracked by the orchestrator.
///
/// Mutated only by the job's driver task; everything else reads the copy
/// persisted in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub token: String,
    pub inputs: Vec<FileRef>,
    pub outputs: Vec<FileRef>,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    /// Out-of-band cancellation request. Once observed by the driver it is
    /// irrevocable for this job instance.
    #[serde(default)]
    pub cancellation_requested: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job in `Pending` with validated identity and file keys.
    pub fn new(
        id: impl Into<String>,
        token: impl Into<String>,
        inputs: Vec<FileRef>,
        outputs: Vec<FileRef>,
    ) -> Result<Self, ConveyorError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConveyorError::InvalidJob("job id must not be empty".into()));
        }
        if let Some(file) = inputs.iter().chain(outputs.iter()).find(|f| f.key.trim().is_empty()) {
            return Err(ConveyorError::InvalidJob(format!(
                "file key must not be empty (transform={})",
                file.transform
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            token: token.into(),
            inputs,
            outputs,
            state: JobState::Pending,
            state_history: Vec::new(),
            cancellation_requested: false,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Inputs the Downloading stage still has to fetch.
    pub fn pending_downloads(&self) -> impl Iterator<Item = (usize, &FileRef)> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, f)| f.transform && !f.completed)
    }

    /// Outputs the Uploading stage still has to push.
    pub fn pending_uploads(&self) -> impl Iterator<Item = (usize, &FileRef)> {
        self.outputs.iter().enumerate().filter(|(_, f)| !f.completed)
    }
}

/// Submission document accepted by the front door, mirroring the CreateJob
/// payload: `{id?, token, files: [{key, transform}], uploads: [{key}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub token: String,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub uploads: Vec<UploadSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub key: String,
    #[serde(default)]
    pub transform: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSpec {
    pub key: String,
}

impl JobSpec {
    /// Convert into a validated [`Job`], generating an id when none given.
    pub fn into_job(self) -> Result<Job, ConveyorError> {
        let id = self
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let inputs = self
            .files
            .into_iter()
            .map(|f| FileRef::input(f.key, f.transform))
            .collect();
        let outputs = self.uploads.into_iter().map(|u| FileRef::output(u.key)).collect();
        Job::new(id, self.token, inputs, outputs)
    }
}

/// Structured audit record produced when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: String,
    pub state: JobState,
    pub state_transitions: Vec<JobState>,
    pub last_error: Option<String>,
    pub uploaded_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl AuditRecord {
    /// Generate an audit record from a job in any state.
    pub fn from_job(job: &Job) -> Self {
        let now = Utc::now();
        let duration = now - job.created_at;
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        Self {
            job_id: job.id.clone(),
            state: job.state,
            state_transitions: transitions,
            last_error: job.last_error.clone(),
            uploaded_keys: job
                .outputs
                .iter()
                .filter(|f| f.completed)
                .filter_map(|f| f.upload_key.clone())
                .collect(),
            started_at: job.created_at,
            finished_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }
}
