//! Durable job registry: the mapping from job id to the persisted job
//! record.
//!
//! The orchestrator treats the registry as the source of truth after a
//! restart — every state transition is saved here, and the recovery sweep
//! reloads whatever was in flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

use crate::state_machine::Job;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value store over job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Idempotent upsert of the whole job record.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Load a job by id; `None` when unknown.
    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// All jobs not in a terminal state, for the recovery sweep.
    async fn list_in_flight(&self) -> Result<Vec<Job>, StoreError>;
}

/// One JSON document per job under a directory, written atomically via a
/// temp file and rename. Survives orchestrator restarts; the document
/// layout is the on-disk contract.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(id)))
    }
}

/// Job ids are opaque caller-assigned strings; encode anything that is not
/// filename-safe so distinct ids never collide on disk.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            other => out.push_str(&format!("%{other:02x}")),
        }
    }
    out
}

#[async_trait]
impl JobStore for FileStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(job)?;
        let path = self.path_for(&job.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        match fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_in_flight(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) if !job.state.is_terminal() => jobs.push(job),
                Ok(_) => {}
                Err(e) => {
                    // A corrupt record must not block recovery of the rest.
                    warn!(path = %path.display(), error = %e, "skipping unreadable job record");
                }
            }
        }
        Ok(jobs)
    }
}

/// In-memory registry for tests and the built-in demo.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs
            .lock()
            .expect("job registry mutex poisoned")
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .expect("job registry mutex poisoned")
            .get(id)
            .cloned())
    }

    async fn list_in_flight(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .expect("job registry mutex poisoned")
            .values()
            .filter(|j| !j.state.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{FileRef, JobState, StageOutcome, StateMachine};
    use tempfile::TempDir;

    fn make_job(id: &str) -> Job {
        Job::new(
            id,
            "tok",
            vec![FileRef::input("a", true)],
            vec![FileRef::output("out1")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.save(&make_job("J1")).await.unwrap();

        let loaded = store.load("J1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "J1");
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_lists_only_in_flight_jobs() {
        let store = MemoryStore::new();
        store.save(&make_job("running")).await.unwrap();

        let mut done = make_job("done");
        for _ in 0..4 {
            StateMachine::apply(&mut done, StageOutcome::Success);
        }
        assert_eq!(done.state, JobState::Completed);
        store.save(&done).await.unwrap();

        let in_flight = store.list_in_flight().await.unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].id, "running");
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        store.save(&make_job("J1")).await.unwrap();
        let loaded = store.load("J1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "J1");
        assert_eq!(loaded.state, JobState::Pending);

        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_save_is_an_upsert() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        let mut job = make_job("J1");
        store.save(&job).await.unwrap();

        StateMachine::apply(&mut job, StageOutcome::Success);
        store.save(&job).await.unwrap();

        let loaded = store.load("J1").await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Downloading);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FileStore::new(tmp.path());
            store.save(&make_job("J1")).await.unwrap();
        }
        let reopened = FileStore::new(tmp.path());
        assert!(reopened.load("J1").await.unwrap().is_some());
        assert_eq!(reopened.list_in_flight().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_handles_unsafe_id_characters() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());

        store.save(&make_job("tenant/job:42")).await.unwrap();
        let loaded = store.load("tenant/job:42").await.unwrap().unwrap();
        assert_eq!(loaded.id, "tenant/job:42");
        // Distinct ids must not collide on disk.
        store.save(&make_job("tenant_job:42")).await.unwrap();
        assert_eq!(store.list_in_flight().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_in_flight_on_missing_dir_is_empty() {
        let store = FileStore::new("/tmp/conveyor-definitely-missing-dir-xyz");
        assert!(store.list_in_flight().await.unwrap().is_empty());
    }

    #[test]
    fn encode_id_is_injective_for_distinct_ids() {
        assert_ne!(encode_id("a/b"), encode_id("a_b"));
        assert_eq!(encode_id("plain-id_1.2"), "plain-id_1.2");
        assert_eq!(encode_id("a/b"), "a%2fb");
    }
}
