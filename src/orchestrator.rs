//! Drives jobs through the full state machine lifecycle.
//!
//! One driver task per job: it re-checks cancellation at every stage
//! boundary, fans download and upload activities out with bounded
//! concurrency, runs the transform serially, and persists the job record
//! after every transition so a crashed orchestrator resumes from the last
//! saved stage instead of restarting from `Pending`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activity::ActivityExecutor;
use crate::error::{ConveyorError, RetryError};
use crate::registry::JobStore;
use crate::state_machine::{Job, JobState, StageOutcome, StateMachine};

/// Snapshot of a job's externally visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    executor: Arc<ActivityExecutor>,
    /// Cancellation tokens of the jobs driven by this process.
    running: Mutex<HashMap<String, CancellationToken>>,
    max_fanout: usize,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<ActivityExecutor>,
        max_fanout: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            running: Mutex::new(HashMap::new()),
            max_fanout: max_fanout.max(1),
        })
    }

    /// Register a job and start driving it asynchronously.
    ///
    /// Fails with `DuplicateJob` when the id is already in the registry,
    /// terminal or not — re-submitting never duplicates activity execution.
    pub async fn start_job(self: &Arc<Self>, job: Job) -> Result<String, ConveyorError> {
        if self.store.load(&job.id).await?.is_some() {
            return Err(ConveyorError::DuplicateJob(job.id));
        }
        let id = job.id.clone();
        self.store.save(&job).await?;
        info!(job = %id, inputs = job.inputs.len(), outputs = job.outputs.len(), "job registered");
        self.spawn_driver(id.clone());
        Ok(id)
    }

    /// Request cancellation of a job and return immediately.
    ///
    /// The request is persisted and the in-process driver (if any) is
    /// signalled; the driver applies it at its next safe boundary.
    pub async fn cancel_job(&self, id: &str) -> Result<(), ConveyorError> {
        let Some(mut job) = self.store.load(id).await? else {
            return Err(ConveyorError::JobNotFound(id.to_string()));
        };
        if !job.state.is_terminal() && !job.cancellation_requested {
            job.cancellation_requested = true;
            job.touch();
            self.store.save(&job).await?;
        }
        if let Some(token) = self
            .running
            .lock()
            .expect("running-jobs mutex poisoned")
            .get(id)
        {
            token.cancel();
        }
        info!(job = %id, "cancellation requested");
        Ok(())
    }

    /// Current state and last recorded error of a job.
    pub async fn status(&self, id: &str) -> Result<JobStatus, ConveyorError> {
        let job = self.get_job(id).await?;
        Ok(JobStatus {
            state: job.state,
            error: job.last_error,
        })
    }

    /// Load the full persisted job record.
    pub async fn get_job(&self, id: &str) -> Result<Job, ConveyorError> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| ConveyorError::JobNotFound(id.to_string()))
    }

    /// Crash-recovery sweep: resume every in-flight job in the registry
    /// from its last persisted state. Returns the resumed job ids.
    pub async fn recover(self: &Arc<Self>) -> Result<Vec<String>, ConveyorError> {
        let mut resumed = Vec::new();
        for job in self.store.list_in_flight().await? {
            let already_running = self
                .running
                .lock()
                .expect("running-jobs mutex poisoned")
                .contains_key(&job.id);
            if already_running {
                continue;
            }
            info!(job = %job.id, state = %job.state, "resuming job from persisted state");
            resumed.push(job.id.clone());
            self.spawn_driver(job.id);
        }
        Ok(resumed)
    }

    fn spawn_driver(self: &Arc<Self>, id: String) {
        let cancel = CancellationToken::new();
        self.running
            .lock()
            .expect("running-jobs mutex poisoned")
            .insert(id.clone(), cancel.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.drive(&id, &cancel).await {
                error!(job = %id, error = %e, "job driver aborted");
            }
            this.running
                .lock()
                .expect("running-jobs mutex poisoned")
                .remove(&id);
        });
    }

    /// Run a job from its current persisted state to a terminal state.
    /// Driving an already-terminal job is a no-op reporting that state.
    async fn drive(&self, id: &str, cancel: &CancellationToken) -> Result<JobState, ConveyorError> {
        let mut job = self.get_job(id).await?;

        while !job.state.is_terminal() {
            self.refresh_cancellation(&mut job, cancel).await?;
            if job.cancellation_requested {
                StateMachine::apply(&mut job, StageOutcome::Cancelled);
                self.store.save(&job).await?;
                info!(job = %job.id, "job cancelled");
                break;
            }

            let outcome = match job.state {
                JobState::Pending => StageOutcome::Success,
                JobState::Downloading => self.download_stage(&mut job, cancel).await?,
                JobState::Processing => self.execute_stage(&mut job, cancel).await?,
                JobState::Uploading => self.upload_stage(&mut job, cancel).await?,
                JobState::Completed | JobState::Cancelled | JobState::Failed => break,
            };

            StateMachine::apply(&mut job, outcome);
            self.persist(&mut job).await?;
            debug!(job = %job.id, state = %job.state, "persisted transition");
        }

        match job.state {
            JobState::Completed => info!(job = %job.id, "job completed"),
            JobState::Failed => {
                info!(job = %job.id, error = job.last_error.as_deref(), "job failed")
            }
            _ => {}
        }
        Ok(job.state)
    }

    /// Merge an out-of-band cancellation (persisted by another process)
    /// into the in-memory record and the driver token.
    async fn refresh_cancellation(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<(), ConveyorError> {
        if let Some(stored) = self.store.load(&job.id).await?
            && stored.cancellation_requested
        {
            job.cancellation_requested = true;
        }
        if cancel.is_cancelled() {
            job.cancellation_requested = true;
        }
        if job.cancellation_requested && !cancel.is_cancelled() {
            cancel.cancel();
        }
        Ok(())
    }

    /// Save without clobbering a cancellation flag persisted concurrently.
    async fn persist(&self, job: &mut Job) -> Result<(), ConveyorError> {
        if let Some(stored) = self.store.load(&job.id).await?
            && stored.cancellation_requested
        {
            job.cancellation_requested = true;
        }
        self.store.save(job).await?;
        Ok(())
    }

    /// Fetch every transform input that is not already downloaded, with
    /// bounded fan-out and all-or-nothing semantics: the first member whose
    /// retries are exhausted abandons the stage, queued members never
    /// start, in-flight members finish their current attempt and are
    /// drained, never aborted.
    async fn download_stage(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, ConveyorError> {
        let pending: Vec<(usize, String)> = job
            .pending_downloads()
            .map(|(i, f)| (i, f.key.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(StageOutcome::Success);
        }

        let stage = cancel.child_token();
        let limiter = Arc::new(Semaphore::new(self.max_fanout));
        let mut tasks: JoinSet<(usize, Result<(), RetryError>)> = JoinSet::new();

        for (index, key) in pending {
            let executor = Arc::clone(&self.executor);
            let token = job.token.clone();
            let stage = stage.clone();
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(RetryError::Cancelled)),
                };
                if stage.is_cancelled() {
                    return (index, Err(RetryError::Cancelled));
                }
                let result = executor.run_download(&token, &key, &stage).await;
                (index, result)
            });
        }

        let mut first_failure: Option<RetryError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(()))) => {
                    if let Some(file) = job.inputs.get_mut(index) {
                        file.completed = true;
                    }
                    job.touch();
                    // Each finished transfer is durable immediately, so a
                    // crash never repeats it.
                    self.persist(job).await?;
                }
                Ok((_, Err(RetryError::Cancelled))) => {}
                Ok((_, Err(err))) => {
                    stage.cancel();
                    first_failure.get_or_insert(err);
                }
                Err(join_err) => {
                    stage.cancel();
                    first_failure
                        .get_or_insert(RetryError::Permanent(format!("download task failed: {join_err}")));
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(StageOutcome::Cancelled);
        }
        Ok(match first_failure {
            Some(err) => StageOutcome::Failure(err.to_string()),
            None => StageOutcome::Success,
        })
    }

    /// Run the transform command once, serialized, and assign the produced
    /// artifact keys to the declared outputs in order.
    async fn execute_stage(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, ConveyorError> {
        match self.executor.run_execute(job, cancel).await {
            Ok(keys) => {
                for (file, key) in job.outputs.iter_mut().zip(keys) {
                    file.upload_key = Some(key);
                }
                job.touch();
                Ok(StageOutcome::Success)
            }
            Err(RetryError::Cancelled) => Ok(StageOutcome::Cancelled),
            Err(err) => Ok(StageOutcome::Failure(err.to_string())),
        }
    }

    /// Push every produced artifact not yet uploaded, same fan-out and
    /// all-or-nothing policy as the download stage.
    async fn upload_stage(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, ConveyorError> {
        let mut pending: Vec<(usize, String, String)> = Vec::new();
        for (index, file) in job.pending_uploads() {
            match &file.upload_key {
                Some(local) => pending.push((index, local.clone(), file.key.clone())),
                None => {
                    return Ok(StageOutcome::Failure(format!(
                        "output {} has no produced artifact key",
                        file.key
                    )));
                }
            }
        }
        if pending.is_empty() {
            return Ok(StageOutcome::Success);
        }

        let stage = cancel.child_token();
        let limiter = Arc::new(Semaphore::new(self.max_fanout));
        let mut tasks: JoinSet<(usize, Result<(), RetryError>)> = JoinSet::new();

        for (index, local_key, remote_url) in pending {
            let executor = Arc::clone(&self.executor);
            let token = job.token.clone();
            let stage = stage.clone();
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(RetryError::Cancelled)),
                };
                if stage.is_cancelled() {
                    return (index, Err(RetryError::Cancelled));
                }
                let result = executor
                    .run_upload(&token, &local_key, &remote_url, &stage)
                    .await;
                (index, result)
            });
        }

        let mut first_failure: Option<RetryError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(()))) => {
                    if let Some(file) = job.outputs.get_mut(index) {
                        file.completed = true;
                    }
                    job.touch();
                    self.persist(job).await?;
                }
                Ok((_, Err(RetryError::Cancelled))) => {}
                Ok((_, Err(err))) => {
                    stage.cancel();
                    first_failure.get_or_insert(err);
                }
                Err(join_err) => {
                    stage.cancel();
                    first_failure
                        .get_or_insert(RetryError::Permanent(format!("upload task failed: {join_err}")));
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(StageOutcome::Cancelled);
        }
        Ok(match first_failure {
            Some(err) => StageOutcome::Failure(err.to_string()),
            None => StageOutcome::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityExecutor, DEFAULT_ATTEMPT_TIMEOUT};
    use crate::error::ActivityError;
    use crate::exec::CommandRunner;
    use crate::registry::MemoryStore;
    use crate::retry::RetryPolicy;
    use crate::state_machine::FileRef;
    use crate::transfer::{ResourceTransfer, TransferError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Transfer double that records every call and can be told to fail
    /// downloads with a given error.
    #[derive(Default)]
    struct RecordingTransfer {
        downloads: Mutex<Vec<String>>,
        uploads: Mutex<Vec<(String, String)>>,
        download_error: Option<fn() -> TransferError>,
    }

    impl RecordingTransfer {
        fn failing(error: fn() -> TransferError) -> Self {
            Self {
                download_error: Some(error),
                ..Self::default()
            }
        }

        fn downloads(&self) -> Vec<String> {
            self.downloads.lock().unwrap().clone()
        }

        fn uploads(&self) -> Vec<(String, String)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceTransfer for RecordingTransfer {
        async fn download(&self, _token: &str, key: &str) -> Result<(), TransferError> {
            self.downloads.lock().unwrap().push(key.to_string());
            match self.download_error {
                Some(error) => Err(error()),
                None => Ok(()),
            }
        }

        async fn upload(
            &self,
            _token: &str,
            local_key: &str,
            remote_url: &str,
        ) -> Result<(), TransferError> {
            self.uploads
                .lock()
                .unwrap()
                .push((local_key.to_string(), remote_url.to_string()));
            Ok(())
        }
    }

    /// Runner double producing fixed keys, optionally gated so a test can
    /// hold the execute stage open.
    struct StubRunner {
        keys: Vec<String>,
        calls: AtomicU32,
        started: Option<Arc<Notify>>,
        release: Option<Arc<Notify>>,
    }

    impl StubRunner {
        fn new(keys: Vec<&str>) -> Self {
            Self {
                keys: keys.into_iter().map(String::from).collect(),
                calls: AtomicU32::new(0),
                started: None,
                release: None,
            }
        }

        fn gated(keys: Vec<&str>, started: Arc<Notify>, release: Arc<Notify>) -> Self {
            Self {
                started: Some(started),
                release: Some(release),
                ..Self::new(keys)
            }
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn execute(&self, _job: &Job) -> Result<Vec<String>, ActivityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(started) = &self.started {
                started.notify_one();
            }
            if let Some(release) = &self.release {
                release.notified().await;
            }
            Ok(self.keys.clone())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_millis(2),
            maximum_attempts: max_attempts,
        }
    }

    fn build(
        transfer: Arc<RecordingTransfer>,
        runner: Arc<StubRunner>,
        max_attempts: u32,
    ) -> (Arc<JobOrchestrator>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(ActivityExecutor::new(
            transfer,
            runner,
            fast_policy(max_attempts),
            DEFAULT_ATTEMPT_TIMEOUT,
        ));
        let orchestrator = JobOrchestrator::new(store.clone(), executor, 4);
        (orchestrator, store)
    }

    fn make_job(id: &str) -> Job {
        Job::new(
            id,
            "tok",
            vec![FileRef::input("a", true)],
            vec![FileRef::output("out1")],
        )
        .unwrap()
    }

    async fn wait_terminal(orchestrator: &Arc<JobOrchestrator>, id: &str) -> JobStatus {
        for _ in 0..1000 {
            let status = orchestrator.status(id).await.unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("job {id} did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn happy_path_reaches_completed_with_result_keys() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 5);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Completed);
        assert!(status.error.is_none());

        let job = orchestrator.get_job("J1").await.unwrap();
        assert!(job.inputs[0].completed);
        assert!(job.outputs[0].completed);
        assert_eq!(job.outputs[0].upload_key.as_deref(), Some("artifact-1"));
        assert_eq!(
            job.state_history,
            vec![
                JobState::Pending,
                JobState::Downloading,
                JobState::Processing,
                JobState::Uploading,
            ]
        );

        assert_eq!(transfer.downloads(), vec!["a".to_string()]);
        assert_eq!(
            transfer.uploads(),
            vec![("artifact-1".to_string(), "out1".to_string())]
        );
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected_without_duplicating_work() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 5);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        let err = orchestrator.start_job(make_job("J1")).await.unwrap_err();
        assert!(matches!(err, ConveyorError::DuplicateJob(_)));

        wait_terminal(&orchestrator, "J1").await;
        assert_eq!(transfer.downloads().len(), 1);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        // Still a duplicate once terminal.
        let err = orchestrator.start_job(make_job("J1")).await.unwrap_err();
        assert!(matches!(err, ConveyorError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn cancellation_before_any_stage_yields_cancelled() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, store) = build(transfer.clone(), runner.clone(), 5);

        // A cancel request persisted before any driver exists, as if it
        // arrived while the orchestrator was down.
        let mut job = make_job("J1");
        job.cancellation_requested = true;
        store.save(&job).await.unwrap();

        let resumed = orchestrator.recover().await.unwrap();
        assert_eq!(resumed, vec!["J1".to_string()]);

        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Cancelled);
        assert!(transfer.downloads().is_empty());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_downloads_fail_the_job() {
        let transfer = Arc::new(RecordingTransfer::failing(|| TransferError::Api {
            status: 500,
            message: "backend down".into(),
        }));
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 3);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Failed);
        assert!(status.error.unwrap().contains("exhausted after 3 attempts"));

        assert_eq!(transfer.downloads().len(), 3);
        // The failed stage never reaches the transform or uploads.
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(transfer.uploads().is_empty());
    }

    #[tokio::test]
    async fn permanent_download_failure_skips_retries() {
        let transfer = Arc::new(RecordingTransfer::failing(|| TransferError::Api {
            status: 404,
            message: "no such key".into(),
        }));
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, _store) = build(transfer.clone(), runner, 5);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(transfer.downloads().len(), 1);
    }

    #[tokio::test]
    async fn job_without_files_runs_straight_through() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec![]));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 5);

        let job = Job::new("empty", "tok", vec![], vec![]).unwrap();
        orchestrator.start_job(job).await.unwrap();
        let status = wait_terminal(&orchestrator, "empty").await;
        assert_eq!(status.state, JobState::Completed);
        assert!(transfer.downloads().is_empty());
        assert!(transfer.uploads().is_empty());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_during_processing_finishes_execute_but_never_uploads() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::gated(
            vec!["artifact-1"],
            started.clone(),
            release.clone(),
        ));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 5);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        started.notified().await;

        orchestrator.cancel_job("J1").await.unwrap();
        release.notify_one();

        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Cancelled);
        // The in-flight execute attempt ran to completion.
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        // No upload was ever dispatched.
        assert!(transfer.uploads().is_empty());
    }

    #[tokio::test]
    async fn recovery_resumes_download_stage_without_repeating_finished_files() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec!["artifact-1"]));
        let (orchestrator, store) = build(transfer.clone(), runner.clone(), 5);

        // As persisted by an orchestrator that crashed mid-Downloading:
        // file `a` already fetched, file `b` not yet.
        let mut job = Job::new(
            "J1",
            "tok",
            vec![FileRef::input("a", true), FileRef::input("b", true)],
            vec![FileRef::output("out1")],
        )
        .unwrap();
        StateMachine::apply(&mut job, StageOutcome::Success);
        assert_eq!(job.state, JobState::Downloading);
        job.inputs[0].completed = true;
        store.save(&job).await.unwrap();

        orchestrator.recover().await.unwrap();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(transfer.downloads(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn recovery_from_uploading_never_reruns_earlier_stages() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec!["unused"]));
        let (orchestrator, store) = build(transfer.clone(), runner.clone(), 5);

        let mut job = make_job("J1");
        job.inputs[0].completed = true;
        job.outputs[0].upload_key = Some("artifact-1".into());
        for _ in 0..3 {
            StateMachine::apply(&mut job, StageOutcome::Success);
        }
        assert_eq!(job.state, JobState::Uploading);
        store.save(&job).await.unwrap();

        orchestrator.recover().await.unwrap();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Completed);

        assert!(transfer.downloads().is_empty());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transfer.uploads(),
            vec![("artifact-1".to_string(), "out1".to_string())]
        );
    }

    #[tokio::test]
    async fn recovery_skips_jobs_already_driven_by_this_process() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::gated(
            vec!["artifact-1"],
            started.clone(),
            release.clone(),
        ));
        let (orchestrator, _store) = build(transfer.clone(), runner.clone(), 5);

        orchestrator.start_job(make_job("J1")).await.unwrap();
        started.notified().await;

        // The job is mid-Processing and in flight; the sweep must not
        // attach a second driver.
        let resumed = orchestrator.recover().await.unwrap();
        assert!(resumed.is_empty());

        release.notify_one();
        let status = wait_terminal(&orchestrator, "J1").await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_job_is_reported_as_not_found() {
        let transfer = Arc::new(RecordingTransfer::default());
        let runner = Arc::new(StubRunner::new(vec![]));
        let (orchestrator, _store) = build(transfer, runner, 5);

        assert!(matches!(
            orchestrator.status("missing").await.unwrap_err(),
            ConveyorError::JobNotFound(_)
        ));
        assert!(matches!(
            orchestrator.cancel_job("missing").await.unwrap_err(),
            ConveyorError::JobNotFound(_)
        ));
    }
}
