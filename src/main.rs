use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use console::Style;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use conveyor::cli::{Cli, Command};
use conveyor::error::ActivityError;
use conveyor::exec::CommandRunner;
use conveyor::transfer::{ResourceTransfer, TransferError};
use conveyor::ui::JobProgress;
use conveyor::{
    ActivityExecutor, AuditRecord, ConveyorConfig, FileRef, FileStore, HttpTransferClient, Job,
    JobOrchestrator, JobSpec, MemoryStore, ProcessRunner,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ConveyorConfig::load()?;
    if let Some(max_attempts) = cli.max_attempts {
        config.retry.maximum_attempts = max_attempts;
    }

    match cli.command {
        Command::Submit { file } => submit(&config, &file).await,
        Command::Status { job_id } => status(&config, &job_id).await,
        Command::Cancel { job_id } => cancel(&config, &job_id).await,
        Command::Resume => resume(&config).await,
        Command::Demo => demo(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "conveyor=debug" } else { "conveyor=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_orchestrator(config: &ConveyorConfig) -> Result<Arc<JobOrchestrator>> {
    let store = Arc::new(FileStore::new(&config.store_dir));
    let transfer = Arc::new(HttpTransferClient::new(config.transfer_base_url.clone())?);
    let runner = Arc::new(ProcessRunner::new(
        config.transform_command.clone(),
        config.transform_args.clone(),
    ));
    let executor = Arc::new(ActivityExecutor::new(
        transfer,
        runner,
        config.retry.to_policy()?,
        config.attempt_timeout(),
    ));
    Ok(JobOrchestrator::new(store, executor, config.max_fanout))
}

async fn submit(config: &ConveyorConfig, file: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let spec: JobSpec = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    let job = spec.into_job()?;
    let id = orchestrator.start_job(job).await?;
    watch(&orchestrator, &id).await
}

async fn status(config: &ConveyorConfig, job_id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let status = orchestrator.status(job_id).await?;
    match status.error {
        Some(error) => println!("{job_id}: {} ({error})", status.state),
        None => println!("{job_id}: {}", status.state),
    }
    Ok(())
}

async fn cancel(config: &ConveyorConfig, job_id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    orchestrator.cancel_job(job_id).await?;
    println!("Cancellation Initiated");
    Ok(())
}

async fn resume(config: &ConveyorConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let resumed = orchestrator.recover().await?;
    if resumed.is_empty() {
        println!("No in-flight jobs to resume.");
        return Ok(());
    }

    println!("Resuming {} job(s)...", resumed.len());
    for id in &resumed {
        let status = wait_for_terminal(&orchestrator, id).await?;
        match status.error {
            Some(error) => println!("  {id}: {} ({error})", status.state),
            None => println!("  {id}: {}", status.state),
        }
    }
    Ok(())
}

async fn watch(orchestrator: &Arc<JobOrchestrator>, id: &str) -> Result<()> {
    let progress = JobProgress::start(id);
    loop {
        let status = orchestrator.status(id).await?;
        progress.update_state(status.state);
        if status.state.is_terminal() {
            progress.complete(&status);
            let job = orchestrator.get_job(id).await?;
            progress.print_audit(&AuditRecord::from_job(&job));
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn wait_for_terminal(
    orchestrator: &Arc<JobOrchestrator>,
    id: &str,
) -> Result<conveyor::JobStatus> {
    loop {
        let status = orchestrator.status(id).await?;
        if status.state.is_terminal() {
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Collaborator doubles for the built-in demo: transfers and the transform
/// succeed after a short, visible delay.
struct DemoTransfer;

#[async_trait]
impl ResourceTransfer for DemoTransfer {
    async fn download(&self, _token: &str, _key: &str) -> Result<(), TransferError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    async fn upload(
        &self,
        _token: &str,
        _local_key: &str,
        _remote_url: &str,
    ) -> Result<(), TransferError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }
}

struct DemoRunner;

#[async_trait]
impl CommandRunner for DemoRunner {
    async fn execute(&self, job: &Job) -> Result<Vec<String>, ActivityError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(job
            .outputs
            .iter()
            .map(|f| format!("converted-{}", f.key))
            .collect())
    }
}

async fn demo(config: &ConveyorConfig) -> Result<()> {
    let header = Style::new().cyan().bold();
    println!("{}", header.apply_to("Conveyor demo — in-memory pipeline"));

    let executor = Arc::new(ActivityExecutor::new(
        Arc::new(DemoTransfer),
        Arc::new(DemoRunner),
        config.retry.to_policy()?,
        config.attempt_timeout(),
    ));
    let orchestrator = JobOrchestrator::new(Arc::new(MemoryStore::new()), executor, config.max_fanout);

    let id = format!("demo-{}", &Uuid::new_v4().to_string()[..8]);
    let job = Job::new(
        id.clone(),
        "demo-token",
        vec![FileRef::input("scene.dwg", true), FileRef::input("style.cfg", true)],
        vec![FileRef::output("scene.pdf")],
    )?;

    orchestrator.start_job(job).await?;
    watch(&orchestrator, &id).await
}
