//! Dispatcher worker: claims one job at a time and drives it through the
//! two-phase sandbox pipeline.
//!
//! Each worker loops independently: claim, judge, persist, score, then back
//! off for the poll interval. One job's steps run in strict sequence within
//! its worker; only the atomic claim in the store couples workers together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::sandbox::{Phases, Sandbox};
use crate::scoring;
use crate::store::{self, Job};
use crate::verdict::Verdict;
use crate::workspace::Workspace;

/// Everything a worker needs, constructed once at startup.
pub struct JudgeContext {
    pub pool: SqlitePool,
    pub sandbox: Sandbox,
    pub workspace_dir: PathBuf,
    pub poll_interval: Duration,
}

pub async fn worker(
    id: u8,
    ctx: Arc<JudgeContext>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        if token.is_cancelled() {
            break;
        }

        // Errors here are logged, never fatal to the loop: a malfunctioning
        // submission or a store hiccup must not take the pool down.
        match store::claim_next(&ctx.pool).await {
            Ok(Some(job)) => process_job(id, &ctx, job).await,
            Ok(None) => {}
            Err(e) => log::error!("Worker {id} failed to claim a job: {e}"),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(ctx.poll_interval) => {}
        }
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

/// Judges one claimed job to completion: any orchestration failure after the
/// claim degrades to an `IE` verdict on that job.
async fn process_job(id: u8, ctx: &JudgeContext, job: Job) {
    let job_id = job.id;
    log::info!(
        "Worker {id} claimed job {job_id}: {} / {} / {}",
        job.username,
        job.question,
        job.lang
    );

    let verdict = match judge(&ctx.sandbox, &ctx.workspace_dir, &job).await {
        Ok(verdict) => verdict,
        Err(e) => {
            log::error!("Job {job_id} failed during orchestration: {e:#}");
            Verdict::InternalError
        }
    };

    match store::finish(&ctx.pool, job_id, verdict).await {
        Ok(true) => log::info!("Job {job_id} finished with {verdict}"),
        Ok(false) => {
            log::warn!("Job {job_id} already carried a terminal status, {verdict} dropped");
            return;
        }
        Err(e) => {
            log::error!("Failed to persist verdict {verdict} for job {job_id}: {e}");
            return;
        }
    }

    // Scoring only after the verdict is durably persisted.
    if verdict == Verdict::Accepted {
        if let Err(e) = scoring::award(&ctx.pool, &job.username, &job.question).await {
            log::error!("Failed to award score for job {job_id}: {e}");
        }
    }
}

/// Build, then run. The workspace lives exactly as long as this call; its
/// directory is removed on every return path when `workspace` drops.
async fn judge(sandbox: &impl Phases, workspace_dir: &Path, job: &Job) -> anyhow::Result<Verdict> {
    let workspace = Workspace::create(workspace_dir)?;
    workspace.write_source(&job.code)?;

    let build = sandbox.build(&job.lang, workspace.path()).await?;
    match build.status.as_str() {
        "OK" => {}
        // Build failure short-circuits: the run phase is never launched.
        "CE" => return Ok(Verdict::CompileError),
        _ => return Ok(Verdict::InternalError),
    }

    let run = sandbox.run(&job.lang, &job.question, workspace.path()).await?;
    Ok(run.verdict())
}
