//! Sandbox orchestrator.
//!
//! Launches the sandbox image through the `docker` CLI, once per phase:
//! `build` with the workspace mounted read-write and no resource ceiling,
//! then `run` in a fresh instance with everything read-only and the memory
//! ceiling and nproc/cpu ulimits applied. Networking is disabled in both
//! phases. The instance is removed after it exits, before its output buffer
//! is interpreted; a failed removal propagates as an orchestration error.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::process::Command;

use crate::config::SandboxConfig;
use crate::verdict::Verdict;

/// In-sandbox mount point handed to the harness via `WORKDIR`.
const SANDBOX_ROOT: &str = "/data";

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Structured result scraped from a harness phase.
///
/// `passed` is absent from build reports and defaults to zero.
#[derive(Debug, Deserialize)]
pub struct HarnessReport {
    pub status: String,
    #[serde(default)]
    pub passed: u64,
}

impl HarnessReport {
    pub fn internal_error() -> Self {
        Self {
            status: Verdict::InternalError.as_str().to_string(),
            passed: 0,
        }
    }

    /// Terminal verdict carried by this report; anything that is not one of
    /// the seven codes (including a stray build `OK`) maps to IE.
    pub fn verdict(&self) -> Verdict {
        self.status.parse().unwrap_or(Verdict::InternalError)
    }
}

/// Finds the first brace-delimited substring of `buffer` that parses as a
/// harness report.
///
/// Build/run tool output may interleave compiler noise with the report line,
/// so the whole combined buffer is scanned rather than trusting any single
/// line. Candidates are tried in order of their opening brace, shortest
/// first, which picks up the report even when noise contains loose braces.
pub fn extract_report(buffer: &str) -> Option<HarnessReport> {
    for (start, _) in buffer.match_indices('{') {
        let tail = &buffer[start..];
        for (offset, _) in tail.match_indices('}') {
            if let Ok(report) = serde_json::from_str::<HarnessReport>(&tail[..=offset]) {
                return Some(report);
            }
        }
    }
    None
}

/// The two sandbox phases a dispatcher worker drives, one fresh instance
/// each. [`Sandbox`] is the real implementation; the seam exists so the
/// worker pipeline can be exercised without a container engine.
pub trait Phases {
    fn build(
        &self,
        lang: &str,
        workspace: &Path,
    ) -> impl Future<Output = Result<HarnessReport>> + Send;

    fn run(
        &self,
        lang: &str,
        question: &str,
        workspace: &Path,
    ) -> impl Future<Output = Result<HarnessReport>> + Send;
}

pub struct Sandbox {
    image: String,
    question_dir: PathBuf,
    memory_limit_bytes: u64,
    nproc: u64,
    cpu_seconds: u64,
}

impl Sandbox {
    pub fn new(config: SandboxConfig, question_dir: PathBuf) -> Self {
        Self {
            image: config.image,
            question_dir,
            memory_limit_bytes: config.memory_limit_bytes,
            nproc: config.nproc,
            cpu_seconds: config.cpu_seconds,
        }
    }

    /// Runs one sandbox instance to completion, removes it, and returns the
    /// combined output buffer.
    async fn launch(&self, args: Vec<String>) -> Result<String> {
        let name = format!(
            "judged-{}-{}",
            std::process::id(),
            INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let output = Command::new("docker")
            .args(["run", "--name", &name, "--network", "none"])
            .args(["-e", &format!("WORKDIR={SANDBOX_ROOT}")])
            .args(&args)
            .output()
            .await
            .context("failed to launch sandbox instance")?;

        // Dispose before interpreting the buffer; a leaked instance is an
        // orchestration failure, not a submission outcome.
        let removed = Command::new("docker")
            .args(["rm", "--force", &name])
            .output()
            .await
            .context("failed to spawn sandbox removal")?;
        if !removed.status.success() {
            bail!(
                "failed to remove sandbox instance {name}: {}",
                String::from_utf8_lossy(&removed.stderr).trim()
            );
        }

        let mut buffer = String::from_utf8_lossy(&output.stdout).into_owned();
        buffer.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(buffer)
    }
}

impl Phases for Sandbox {
    /// Build phase: workspace mounted read-write, no resource ceiling.
    async fn build(&self, lang: &str, workspace: &Path) -> Result<HarnessReport> {
        let args = vec![
            "-v".to_string(),
            format!("{}:{SANDBOX_ROOT}/script:rw,z", workspace.display()),
            self.image.clone(),
            "build".to_string(),
            lang.to_string(),
        ];

        let buffer = self.launch(args).await?;
        Ok(extract_report(&buffer).unwrap_or_else(HarnessReport::internal_error))
    }

    /// Run phase: fresh instance, workspace and question data mounted
    /// read-only, memory ceiling and nproc/cpu ulimits applied.
    async fn run(&self, lang: &str, question: &str, workspace: &Path) -> Result<HarnessReport> {
        let question_data = self.question_dir.join(question).join("data");
        let args = vec![
            "-v".to_string(),
            format!("{}:{SANDBOX_ROOT}/script:ro,z", workspace.display()),
            "-v".to_string(),
            format!("{}:{SANDBOX_ROOT}/question:ro,z", question_data.display()),
            "--memory".to_string(),
            self.memory_limit_bytes.to_string(),
            "--memory-swap".to_string(),
            "-1".to_string(),
            "--ulimit".to_string(),
            format!("nproc={0}:{0}", self.nproc),
            "--ulimit".to_string(),
            format!("cpu={0}:{0}", self.cpu_seconds),
            self.image.clone(),
            "run".to_string(),
            lang.to_string(),
        ];

        let buffer = self.launch(args).await?;
        Ok(extract_report(&buffer).unwrap_or_else(HarnessReport::internal_error))
    }
}
