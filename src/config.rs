use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "judged", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub judge: JudgeConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Deserialize, Debug)]
pub struct JudgeConfig {
    /// Number of concurrent dispatcher workers
    #[serde(default = "default_workers")]
    pub workers: u8,

    /// Idle backoff between polling rounds, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Directory holding one subdirectory per question, each with a `data`
    /// directory of `*.q` / `*.ans` test-case files
    pub question_dir: PathBuf,

    /// Directory under which ephemeral submission workspaces are created
    pub workspace_dir: PathBuf,
}

#[derive(Deserialize, Debug)]
pub struct SandboxConfig {
    /// Sandbox image containing the toolchains and the judge harness
    pub image: String,

    /// Memory ceiling for the run phase, in bytes
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,

    /// Process-count ulimit for the run phase
    #[serde(default = "default_nproc")]
    pub nproc: u64,

    /// CPU-seconds ulimit for the run phase
    #[serde(default = "default_cpu_seconds")]
    pub cpu_seconds: u64,
}

fn default_workers() -> u8 {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_memory_limit_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_nproc() -> u64 {
    3
}

fn default_cpu_seconds() -> u64 {
    5
}
