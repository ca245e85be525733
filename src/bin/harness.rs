//! `judge-harness` — the CLI that runs inside the sandbox image.
//!
//! Invoked by the orchestrator as `judge-harness build <lang>` or
//! `judge-harness run <lang>`. The one JSON object printed on stdout is the
//! whole contract with the outside world; diagnostics go to stderr and the
//! orchestrator's extraction skips over them.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use judged::harness::{self, Limits};

#[derive(Parser)]
#[command(name = "judge-harness", version = "1.0", about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Compile or validate the submitted source
    Build { lang: String },
    /// Execute the submission against every test case
    Run { lang: String },
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let cli = Cli::parse();
    let root = harness::workdir();

    let line = match cli.mode {
        Mode::Build { lang } => serde_json::to_string(&harness::build(&root, &lang)),
        Mode::Run { lang } => {
            serde_json::to_string(&harness::run(&root, &lang, Limits::from_env()))
        }
    };

    match line {
        Ok(line) => println!("{line}"),
        Err(e) => {
            log::error!("failed to serialize report: {e}");
            println!("{{\"status\":\"IE\"}}");
        }
    }

    ExitCode::SUCCESS
}
