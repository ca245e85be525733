use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use judged::config::{CliArgs, Config};
use judged::sandbox::Sandbox;
use judged::store;
use judged::worker::{JudgeContext, worker};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let Config { judge, sandbox } = cli.to_config().expect("Failed to load configuration");

    if judge.workers == 0 {
        panic!("The number of workers must not be 0");
    }

    let db_path = store::get_db_path();
    if cli.flush_data {
        store::remove_db(&db_path);
    }

    let pool = store::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let ctx = Arc::new(JudgeContext {
        pool,
        sandbox: Sandbox::new(sandbox, judge.question_dir.clone()),
        workspace_dir: judge.workspace_dir.clone(),
        poll_interval: Duration::from_millis(judge.poll_interval_ms),
    });
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=judge.workers {
        workers.spawn(worker(i, ctx.clone(), shutdown_token.clone()));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {res_worker:?}");
        }
    }

    // 1. Broadcast shutdown signal to workers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for in-flight jobs to drain...");

    // 2. Wait until every worker terminates
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                log::error!("Worker handle panicked: {e:?}");
            } else {
                log::error!("Worker handle finished with error: {e:?}");
            }
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
