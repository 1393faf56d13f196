//! lessonpipe-worker - pipeline background services
//!
//! Runs the class monitor and the transcript worker as independent polling
//! tasks in one process. Either loop can be disabled for single-role
//! deployments; any number of instances may run concurrently, coordinated
//! only through the stores' conditional updates.
//!
//! Exit codes: 0 graceful shutdown, 1 configuration or store-connection
//! failure at startup, 2 unrecoverable invariant violation at runtime.

use clap::Parser;
use lessonpipe_common::config::Config;
use lessonpipe_common::dispatch::HttpDispatcher;
use lessonpipe_common::stores::{operational, AnalyticalStore, RestAnalyticalStore};
use lessonpipe_worker::engine::ExerciseEngine;
use lessonpipe_worker::monitor::ClassMonitor;
use lessonpipe_worker::worker::TranscriptWorker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lessonpipe background services - class monitor and transcript worker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run only the class monitor loop
    #[arg(long)]
    monitor_only: bool,

    /// Run only the transcript worker loop
    #[arg(long)]
    worker_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lessonpipe_worker={log_level},lessonpipe_common={log_level}").into()),
        )
        .init();

    info!("Starting lessonpipe-worker v{}", env!("CARGO_PKG_VERSION"));

    let exit_code = run(args).await;
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration failure");
            return 1;
        }
    };

    let pool = match operational::init_operational_store(&config.operational_dsn).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Operational store connection failed");
            return 1;
        }
    };

    let analytical: Arc<dyn AnalyticalStore> =
        match RestAnalyticalStore::new(&config.analytical_url, &config.analytical_key) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Analytical store client construction failed");
                return 1;
            }
        };

    let dispatcher = match HttpDispatcher::new(&config.webhook_url, config.monitor.webhook_timeout)
    {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => {
            error!(error = %e, "Webhook client construction failed");
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    if !args.worker_only {
        let monitor = ClassMonitor::new(pool.clone(), dispatcher, config.monitor.clone());
        let token = cancel.clone();
        tasks.spawn(async move { monitor.run(token).await });
    }

    if !args.monitor_only {
        let engine = ExerciseEngine::from_config(&config.engine);
        if config.engine.llm_api_key.is_none() {
            info!("LLM path disabled (no API key); heuristic extraction only");
        }
        if config.engine.translation_target_language.is_none() {
            info!("Translation disabled (no target language)");
        }
        let worker =
            TranscriptWorker::new(analytical, engine, None, config.worker.clone());
        let token = cancel.clone();
        tasks.spawn(async move { worker.run(token).await });
    }

    if tasks.is_empty() {
        error!("Both loops disabled; nothing to run");
        return 1;
    }

    // Signal-driven shutdown: stop accepting new work, then give in-flight
    // items a bounded grace period before abandoning them (their leases
    // will lapse and another instance reclaims them).
    let mut invariant_lost = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            cancel.cancel();
        }
        // A loop returning before cancellation means it panicked or the
        // runtime lost it; treat as unrecoverable.
        result = tasks.join_next() => {
            match result {
                Some(Ok(())) => warn!("A service loop exited unexpectedly"),
                Some(Err(e)) => error!(error = %e, "A service loop aborted"),
                None => {}
            }
            invariant_lost = true;
            cancel.cancel();
        }
    }

    let grace = config.shutdown_grace;
    if tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            grace_secs = grace.as_secs(),
            "In-flight work did not finish within the grace period, abandoning"
        );
        tasks.abort_all();
    }

    if invariant_lost {
        2
    } else {
        info!("Shutdown complete");
        0
    }
}
