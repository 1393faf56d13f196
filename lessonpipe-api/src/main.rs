//! lessonpipe-api - HTTP surface process runner
//!
//! Exit codes: 0 graceful, 1 configuration or store-connection failure at
//! startup.

use lessonpipe_api::{build_router, AppState};
use lessonpipe_common::config::Config;
use lessonpipe_common::dispatch::HttpDispatcher;
use lessonpipe_common::stores::{AnalyticalStore, RestAnalyticalStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lessonpipe_api=info,lessonpipe_common=info".into()),
        )
        .init();

    info!("Starting lessonpipe-api v{}", env!("CARGO_PKG_VERSION"));

    std::process::exit(run().await);
}

async fn run() -> i32 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration failure");
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

    let state = AppState::new(analytical, dispatcher, config.idempotency_window);
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.api_bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.api_bind_address, error = %e, "Failed to bind");
            return 1;
        }
    };
    info!("Listening on http://{}", config.api_bind_address);
    info!("Health check: http://{}/health", config.api_bind_address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
    {
        error!(error = %e, "Server error");
        return 1;
    }

    info!("Shutdown complete");
    0
}
