//! `procd-worker` -- recurring job dispatcher daemon.
//!
//! Polls the processing API for jobs of each configured pipeline stage and
//! runs them through the stage's command on a bounded worker pool.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default | Description                              |
//! |-----------------------------|----------|---------|------------------------------------------|
//! | `JOB_SOURCE_URL`            | yes      | --      | Processing API base URL                  |
//! | `POLL_INTERVAL_SECS`        | no       | `2`     | Delay between scheduler passes           |
//! | `REQUEST_TIMEOUT_SECS`      | no       | `30`    | Job source request timeout               |
//! | `WORKERS_<STAGE>`           | no       | `0`     | Concurrent jobs for a stage              |
//! | `HANDLER_<STAGE>_COMMAND`   | per stage| --      | Command run for each job of the stage    |
//! | `HANDLER_<STAGE>_WORKDIR`   | no       | cwd     | Working directory for the command        |
//! | `HANDLER_<STAGE>_TIMEOUT_SECS` | no    | `3600`  | Per-job command timeout                  |

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use procd_client::ApiClient;
use procd_core::Config;
use procd_worker::wiring;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procd_worker=info,procd_core=info,procd_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    tracing::info!(
        job_source_url = %config.job_source_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Loaded configuration",
    );
    let config = Arc::new(config);

    let client = ApiClient::from_config(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build job source client");
        std::process::exit(1);
    });

    let mut scheduler = wiring::build_scheduler(Arc::clone(&config), Arc::new(client))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to wire pipeline stages");
            std::process::exit(1);
        });

    if scheduler.dispatchers().is_empty() {
        tracing::warn!("No stages have workers configured; the scheduler will idle");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    tracing::info!("Checking for jobs");
    scheduler.run(cancel).await;
}

/// Cancel `cancel` on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// In-flight jobs are not waited for; the job source remains the authority
/// on their eventual state.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping scheduler");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping scheduler");
        }
    }

    cancel.cancel();
}
