//! tcpping - TCP reachability and latency monitor.
//!
//! Probes every configured target on its own schedule and reports probe
//! results and rolling latency statistics.

mod config;
mod probe;
mod scheduler;
mod sink;
mod stats;

use config::AppConfig;
use probe::{SystemResolver, TaskDefinition, TaskError, TcpConnector};
use scheduler::{Prober, Scheduler};

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging; events own stdout, diagnostics go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("tcpping=info".parse()?))
        .init();

    // Load configuration
    let cfg = AppConfig::load();

    let mut probers = Vec::with_capacity(cfg.descriptors.len());
    for (name, raw) in &cfg.descriptors {
        match build_prober(raw, &cfg.project_id).await {
            Ok(prober) => probers.push(prober),
            Err(e) => tracing::error!("Skipping {}: invalid task URL {}: {}", name, raw, e),
        }
    }

    if probers.is_empty() {
        tracing::info!("no prober tasks were configured");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let mut scheduler = Scheduler::new(cancel);
    for prober in probers {
        scheduler.spawn(prober);
    }
    tracing::info!("Started {} prober tasks", scheduler.len());

    for report in scheduler.join().await {
        tracing::info!(
            "Probed '{}' {} times ({:?})",
            report.descriptor,
            report.attempts,
            report.elapsed
        );
    }

    Ok(())
}

async fn build_prober(
    raw: &str,
    project_id: &str,
) -> Result<Prober<SystemResolver, TcpConnector>, TaskError> {
    let definition = TaskDefinition::parse(raw)?;
    let sink = sink::for_task(&definition, project_id);
    Prober::new(definition, SystemResolver, TcpConnector::default(), sink).await
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = wait_for_ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    tracing::info!("Shutting down");
    token.cancel();
}

/// Resolve on ctrl-c; never resolves if the handler cannot be installed.
async fn wait_for_ctrl_c() {
    wait_for_signal("ctrl-c", tokio::signal::ctrl_c()).await;
}

async fn wait_for_signal(name: &str, signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!("Cannot listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}
