//! Depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_bagit::BagValidator;
use depot_core::config::AppConfig;
use depot_core::{DepositId, DepositState};
use depot_server::finalize::{FinalizeHandle, FinalizeRequest, spawn_finalizer};
use depot_server::{AppState, create_router};
use depot_storage::{Promoter, PropsStore, StagingArea};
use depot_vcs::Versioning;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Depot - a SWORDv2 deposit service for scientific datasets
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "DEPOT_CONFIG", default_value = "config/depot.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Depot v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything). All parsing is strict; a malformed value stops startup
    // here rather than surfacing mid-request.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Initialize the storage services.
    let staging = Arc::new(
        StagingArea::new(&config.store.temp_root)
            .await
            .context("failed to initialize staging area")?,
    );
    let props = Arc::new(PropsStore::new(
        &config.store.temp_root,
        &config.store.deposits_root,
    ));
    let promoter = Arc::new(
        Promoter::new(&config.store.deposits_root)
            .await
            .context("failed to initialize deposits root")?,
    );
    tracing::info!(
        temp_root = %config.store.temp_root.display(),
        deposits_root = %config.store.deposits_root.display(),
        "Storage roots initialized"
    );

    let versioning = Versioning::from_config(&config.vcs);
    if versioning.is_some() {
        tracing::info!("Versioning of accepted deposits enabled");
    }

    // Spawn the finalization worker before accepting requests.
    let (finalizer, worker) = spawn_finalizer(
        staging.clone(),
        props.clone(),
        promoter,
        BagValidator::new(),
        versioning,
        config.server.queue_capacity,
    );
    tracing::info!(
        queue_capacity = config.server.queue_capacity,
        "Finalization worker spawned"
    );

    // Re-queue deposits interrupted mid-finalization by a previous instance.
    requeue_in_flight(&staging, &props, &finalizer).await?;

    let state = AppState::new(config.clone(), staging, props, finalizer);
    let app = create_router(state.clone());

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close the queue and let in-flight finalization runs complete.
    drop(state);
    tracing::info!("Waiting for in-flight finalization runs");
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Finalization worker did not shut down cleanly");
    }

    Ok(())
}

/// Resolve when the process is asked to stop (ctrl-c or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Re-queue deposits a previous instance left in `FINALIZING`.
///
/// Nothing is written past the `SUBMITTED` record until promotion succeeds,
/// so an interrupted run can simply be restarted. Staging directories already
/// marked `SUBMITTED` are left for operator re-promotion; everything else is
/// reported and skipped.
async fn requeue_in_flight(
    staging: &StagingArea,
    props: &PropsStore,
    finalizer: &FinalizeHandle,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(staging.root())
        .await
        .context("failed to scan staging root")?;

    let mut requeued = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Ok(deposit_id) = DepositId::parse(&name.to_string_lossy()) else {
            tracing::warn!(entry = ?name, "Ignoring staging entry with unusable name");
            continue;
        };

        let record = match props.get(&deposit_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    deposit_id = %deposit_id,
                    error = %e,
                    "Staging directory without readable record, skipping"
                );
                continue;
            }
        };

        match (record.state, record.mime_type) {
            (DepositState::Finalizing, Some(package)) => {
                finalizer
                    .submit(FinalizeRequest {
                        deposit_id: deposit_id.clone(),
                        package,
                    })
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to re-queue {deposit_id}: {e}"))?;
                tracing::info!(deposit_id = %deposit_id, "Re-queued interrupted finalization");
                requeued += 1;
            }
            (DepositState::Finalizing, None) => {
                tracing::warn!(
                    deposit_id = %deposit_id,
                    "Interrupted deposit has no recorded content type; operator attention required"
                );
            }
            (DepositState::Submitted, _) => {
                tracing::warn!(
                    deposit_id = %deposit_id,
                    "Staging directory marked SUBMITTED; crashed during promotion, \
                     operator re-promotion required"
                );
            }
            _ => {}
        }
    }

    if requeued > 0 {
        tracing::info!(count = requeued, "Re-queued interrupted finalizations");
    }
    Ok(())
}
