// File: snapshotter/src/main.rs
use anyhow::{anyhow, Result};
use clap::Parser;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use snapshotter::config::ConfigManager;
use snapshotter::database::Database;
use snapshotter::remote::ssh::{SshCredentials, SshSession};
use snapshotter::remote::{NodeHost, RemoteHost};
use snapshotter::scheduler::{CleanupScheduler, PollingScheduler, PollingSettings};
use snapshotter::snapshot::{LifecycleSettings, SnapshotLifecycle};
use snapshotter::storage::{ObjectStore, S3ObjectStore};
use snapshotter::web::{start_web_server, AppState};
use snapshotter::{AgreementChecker, Config, FleetStatus, RetentionManager, SnapshotError};

#[derive(Parser, Debug)]
#[command(name = "snapshotter", about = "Coordinated blockchain node snapshots to object storage")]
struct Args {
    /// Directory holding main.toml and one <alias>.toml per target
    #[arg(long, default_value = "config")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("snapshotter=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?)
        .add_directive("russh=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    info!("Starting snapshotter (config dir: {})", args.config);

    if let Err(e) = run(args).await {
        match e.downcast_ref::<SnapshotError>() {
            Some(se) if se.is_fatal_at_startup() => error!("Fatal startup error: {}", se),
            _ => error!("Snapshotter stopped: {:#}", e),
        }
        return Err(e);
    }

    info!("Snapshotter shut down cleanly");
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let config_manager = ConfigManager::new(args.config).await?;
    let config = config_manager.get_current_config();

    // Initialize database
    let database = Arc::new(Database::new(&config.database.path).await?);
    info!("Database initialized");

    // Object storage is required for the latest marker and retention
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_config(&config.snapshots.s3).await?);
    if store.bucket_name().is_empty() {
        warn!("No S3 bucket name configured; uploads and cleanup will fail");
    }

    let hosts = connect_targets(&config, store.bucket_name()).await?;
    info!("Connected to {} targets", hosts.len());

    let agreement = AgreementChecker::new(hosts.clone());
    agreement.verify_chain_ids(&config.chain_id).await?;
    info!("All targets report chain id {}", config.chain_id);

    let status = FleetStatus::new(config.snapshots.block_interval);

    // Retention runs independently of polling
    let retention = Arc::new(RetentionManager::new(
        database.clone(),
        store.clone(),
        config.snapshots.dry_run,
    ));
    let _cleanup = CleanupScheduler::new(retention, config.snapshots.cleanup.clone())
        .start()
        .await?;

    // HTTP API
    let state = AppState::new(
        database.clone(),
        status.clone(),
        config.server.api_token.clone(),
    );
    let listen_addr = config.server.listen_addr.clone();
    let server = tokio::spawn(async move { start_web_server(&listen_addr, state).await });

    let lifecycle = Arc::new(SnapshotLifecycle::new(
        hosts,
        database.clone(),
        store,
        status.clone(),
        LifecycleSettings::from(&config.snapshots),
    ));
    let poller = PollingScheduler::new(
        agreement,
        lifecycle,
        database,
        status,
        PollingSettings::from(&config.snapshots),
    );

    tokio::select! {
        result = poller.run() => {
            result?;
            info!("Run-once snapshot cycle completed");
        }
        result = server => {
            match result {
                Ok(Ok(())) => warn!("HTTP server stopped"),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(anyhow!("HTTP server task failed: {}", e)),
            }
        }
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    Ok(())
}

/// Open one SSH session per target concurrently; any unreachable target aborts startup
async fn connect_targets(config: &Config, bucket_name: &str) -> Result<Vec<Arc<dyn RemoteHost>>> {
    let credentials = SshCredentials::load(&config.ssh).await?;

    let hosts = try_join_all(config.targets.iter().map(|target| {
        let credentials = credentials.clone();
        async move {
            let session = SshSession::connect(
                &target.alias,
                &target.host,
                target.port,
                &target.user,
                credentials,
            )
            .await?;
            info!(
                "Connected to {} ({}@{}:{})",
                target.alias, target.user, target.host, target.port
            );
            let host: Arc<dyn RemoteHost> = Arc::new(NodeHost::new(
                target.clone(),
                config.snapshots.rclone.clone(),
                bucket_name.to_string(),
                Arc::new(session),
            ));
            Ok::<_, SnapshotError>(host)
        }
    }))
    .await?;

    Ok(hosts)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
