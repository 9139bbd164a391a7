// busbridge-host - long-lived bridge host process.
//
// Startup order matters: the persisted onboarding containers are replayed
// through the registry before the listener starts accepting requests, so a
// restarted host re-exposes every previously onboarded device.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use busbridge_core::{BridgeEngine, FileTokenVault, TokenExchange};
use busbridge_host::bus::LogOnlyEngine;
use busbridge_host::registry::OnboardingRegistry;
use busbridge_host::server::Listener;
use busbridge_host::store::PersistentStore;
use busbridge_host::{lifecycle, HostConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("starting busbridge host v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("host failed: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = HostConfig::load()?;

    let pid_path = lifecycle::pid_path();
    if lifecycle::is_host_running_at(&pid_path) {
        anyhow::bail!("a bridge host is already running (pid file {})", pid_path.display());
    }
    lifecycle::write_pid_file(&pid_path)?;
    let _pid_guard = scopeguard::guard(pid_path, |p| lifecycle::remove_pid_file(&p));

    let tokens: Arc<dyn TokenExchange> = Arc::new(FileTokenVault::new(&config.vault_dir));
    let engine: Arc<dyn BridgeEngine> = Arc::new(LogOnlyEngine);
    let registry = Arc::new(OnboardingRegistry::new(
        PersistentStore::new(&config.store_dir),
        tokens,
        engine,
        config.modules_path.clone(),
    ));

    replay(&registry).await;

    let listener = Listener::bind(&config.socket_path, registry).await?;
    let shutdown = listener.shutdown_handle();
    let socket_path: PathBuf = config.socket_path.clone();
    let _socket_guard = scopeguard::guard(socket_path, |p| lifecycle::remove_socket(&p));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown.send(());
        }
    });

    listener.run().await
}

async fn replay(registry: &Arc<OnboardingRegistry>) {
    let outcomes = registry.replay_all().await;
    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
    for (key, outcome) in &outcomes {
        match outcome {
            Ok(()) => info!(%key, "replayed device"),
            Err(e) => warn!(%key, error = %e, "replay skipped device"),
        }
    }
    info!(
        replayed = outcomes.len() - failed,
        failed,
        "startup replay complete"
    );
}
