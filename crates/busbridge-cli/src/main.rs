// busbridge - short-lived command-line client for the bridge host.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use busbridge_client::{HostClient, Supervisor, SupervisorConfig};
use busbridge_core::FileTokenVault;
use busbridge_host::HostConfig;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "busbridge", version, about = "Onboard devices into the bridge host")]
struct Cli {
    /// Host service socket path (defaults to the shared host config)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Sharing-token vault directory (defaults to the shared host config)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Onboard a device
    Add {
        /// Device display name
        #[arg(long)]
        name: String,
        /// Device properties JSON; must contain a non-empty "id" field
        #[arg(long)]
        props: String,
        /// Path to the translator script file
        #[arg(long)]
        script: PathBuf,
        /// Path to the schema document file
        #[arg(long)]
        schema: PathBuf,
        /// Onboarding category (device-family namespace)
        #[arg(long)]
        category: String,
    },
    /// One-shot health check against the host
    Health,
    /// Supervise the host connection in the foreground until interrupted
    Watch,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = HostConfig::load()?;
    let socket = cli.socket.unwrap_or(config.socket_path);
    let vault_dir = cli.vault.unwrap_or(config.vault_dir);

    match cli.command {
        Command::Add {
            name,
            props,
            script,
            schema,
            category,
        } => {
            let vault = FileTokenVault::new(&vault_dir);
            let script_token = vault.issue(&script).await?;
            let schema_token = vault.issue(&schema).await?;

            let (client, _events) = HostClient::connect_to(&socket).await?;
            let response = client
                .add_device(&name, &props, &script_token, &schema_token, &category)
                .await?;

            // The host's response is the contract: either "succeeded" or a
            // verbatim failure message.
            println!("{}", response.response);
            if !response.is_succeeded() {
                std::process::exit(1);
            }
        }
        Command::Health => {
            let (client, _events) = HostClient::connect_to(&socket).await?;
            let healthy = client.healthcheck(Duration::from_secs(3)).await?;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
            if !healthy {
                std::process::exit(1);
            }
        }
        Command::Watch => {
            let supervisor = Supervisor::new(SupervisorConfig::new(&socket));
            let cancel = supervisor.cancellation_token();
            let mut state = supervisor.state();

            tokio::spawn(async move {
                while state.changed().await.is_ok() {
                    let current = *state.borrow();
                    info!(state = ?current, "connection state changed");
                }
            });

            let handle = tokio::spawn(supervisor.run());
            tokio::signal::ctrl_c().await?;
            cancel.cancel();
            let _ = handle.await;
        }
    }
    Ok(())
}
