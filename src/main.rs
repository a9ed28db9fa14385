use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use courier_server::{AppState, JsonTenantDirectory, ServerConfig};
use courier_session::{RegistryConfig, SessionRegistry};
use courier_transport::memory::MemoryTransport;

#[derive(Parser)]
#[command(name = "courier", about = "Multi-tenant chat messaging automation service")]
struct Cli {
    /// Port for the HTTP control surface.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Base directory holding per-tenant session credentials.
    #[arg(long, default_value = "./sessions")]
    sessions_dir: PathBuf,

    /// JSON file describing tenants and their config overrides.
    #[arg(long, default_value = "./tenants.json")]
    tenants_file: PathBuf,

    /// API key required on every request; omit to run open.
    #[arg(long, env = "COURIER_API_KEY")]
    api_key: Option<String>,

    /// Bounded wait for connection establishment, in seconds.
    #[arg(long, default_value_t = 30)]
    connect_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("starting courier");

    let directory = Arc::new(
        JsonTenantDirectory::load(&cli.tenants_file).with_context(|| {
            format!("loading tenant directory {}", cli.tenants_file.display())
        })?,
    );

    // The real wire client links in here by implementing `ChatTransport`.
    // Until one is compiled in, the in-memory transport records sends
    // instead of delivering them.
    let transport = MemoryTransport::auto_open();
    tracing::warn!("no wire transport compiled in, running with the in-memory dry-run transport");

    let registry = Arc::new(SessionRegistry::new(
        transport,
        directory.clone(),
        RegistryConfig {
            sessions_dir: cli.sessions_dir,
            connect_timeout: Duration::from_secs(cli.connect_timeout_secs),
            ..RegistryConfig::default()
        },
    ));

    let state = AppState {
        registry: Arc::clone(&registry),
        directory,
        api_key: cli.api_key,
    };
    let server = courier_server::start(ServerConfig { port: cli.port }, state)
        .await
        .context("starting HTTP server")?;
    tracing::info!(port = server.port, "courier ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl+c")?;
    tracing::info!("shutting down");
    registry.shutdown();
    Ok(())
}
