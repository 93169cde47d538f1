use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};

use relay_core::RelayCoordinator;
use relay_server::{HeartbeatSettings, RelayServer, ShutdownCoordinator};
use relay_telegram::{ClientOptions, TelegramClient, TelegramOperator, UpdatePoller};
use relay_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// Relay between anonymous web clients and one operator on Telegram.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Cli {
    /// JSON config file merged over the built-in defaults.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Bind host (overrides HOST).
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides PORT).
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        error!("{e:#}");
        eprintln!("relay: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        relay_server::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let telemetry = TelemetryConfig {
        log_level: parse_level(&config.log_level).unwrap_or(Level::INFO),
        json: config.log_json,
        ..TelemetryConfig::default()
    };
    init_telemetry(&telemetry)?;

    let credentials = config
        .credentials()
        .context("TELEGRAM_TOKEN and ADMIN_CHAT_ID must be set")?;

    let options = ClientOptions {
        api_base: config.telegram.api_base.clone(),
        proxy: config.telegram.proxy.clone(),
        ..ClientOptions::default()
    };
    if let Some(proxy) = &options.proxy {
        info!(proxy = %proxy, "using proxy for telegram");
    }
    let client = Arc::new(TelegramClient::new(credentials.token, options)?);
    let operator = Arc::new(TelegramOperator::new(Arc::clone(&client), credentials.chat_id));
    let coordinator = Arc::new(RelayCoordinator::with_correlation_ttl(
        operator,
        config.correlation_ttl(),
    ));

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let mut server = RelayServer::new(
        coordinator,
        HeartbeatSettings::from(&config),
        Arc::clone(&shutdown),
    );
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let (operator_tx, operator_rx) = mpsc::channel(256);
    server.attach_operator(operator_rx);
    let poller = UpdatePoller::new(
        client,
        credentials.chat_id,
        config.telegram.poll_timeout_secs,
    );
    shutdown.track(tokio::spawn(poller.run(operator_tx, shutdown.token())));

    if let Some(ttl) = config.correlation_ttl() {
        info!(ttl_secs = ttl.as_secs(), "correlation expiry enabled");
        server.start_sweeper(Duration::from_secs(config.sweep_interval_secs.max(1)));
    }

    let addr = server
        .listen(&config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %addr, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    info!("shutting down");
    shutdown.graceful_shutdown(None).await;
    Ok(())
}
