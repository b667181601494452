use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gateway_supervisor::{http, SupervisorBuilder, SupervisorHandle};

const DEFAULT_BINARY: &str = "~/.local/bin/picoclaw";

/// Process lifecycle server for the gateway.
#[derive(Debug, Parser)]
#[command(name = "gateway-supervisor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address for the control API.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the control API.
    #[arg(short, long, default_value_t = 8321)]
    port: u16,

    /// Bearer token required by the control API.
    #[arg(long, env = "GATEWAY_SUPERVISOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to the gateway binary.
    #[arg(long, default_value = DEFAULT_BINARY)]
    binary: String,

    /// Argument passed to the gateway binary (repeatable).
    #[arg(long = "gateway-arg", default_value = "gateway")]
    gateway_args: Vec<String>,

    /// Start the gateway as soon as the server is up.
    #[arg(long)]
    auto_start: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gateway_supervisor=info,gateway=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let binary = expand_home(&cli.binary);

    let supervisor = SupervisorBuilder::new(binary)
        .with_args(cli.gateway_args)
        .build()
        .into_handle();

    let listener = TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;

    tracing::info!(
        address = %format!("http://{}:{}", cli.host, cli.port),
        binary = %supervisor.binary().display(),
        auth = cli.token.is_some(),
        "gateway supervisor listening"
    );

    if cli.auto_start {
        tracing::info!("auto-starting gateway");
        let result = supervisor.start().await;
        tracing::info!(success = result.success, message = %result.message, "auto-start finished");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(supervisor.clone(), shutdown.clone()));

    supervisor
        .shutdown_on_error(http::serve(listener, supervisor.clone(), cli.token, shutdown))
        .await
        .context("control server failed")?;

    tracing::info!("server stopped");
    Ok(())
}

/// Waits for SIGINT or SIGTERM, stops the gateway, then ends the server.
///
/// Runs as its own task so the blocking stop sequence never executes in
/// signal context or on the server's accept loop.
async fn shutdown_on_signal(supervisor: SupervisorHandle, shutdown: CancellationToken) {
    if let Err(err) = wait_for_signal().await {
        tracing::error!(error = %err, "failed to install signal handlers");
        return;
    }
    tracing::info!("shutting down");
    supervisor.shutdown().await;
    shutdown.cancel();
}

async fn wait_for_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
