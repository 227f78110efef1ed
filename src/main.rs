use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use depd::{
    config::{ConfigOverrides, ServiceConfig},
    rest,
    store::Store,
    AppContext,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "depd",
    about = "depd — multi-tenant work-item dependency graph service",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP listen port
    #[arg(long, env = "DEPD_PORT")]
    port: Option<u16>,

    /// Postgres connection URL; overrides the discrete db settings
    #[arg(long, env = "DEPD_DATABASE_URL")]
    database_url: Option<String>,

    /// Path to the TOML config file (default: ./depd.toml)
    #[arg(long, env = "DEPD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DEPD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "DEPD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the service (default when no subcommand given).
    ///
    /// Runs depd in the foreground until SIGTERM/SIGINT.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(ServiceConfig::new(ConfigOverrides {
        port: args.port,
        database_url: args.database_url,
        log: args.log,
        config_file: args.config,
    }));
    // Keep the non-blocking writer alive for the whole process.
    let _log_guard = init_tracing(&config.log, args.log_file.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
    }
}

fn init_tracing(
    filter: &str,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file = path.file_name().unwrap_or_else(|| "depd.log".as_ref());
            let appender = tracing_appender::rolling::daily(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

async fn run_server(config: Arc<ServiceConfig>) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "depd starting");
    info!(
        port = config.port,
        db_host = %config.db_host,
        db_name = %config.db_name,
        rate_limit_window_secs = config.rate_limit_window_secs,
        rate_limit_max_requests = config.rate_limit_max_requests,
        "config loaded"
    );

    // The store is a hard startup dependency; refusing to come up beats
    // serving requests that can only 500.
    let store = Store::connect(&config)
        .await
        .context("store connection failed — is Postgres reachable?")?;
    info!("store connected, migrations applied");

    let ctx = Arc::new(AppContext::new(config, Arc::new(store)));

    rest::serve(ctx.clone(), shutdown_signal()).await?;

    // The listener has drained; release the pool before exiting. The event
    // bus closes with the last subscriber.
    ctx.store.close().await;
    info!("store pool closed, exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
