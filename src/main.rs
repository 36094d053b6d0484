use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use lumend::{auth, client::ShellClient, config::ShellConfig, ipc, AppContext};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "lumend",
    about = "Lumen Host — launcher shell background daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "LUMEND_PORT")]
    port: Option<u16>,

    /// Data directory for the auth token and config.toml
    #[arg(long, env = "LUMEND_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "LUMEND_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1)
    #[arg(long, env = "LUMEND_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "LUMEND_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the host in the foreground (default when no subcommand given).
    Serve,
    /// Query a running host for its status.
    Status,
    /// List background tasks on a running host.
    Tasks {
        /// Only tasks owned by this mini-app scheme
        #[arg(long)]
        scheme: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ShellConfig::load(args.data_dir);
    config.apply_overrides(args.port, args.bind_address, args.log);

    // Init once — must happen before any tracing calls.
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref());

    match args.command {
        Some(Command::Status) => run_client_call(&config, "shell.status", json!({})).await?,
        Some(Command::Tasks { scheme }) => {
            run_client_call(&config, "task.list", json!({ "ownerScheme": scheme })).await?
        }
        None | Some(Command::Serve) => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: ShellConfig) -> Result<()> {
    let auth_token =
        auth::get_or_create_token(&config.data_dir).context("failed to initialize auth token")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        "starting Lumen host"
    );
    let ctx = Arc::new(AppContext::new(config, auth_token));
    ipc::run(ctx).await
}

async fn run_client_call(config: &ShellConfig, method: &str, params: serde_json::Value) -> Result<()> {
    let token = auth::read_token(&config.data_dir)?;
    let result = ShellClient::call_once(config.port, &token, method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only
/// logging with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("lumend.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
