use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stubby_gateway::config::DEFAULT_IGNORED_PATHS;
use stubby_gateway::{logging, Config, GatewayServer, TargetsFile};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stubby-gateway")]
#[command(version, about = "HTTP gateway that forwards, records or replays upstream traffic")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "HTTP_PORT", default_value = "4444")]
    http_port: u16,

    /// Externally visible URL of the gateway
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:4444")]
    base_url: String,

    /// Root directory holding one subdirectory per profile
    #[arg(long, env = "STUB_DIR", default_value = "stubs")]
    stub_dir: PathBuf,

    /// Comma-separated path prefixes answered with an empty 200
    #[arg(long, env = "IGNORE_PATHS", value_delimiter = ',', default_values_t = DEFAULT_IGNORED_PATHS.iter().map(|p| p.to_string()).collect::<Vec<_>>())]
    ignore_paths: Vec<String>,

    /// Targets file (JSON, or YAML by extension); the embedded default is used if absent
    #[arg(long, env = "CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Interval between flushes of recorded exchanges, in milliseconds
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value = "1000")]
    flush_interval_ms: u64,

    /// Debug logging for the gateway
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    logging::init(args.verbose);

    info!("stubby-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let targets_file = match &args.config_file {
        Some(path) => {
            info!("Loading targets from {}", path.display());
            TargetsFile::from_file(path)?
        }
        None => TargetsFile::embedded()?,
    };

    let mut config = Config::new(targets_file, args.stub_dir);
    config.http_port = args.http_port;
    config.base_url = args.base_url;
    config.ignored_paths = args.ignore_paths;
    config.flush_interval = Duration::from_millis(args.flush_interval_ms.max(1));

    GatewayServer::new(config).run(shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
