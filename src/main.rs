use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paper_federate::{
    server::{http, mcp, AppState, PaperSearchServer},
    Config, PaperSearch,
};

#[derive(Parser, Debug)]
#[command(name = "paper-federate")]
#[command(about = "Federated academic paper search over MCP or HTTP")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio (MCP) or http
    #[arg(long, default_value = "stdio")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// MCP over standard input/output
    #[default]
    Stdio,
    /// JSON over HTTP
    Http,
}

/// Logs go to stderr; stdout belongs to the MCP channel.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        "Starting paper-federate"
    );

    let config = Config::from_env()?;
    let sources = config.build_sources()?;
    tracing::info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        timeout_secs = config.request_timeout.as_secs(),
        backfill = ?config.backfill,
        "Initialized paper sources"
    );
    let engine = Arc::new(
        PaperSearch::new(sources)
            .with_timeout(config.request_timeout)
            .with_backfill(config.build_backfill()),
    );

    match cli.transport {
        Transport::Stdio => {
            let server = PaperSearchServer::new(Arc::new(config), engine);
            mcp::run_stdio(server).await?;
        }
        Transport::Http => {
            let state = AppState::new(engine, config.rate_limit_per_minute);
            http::serve(state, cli.port).await?;
        }
    }

    Ok(())
}
