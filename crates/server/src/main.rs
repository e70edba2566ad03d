//! Pharos Server
//!
//! Axum server exposing the orchestration engine over HTTP/SSE, plus a
//! one-shot `ask` command that streams an answer to the terminal.

mod api;
mod error;

use anyhow::Context;
use api::{AppState, SharedState};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use pharos_core::{Coordinator, OrchestratorConfig, StreamEvent};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(author, version, about = "Pharos - multi-specialist analysis with streamed synthesis")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Answer one question and stream it to stdout
    Ask {
        /// The question to answer
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = OrchestratorConfig::load()
        .await
        .context("failed to load configuration")?;
    let coordinator =
        Coordinator::from_config(&config).context("failed to initialise model client")?;

    match args.command {
        Some(CliCommand::Ask { query }) => ask(&coordinator, &query).await,
        Some(CliCommand::Serve { host, port }) => run_server(coordinator, config, &host, port).await,
        None => run_server(coordinator, config, "127.0.0.1", 8080).await,
    }
}

async fn ask(coordinator: &Coordinator, query: &str) -> anyhow::Result<()> {
    let mut events = coordinator.stream_text(query, None)?;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Chunk { text } => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::Status {
                specialist,
                state,
                detail,
            } => match detail {
                Some(detail) => eprintln!("[{}] {:?}: {}", specialist.display_name(), state, detail),
                None => eprintln!("[{}] {:?}", specialist.display_name(), state),
            },
            StreamEvent::Error { kind, message } => {
                writeln!(stdout)?;
                anyhow::bail!("{}: {}", kind, message);
            }
            StreamEvent::Done => writeln!(stdout)?,
        }
    }
    Ok(())
}

async fn run_server(
    coordinator: Coordinator,
    config: OrchestratorConfig,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(AppState {
        coordinator,
        config,
    });
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "Pharos server listening");
    tracing::info!("  Agent:       /api/v1/agent/stream (SSE), /api/v1/agent/chat");
    tracing::info!("  Discovery:   /api/v1/health, /api/v1/specialists, /api/v1/openapi.json");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
