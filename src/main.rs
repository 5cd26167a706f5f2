use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use botdesk::{
    config,
    db::{self, DbPool},
    state::AppState,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "botdesk", about = "Chatbot management and embed service", version)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, default_value = "botdesk.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botdesk=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg).await,
        Commands::Migrate => migrate(&cfg),
    }
}

fn open_database(cfg: &config::BotdeskConfig, readers: usize) -> anyhow::Result<DbPool> {
    db::open(&cfg.database_path, readers)
}

fn migrate(cfg: &config::BotdeskConfig) -> anyhow::Result<()> {
    open_database(cfg, 1)?;
    info!("Database migrations applied");
    Ok(())
}

// ── Serve ──────────────────────────────────────────────────────────────────

async fn serve(cfg: config::BotdeskConfig) -> anyhow::Result<()> {
    info!("Opening database (4 reader connections)...");
    let db = open_database(&cfg, 4)?;

    info!(
        provider = %cfg.llm.provider,
        rag = %cfg.rag.server_url,
        auth = %cfg.auth.service_url,
        "Building application state"
    );
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid bind address")?;
    let state = AppState::from_config(cfg, Arc::new(db))?;

    if let Err(e) = state.chat.provider().warmup().await {
        tracing::warn!("LLM provider warmup failed: {e}");
    }

    let app = botdesk::routes::app(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped.");
    Ok(())
}

// ── Graceful shutdown ──────────────────────────────────────────────────────

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install CTRL+C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
