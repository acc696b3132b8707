use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

use email_dispatcher::config;
use email_dispatcher::dispatch::Dispatcher;
use email_dispatcher::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve the scheduled email notification trigger")]
struct Args {
    /// Path to YAML config file; skipped when it does not exist
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before tracing init so RUST_LOG from .env is honoured.
    dotenvy::dotenv().ok();
    email_dispatcher::init_tracing();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let addr = cfg.bind_addr()?;

    let dispatcher = Dispatcher::from_config(&cfg).await?;
    let app = server::router(AppState::new(dispatcher));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "email dispatcher listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
