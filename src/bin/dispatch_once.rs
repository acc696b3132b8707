use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use email_dispatcher::config;
use email_dispatcher::dispatch::Dispatcher;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a single notification dispatch, print the result and exit"
)]
struct Args {
    /// Path to YAML config file; skipped when it does not exist
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit with status 1 when the run does not succeed
    #[arg(long)]
    fail_on_error: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before tracing init so RUST_LOG from .env is honoured.
    dotenvy::dotenv().ok();
    email_dispatcher::init_tracing();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let dispatcher = Dispatcher::from_config(&cfg).await?;

    let report = dispatcher.run().await;
    info!(
        run_id = %report.run_id,
        fetched = report.fetched,
        sent = report.sent,
        "single dispatch completed"
    );
    if report.reconcile.is_failed() {
        warn!("statuses were not written back; see the error above");
    }

    let success = report.result.success;
    println!("{}", serde_json::to_string(&report.result)?);
    if args.fail_on_error && !success {
        std::process::exit(1);
    }
    Ok(())
}
