pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod mailer;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod server;
pub mod store;
pub mod supabase;

/// Install the process-wide tracing subscriber. `RUST_LOG` controls the
/// filter, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}
