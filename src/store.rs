//! Data-store seam used by the dispatcher: the query returning due
//! notifications and the status write-back.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::model::{NotificationRecord, StatusUpdate};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Every notification currently due for sending, in store order.
    async fn fetch_due(&self) -> Result<Vec<NotificationRecord>>;

    /// Upsert the given rows keyed by id. Re-writing an id overwrites it.
    async fn upsert_statuses(&self, updates: &[StatusUpdate]) -> Result<()>;
}

/// Build the store selected by configuration: SQLite when
/// `app.database_url` is set, Supabase otherwise.
pub async fn from_config(cfg: &Config) -> Result<Arc<dyn NotificationStore>> {
    match cfg.app.database_url.as_deref() {
        Some(url) => {
            let pool = crate::db::init_pool(url).await?;
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(crate::db::SqliteStore::new(pool)))
        }
        None => Ok(Arc::new(crate::supabase::SupabaseClient::from_config(cfg)?)),
    }
}
