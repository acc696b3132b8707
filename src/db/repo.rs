use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

use crate::model::{NotificationContent, NotificationRecord, RowId, StatusUpdate};
use crate::store::NotificationStore;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database URL '{}'", database_url))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 4 })
        .connect_with(options)
        .await
        .context("failed to open SQLite database")?;
    if !in_memory {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=FULL;")
            .execute(&pool)
            .await?;
    }
    Ok(pool)
}

/// For a file-backed SQLite URL, expand a leading `~/` and make sure the
/// parent directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn bind_id<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    id: &RowId,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match id {
        RowId::Int(v) => query.bind(*v),
        RowId::Text(v) => query.bind(v.clone()),
    }
}

fn get_id(row: &SqliteRow, column: &str) -> Result<RowId> {
    if let Ok(v) = row.try_get::<i64, _>(column) {
        return Ok(RowId::Int(v));
    }
    let v: String = row
        .try_get(column)
        .with_context(|| format!("column {} is neither integer nor text", column))?;
    Ok(RowId::Text(v))
}

#[instrument(skip_all)]
pub async fn fetch_emails_to_be_sent(pool: &Pool) -> Result<Vec<NotificationRecord>> {
    let rows = sqlx::query(
        "SELECT e_id, id, preferred_email, content, title FROM emails_to_be_sent",
    )
    .fetch_all(pool)
    .await
    .context("failed to query emails_to_be_sent")?;

    rows.iter()
        .map(|row| -> Result<NotificationRecord> {
            Ok(NotificationRecord {
                id: get_id(row, "e_id")?,
                project_id: get_id(row, "id")?,
                preferred_email: row.try_get("preferred_email")?,
                content: row
                    .try_get::<Option<String>, _>("content")?
                    .map(NotificationContent::from),
                title: row.try_get("title")?,
            })
        })
        .collect()
}

#[instrument(skip_all, fields(rows = updates.len()))]
pub async fn upsert_statuses(pool: &Pool, updates: &[StatusUpdate]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for update in updates {
        let query = sqlx::query(
            "INSERT INTO email_notifications (id, project_id, sent_to, content, status, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                project_id = excluded.project_id, \
                sent_to = excluded.sent_to, \
                content = excluded.content, \
                status = excluded.status, \
                updated_at = excluded.updated_at",
        );
        let query = bind_id(query, &update.id);
        let query = bind_id(query, &update.project_id);
        query
            .bind(update.sent_to.clone())
            .bind(update.content.as_ref().map(|c| c.as_str().to_string()))
            .bind(update.status.as_str())
            .bind(update.updated_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to upsert notification {}", update.id))?;
    }
    tx.commit().await?;
    Ok(())
}

/// [`NotificationStore`] over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn fetch_due(&self) -> Result<Vec<NotificationRecord>> {
        fetch_emails_to_be_sent(&self.pool).await
    }

    async fn upsert_statuses(&self, updates: &[StatusUpdate]) -> Result<()> {
        upsert_statuses(&self.pool, updates).await
    }
}
