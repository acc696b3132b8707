use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, HttpTimeouts};
use crate::model::{
    NotificationRecord, StatusUpdate, RPC_EMAILS_TO_BE_SENT, TABLE_EMAIL_NOTIFICATIONS,
};
use crate::store::NotificationStore;
use crate::supabase::model::{EmailToBeSentRow, PostgrestError};

pub mod model;

/// PostgREST client for the Supabase project holding notifications.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(base_url: String, service_key: String, timeouts: HttpTimeouts) -> Result<Self> {
        let http = Client::builder()
            .user_agent("email-dispatcher/0.1")
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .context("failed to build Supabase HTTP client")?;
        Ok(Self {
            http,
            base_url,
            service_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.supabase.url.clone(),
            cfg.supabase.service_role_key.clone(),
            cfg.app.http_timeouts(),
        )
    }

    /// Resolve a path under `/rest/v1/`. The base URL is only parsed here so
    /// an unset `SUPABASE_URL` fails the call instead of startup.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = Url::parse(self.base_url.trim())
            .with_context(|| format!("invalid Supabase URL '{}'", self.base_url))?;
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(&format!("rest/v1/{}", path))
            .context("invalid Supabase endpoint")
    }

    pub fn build_rpc_request(&self, function: &str) -> Result<reqwest::Request> {
        let url = self.endpoint(&format!("rpc/{}", function))?;
        self.http
            .post(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&json!({}))
            .build()
            .context("failed to build Supabase RPC request")
    }

    pub fn build_upsert_request(
        &self,
        table: &str,
        rows: &[StatusUpdate],
    ) -> Result<reqwest::Request> {
        let mut url = self.endpoint(table)?;
        url.query_pairs_mut().append_pair("on_conflict", "id");
        self.http
            .post(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "resolution=merge-duplicates")
            .json(rows)
            .build()
            .context("failed to build Supabase upsert request")
    }

    #[instrument(skip_all)]
    pub async fn call_rpc(&self, function: &str) -> Result<Value> {
        let request = self.build_rpc_request(function)?;
        debug!(url = %request.url(), "calling Supabase RPC");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach Supabase for rpc {}", function))?;
        let res = ensure_success(res, function).await?;
        res.json::<Value>()
            .await
            .context("invalid Supabase RPC response JSON")
    }

    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn upsert(&self, table: &str, rows: &[StatusUpdate]) -> Result<()> {
        let request = self.build_upsert_request(table, rows)?;
        debug!(url = %request.url(), "upserting rows");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach Supabase for upsert into {}", table))?;
        ensure_success(res, table).await?;
        info!(table, rows = rows.len(), "upserted rows");
        Ok(())
    }
}

async fn ensure_success(res: Response, what: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<PostgrestError>(&body)
        .ok()
        .and_then(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => Some(format!("{} ({})", message, code)),
            (None, Some(message)) => Some(message),
            _ => None,
        })
        .unwrap_or(body);
    warn!(%status, what, "Supabase request failed");
    Err(anyhow!("supabase {} error {}: {}", what, status, detail))
}

#[async_trait]
impl NotificationStore for SupabaseClient {
    async fn fetch_due(&self) -> Result<Vec<NotificationRecord>> {
        let payload = self.call_rpc(RPC_EMAILS_TO_BE_SENT).await?;
        let rows: Vec<EmailToBeSentRow> = serde_json::from_value(payload)
            .context("unexpected row shape from get_emails_to_be_sent")?;
        Ok(rows.into_iter().map(NotificationRecord::from).collect())
    }

    async fn upsert_statuses(&self, updates: &[StatusUpdate]) -> Result<()> {
        self.upsert(TABLE_EMAIL_NOTIFICATIONS, updates).await
    }
}
