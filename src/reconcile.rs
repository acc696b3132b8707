//! Status write-back for every record fetched in a run.
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use crate::error::DispatchError;
use crate::model::{DeliveryOutcome, NotificationRecord, StatusUpdate};
use crate::store::NotificationStore;

/// One update per fetched record, all carrying the run's single outcome.
pub fn build_status_updates(
    records: &[NotificationRecord],
    outcome: DeliveryOutcome,
    updated_at: DateTime<Utc>,
) -> Vec<StatusUpdate> {
    records
        .iter()
        .map(|record| StatusUpdate {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            sent_to: record.preferred_email.clone(),
            content: record.content.clone(),
            status: outcome,
            updated_at,
        })
        .collect()
}

/// What the write-back did. A failure here never changes the run result.
#[derive(Debug)]
pub enum ReconcileReport {
    /// Nothing was fetched, so nothing was written.
    Skipped,
    Written(usize),
    Failed(DispatchError),
}

impl ReconcileReport {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileReport::Failed(_))
    }
}

#[instrument(skip_all, fields(records = records.len(), outcome = outcome.as_str()))]
pub async fn reconcile(
    store: &dyn NotificationStore,
    records: &[NotificationRecord],
    outcome: DeliveryOutcome,
) -> ReconcileReport {
    if records.is_empty() {
        debug!("no records fetched; nothing to reconcile");
        return ReconcileReport::Skipped;
    }

    let updates = build_status_updates(records, outcome, Utc::now());
    match store.upsert_statuses(&updates).await {
        Ok(()) => {
            info!(written = updates.len(), "statuses reconciled");
            ReconcileReport::Written(updates.len())
        }
        Err(err) => {
            error!(
                error = %format!("{:#}", err),
                divergent = true,
                "status write-back failed; persisted state no longer matches run result"
            );
            ReconcileReport::Failed(DispatchError::Reconcile(err))
        }
    }
}
