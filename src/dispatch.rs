//! One dispatch run: fetch due notifications, send them as a single batch,
//! then write the outcome back for every fetched record.
//!
//! The write-back runs on every exit path of the fetch/send phase,
//! including errors and collaborator panics, and the run itself never
//! returns an error: failures end up in [`RunResult`].
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::DispatchError;
use crate::mailer::{BatchMailer, HttpMailer};
use crate::model::{DeliveryOutcome, NotificationRecord};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::render::{classify, render_batch};
use crate::store::{self, NotificationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Sending,
    Reconciling,
    Done,
}

/// Terminal result handed back to the caller.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub error: Option<DispatchError>,
    pub success: bool,
}

impl RunResult {
    pub fn from_error(error: Option<DispatchError>) -> Self {
        Self {
            success: error.is_none(),
            error,
        }
    }
}

/// Everything a run did, for callers that want more than [`RunResult`].
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub result: RunResult,
    pub fetched: usize,
    pub sent: usize,
    pub outcome: DeliveryOutcome,
    pub reconcile: ReconcileReport,
}

struct RunState {
    phase: RunPhase,
    records: Vec<NotificationRecord>,
    sent: usize,
    outcome: DeliveryOutcome,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: RunPhase::Fetching,
            records: Vec::new(),
            sent: 0,
            outcome: DeliveryOutcome::EmailFailed,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    mailer: Arc<dyn BatchMailer>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, mailer: Arc<dyn BatchMailer>) -> Self {
        Self { store, mailer }
    }

    pub async fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let store = store::from_config(cfg).await?;
        let mailer = Arc::new(HttpMailer::from_config(cfg)?);
        Ok(Self::new(store, mailer))
    }

    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        self.run_once(run_id)
            .instrument(info_span!("dispatch", %run_id))
            .await
    }

    async fn run_once(&self, run_id: Uuid) -> RunReport {
        let mut state = RunState::new();

        let error = match AssertUnwindSafe(self.fetch_and_send(&mut state))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(DispatchError::Panicked(panic_message(panic.as_ref()))),
        };
        if let Some(err) = &error {
            error!(phase = ?state.phase, kind = err.kind(), error = %err, "dispatch failed");
        }

        state.phase = RunPhase::Reconciling;
        let reconcile = match AssertUnwindSafe(reconcile(
            self.store.as_ref(),
            &state.records,
            state.outcome,
        ))
        .catch_unwind()
        .await
        {
            Ok(report) => report,
            Err(panic) => {
                let err = DispatchError::Panicked(panic_message(panic.as_ref()));
                error!(error = %err, divergent = true, "status write-back panicked");
                ReconcileReport::Failed(err)
            }
        };
        state.phase = RunPhase::Done;

        let result = RunResult::from_error(error);
        info!(
            success = result.success,
            fetched = state.records.len(),
            sent = state.sent,
            outcome = state.outcome.as_str(),
            reconciled = !reconcile.is_failed(),
            "dispatch finished"
        );
        RunReport {
            run_id,
            result,
            fetched: state.records.len(),
            sent: state.sent,
            outcome: state.outcome,
            reconcile,
        }
    }

    async fn fetch_and_send(&self, state: &mut RunState) -> Result<(), DispatchError> {
        state.phase = RunPhase::Fetching;
        state.records = self.store.fetch_due().await.map_err(DispatchError::Source)?;
        info!(fetched = state.records.len(), "fetched due notifications");

        state.phase = RunPhase::Sending;
        let batch = render_batch(&classify(&state.records));
        let skipped = state.records.len() - batch.len();
        if skipped > 0 {
            debug!(skipped, "records with unrecognized content or no address left out of the batch");
        }

        if batch.is_empty() {
            debug!("nothing to send");
        } else {
            self.mailer.send_batch(&batch).await?;
        }
        state.sent = batch.len();
        state.outcome = DeliveryOutcome::EmailSent;
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
