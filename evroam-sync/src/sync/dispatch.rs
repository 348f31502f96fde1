//! Dispatch to the remote side
//!
//! The remote exchange is a pluggable trait. `DispatchClient` wraps it with a
//! timeout and folds whatever comes back into a normalized [`PushOutcome`]:
//!
//! | Exchange result                      | Outcome          |
//! |--------------------------------------|------------------|
//! | `Ok`, no rejected records            | `Success`        |
//! | `Ok`, some rejected records          | `PartialFailure` |
//! | `Ok`, every record rejected          | `Failure`        |
//! | `Err(_)`                             | `Failure`        |
//! | no answer within the request timeout | `Timeout`        |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ExchangeError;
use crate::model::StreamKind;

use super::batch::{Change, ChangeBatch};
use super::outcome::{OutcomeStatus, PushOutcome, RecordStatus, Warning};

/// Transport to the remote roaming platform
#[async_trait]
pub trait RemoteExchange: Send + Sync {
    /// Push a batch for the batch's stream
    async fn push(&self, batch: &ChangeBatch) -> Result<PushOutcome, ExchangeError>;

    /// Send one concluded session outside the periodic cycle
    async fn send_session(&self, change: &Change) -> Result<PushOutcome, ExchangeError>;
}

/// Timeout-bounded, normalizing front of a [`RemoteExchange`]
#[derive(Clone)]
pub struct DispatchClient {
    exchange: Arc<dyn RemoteExchange>,
    timeout: Duration,
}

impl DispatchClient {
    pub fn new(exchange: Arc<dyn RemoteExchange>, timeout: Duration) -> Self {
        Self { exchange, timeout }
    }

    /// Push a batch and normalize the result
    pub async fn send(&self, batch: &ChangeBatch) -> PushOutcome {
        let stream = batch.stream();
        debug!("Dispatching {} {} changes", batch.len(), stream);

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.exchange.push(batch)).await;
        let outcome = normalize(stream, batch.changes(), result, self.timeout, started.elapsed());

        debug!(
            "Dispatch of {} finished: {:?} in {:?}",
            stream, outcome.status, outcome.runtime
        );
        outcome
    }

    /// Send one session and normalize the result
    pub async fn send_session(&self, change: &Change) -> PushOutcome {
        debug!("Sending session {}", change.key);

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.exchange.send_session(change)).await;
        normalize(
            StreamKind::Session,
            std::slice::from_ref(change),
            result,
            self.timeout,
            started.elapsed(),
        )
    }
}

fn normalize(
    stream: StreamKind,
    changes: &[Change],
    result: Result<Result<PushOutcome, ExchangeError>, tokio::time::error::Elapsed>,
    timeout: Duration,
    runtime: Duration,
) -> PushOutcome {
    let mut outcome = match result {
        Err(_) => {
            warn!("{} dispatch timed out after {:?}", stream, timeout);
            PushOutcome::timeout(Warning::new(
                stream,
                format!("no response within {:?}", timeout),
            ))
        }
        Ok(Err(e)) => {
            warn!("{} dispatch failed: {}", stream, e);
            PushOutcome::failure(Warning::new(stream, e.to_string()))
        }
        Ok(Ok(reported)) => classify(stream, changes, reported),
    };
    outcome.runtime = runtime;
    outcome
}

/// Derive the overall status from per-record detail
fn classify(stream: StreamKind, changes: &[Change], mut reported: PushOutcome) -> PushOutcome {
    match reported.status {
        OutcomeStatus::Failure | OutcomeStatus::Timeout => return reported,
        OutcomeStatus::Success | OutcomeStatus::PartialFailure => {}
    }

    // Unmentioned records are taken on success and not taken on a partial answer
    let implied = if reported.status == OutcomeStatus::Success {
        RecordStatus::Accepted
    } else {
        RecordStatus::Rejected("not acknowledged".to_string())
    };
    for change in changes {
        reported
            .records
            .entry(change.key.clone())
            .or_insert_with(|| implied.clone());
    }

    let rejected = changes
        .iter()
        .filter(|c| !reported.records[&c.key].is_accepted())
        .count();

    for change in changes {
        if let Some(RecordStatus::Rejected(reason)) = reported.records.get(&change.key) {
            reported.warnings.push(Warning::for_record(
                stream,
                change.key.clone(),
                format!("rejected: {}", reason),
            ));
        }
    }

    reported.status = if rejected == 0 {
        OutcomeStatus::Success
    } else if rejected == changes.len() {
        OutcomeStatus::Failure
    } else {
        OutcomeStatus::PartialFailure
    };

    if rejected > 0 {
        warn!(
            "{} dispatch: {} of {} records rejected",
            stream,
            rejected,
            changes.len()
        );
    }
    reported
}
