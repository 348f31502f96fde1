//! Push scheduler
//!
//! One timer task per enabled stream. Every timer tick spawns one sync tick
//! on the stream's `JoinSet`, unless the previous tick is still running, in
//! which case the cycle is skipped and reported.
//!
//! ```text
//!            ┌──────────── tick ────────────┐
//!            │                              ▼
//!   Idle ─► Computing ─► Filtering ─► Dispatching ─► Reconciling ─► Idle
//!                            │
//!                            └─ empty / suppressed ─► Idle
//!
//!   Disabled  (policy flag at startup, never ticks)
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::FilterError;
use crate::model::StreamKind;

use super::engine::SyncEngine;
use super::outcome::{PushOutcome, Warning};
use super::snapshot::Reconciliation;

/// Lifecycle state of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Computing,
    Filtering,
    Dispatching,
    Reconciling,
    Disabled,
}

impl StreamState {
    /// Whether a tick is in flight
    pub fn is_busy(self) -> bool {
        !matches!(self, StreamState::Idle | StreamState::Disabled)
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// Stream or capability switched off by policy
    Disabled,
    /// The adapter was shut down; no new tick starts
    Stopped,
    /// Previous tick still in flight; nothing was done
    Skipped { warning: Warning },
    /// Nothing left to send after filtering
    Elided {
        warnings: Vec<Warning>,
        /// Records newly excluded by policy
        suppressed: usize,
    },
    /// A stage reported a misconfiguration; nothing was sent
    Suppressed {
        error: FilterError,
        warnings: Vec<Warning>,
    },
    /// A batch was dispatched
    Pushed {
        outcome: PushOutcome,
        /// Filter warnings; outcome warnings live in `outcome`
        warnings: Vec<Warning>,
        reconciliation: Reconciliation,
    },
}

impl TickReport {
    pub fn outcome(&self) -> Option<&PushOutcome> {
        match self {
            TickReport::Pushed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TickReport::Skipped { .. })
    }

    /// Every warning raised during the tick
    pub fn warnings(&self) -> Vec<&Warning> {
        match self {
            TickReport::Disabled | TickReport::Stopped => Vec::new(),
            TickReport::Skipped { warning } => vec![warning],
            TickReport::Elided { warnings, .. } | TickReport::Suppressed { warnings, .. } => {
                warnings.iter().collect()
            }
            TickReport::Pushed {
                outcome, warnings, ..
            } => warnings.iter().chain(outcome.warnings.iter()).collect(),
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickReport::Disabled => write!(f, "disabled"),
            TickReport::Stopped => write!(f, "stopped"),
            TickReport::Skipped { .. } => write!(f, "skipped"),
            TickReport::Elided { suppressed, .. } => {
                write!(f, "elided ({} suppressed)", suppressed)
            }
            TickReport::Suppressed { error, .. } => write!(f, "suppressed: {}", error),
            TickReport::Pushed {
                outcome,
                reconciliation,
                ..
            } => write!(
                f,
                "{:?} ({} settled, {} pending)",
                outcome.status, reconciliation.settled, reconciliation.pending
            ),
        }
    }
}

/// Running timers; dropping the handle also stops them
pub struct SchedulerHandle {
    engine: Arc<SyncEngine>,
    shutdown_tx: watch::Sender<bool>,
    timers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Start one timer per enabled stream
    pub(crate) fn start(engine: Arc<SyncEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let timers = StreamKind::ALL
            .into_iter()
            .filter(|stream| !engine.policy().is_disabled(*stream))
            .map(|stream| tokio::spawn(run_timer(engine.clone(), stream, shutdown_rx.clone())))
            .collect();

        Self {
            engine,
            shutdown_tx,
            timers,
        }
    }

    /// Number of running stream timers
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Stop all timers and wait for in-flight ticks to finish
    ///
    /// Final: afterwards no tick starts on any stream, manual ones included.
    pub async fn shutdown(self) {
        info!("Stopping push scheduler");
        self.engine.close();
        let _ = self.shutdown_tx.send(true);
        for timer in self.timers {
            if let Err(e) = timer.await {
                error!("Stream timer failed: {}", e);
            }
        }
        info!("Push scheduler stopped");
    }
}

async fn run_timer(engine: Arc<SyncEngine>, stream: StreamKind, mut shutdown: watch::Receiver<bool>) {
    let period = engine.policy().intervals.get(stream);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks = JoinSet::new();
    debug!("{} timer started, period {:?}", stream, period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if engine.state(stream).is_busy() {
                    engine.report_skipped(stream);
                    continue;
                }
                let engine = engine.clone();
                ticks.spawn(async move { engine.tick(stream).await });
            }
            Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                if let Err(e) = joined {
                    error!("{} tick aborted: {}", stream, e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    while let Some(joined) = ticks.join_next().await {
        if let Err(e) = joined {
            error!("{} tick aborted: {}", stream, e);
        }
    }
    debug!("{} timer stopped", stream);
}
