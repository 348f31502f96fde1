//! Request/response notifications
//!
//! Observers subscribe to a point in the dispatch cycle and get called
//! synchronously with an event describing it. A misbehaving observer is
//! logged and skipped; it never affects the dispatch or other observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::error;
use uuid::Uuid;

use crate::model::StreamKind;

use super::batch::ChangeBatch;
use super::outcome::Warning;
use super::scheduler::TickReport;

/// Emitted right before a batch is dispatched
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request_id: Uuid,
    pub adapter_id: String,
    pub stream: StreamKind,
    pub timestamp: DateTime<Utc>,
    pub batch: Arc<ChangeBatch>,
    /// Warnings raised while filtering the batch
    pub warnings: Vec<Warning>,
}

/// Emitted once per tick, after dispatch or after deciding not to dispatch
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// Matches the preceding request event; `None` when nothing was sent
    pub request_id: Option<Uuid>,
    pub adapter_id: String,
    pub stream: StreamKind,
    pub timestamp: DateTime<Utc>,
    pub report: TickReport,
}

/// Handle returned by a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type RequestObserver = Arc<dyn Fn(&RequestEvent) + Send + Sync>;
type ResponseObserver = Arc<dyn Fn(&ResponseEvent) + Send + Sync>;

/// Observer registry
#[derive(Default)]
pub struct NotificationBus {
    next_id: AtomicU64,
    before: RwLock<Vec<(SubscriptionId, RequestObserver)>>,
    after: RwLock<Vec<(SubscriptionId, ResponseObserver)>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Observe batches about to be dispatched
    pub fn subscribe_before(
        &self,
        observer: impl Fn(&RequestEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.before.write().push((id, Arc::new(observer)));
        id
    }

    /// Observe the result of every tick
    pub fn subscribe_after(
        &self,
        observer: impl Fn(&ResponseEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.after.write().push((id, Arc::new(observer)));
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut before = self.before.write();
        let count = before.len();
        before.retain(|(sid, _)| *sid != id);
        if before.len() != count {
            return true;
        }
        drop(before);

        let mut after = self.after.write();
        let count = after.len();
        after.retain(|(sid, _)| *sid != id);
        after.len() != count
    }

    pub fn observer_count(&self) -> usize {
        self.before.read().len() + self.after.read().len()
    }

    pub fn before_request(&self, event: &RequestEvent) {
        // Observers may subscribe from within a callback
        let observers = self.before.read().clone();
        for (id, observer) in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                error!(
                    "Request observer {:?} panicked on {} request {}",
                    id, event.stream, event.request_id
                );
            }
        }
    }

    pub fn after_response(&self, event: &ResponseEvent) {
        let observers = self.after.read().clone();
        for (id, observer) in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                error!("Response observer {:?} panicked on {} tick", id, event.stream);
            }
        }
    }
}
