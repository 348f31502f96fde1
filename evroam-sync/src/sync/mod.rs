//! Synchronization engine
//!
//! - `batch`: change operations and per-stream batches
//! - `delta`: snapshot diffing
//! - `filter`: policy stages between delta and dispatch
//! - `dispatch`: remote exchange trait and outcome normalization
//! - `outcome`: normalized push results and warnings
//! - `snapshot`: last settled state per stream
//! - `notify`: before-request and after-response observers
//! - `engine`: one tick of one stream
//! - `scheduler`: per-stream timers and lifecycle states

pub mod batch;
pub mod delta;
pub mod dispatch;
pub mod engine;
pub mod filter;
pub mod notify;
pub mod outcome;
pub mod scheduler;
pub mod snapshot;

pub use batch::{ActionKind, Change, ChangeBatch};
pub use delta::compute_delta;
pub use dispatch::{DispatchClient, RemoteExchange};
pub use engine::SyncEngine;
pub use filter::{FilterChain, FilterOutput, FilterStage, FnStage, Verdict};
pub use notify::{NotificationBus, RequestEvent, ResponseEvent, SubscriptionId};
pub use outcome::{OutcomeStatus, PushOutcome, RecordStatus, Warning};
pub use scheduler::{SchedulerHandle, StreamState, TickReport};
pub use snapshot::{Reconciliation, SnapshotStore, StreamSnapshot};
