//! # EV Roaming Sync
//!
//! Keeps a remote e-mobility roaming platform in step with local charging
//! infrastructure.
//!
//! Three independently scheduled streams are synchronized: static facility
//! data, live connector status, and concluded charging sessions. Each tick
//! diffs the current local state against the last state the remote
//! acknowledged and pushes only the difference.
//!
//! ## Architecture
//!
//! ```text
//! Local infrastructure
//!       │ LocalSource
//!       ▼
//! ┌─────────────────────────────────┐
//! │    evroam-sync                  │
//! │  ┌───────────┐  ┌────────────┐  │
//! │  │ Delta vs  │─►│ Filter     │  │
//! │  │ snapshot  │  │ chain      │  │
//! │  └───────────┘  └─────┬──────┘  │
//! │        ▲              ▼         │
//! │  ┌───────────┐  ┌────────────┐  │
//! │  │ Reconcile │◄─│ Dispatch   │  │
//! │  └───────────┘  └────────────┘  │
//! └─────────────┬───────────────────┘
//!               │ RemoteExchange (WebSocket JSON-RPC)
//!               ▼
//!       Roaming platform
//! ```
//!
//! ## Streams
//!
//! | Stream   | Default interval | First push  | Later pushes                 |
//! |----------|------------------|-------------|------------------------------|
//! | Facility | 300 s            | FullRefresh | Delete, Update, Insert       |
//! | Status   | 10 s             | FullRefresh | Delete, Update, Insert       |
//! | Session  | 60 s             | Insert      | Insert (append-only)         |
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use evroam_sync::{AdapterBuilder, InMemorySource, WsExchange, WsExchangeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(InMemorySource::new());
//!     let (exchange, connection) =
//!         WsExchange::new(WsExchangeConfig::new("ws://localhost:9210/roaming", "rs-1"));
//!     tokio::spawn(connection.run());
//!
//!     let adapter = AdapterBuilder::new("rs-1", "Roaming North")
//!         .default_operator("RS*EKO", "Elektrokombinacija")
//!         .build(source, Arc::new(exchange))?;
//!
//!     let scheduler = adapter.start();
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

pub mod model;
pub mod sync;
pub mod wire;
pub mod config;
pub mod policy;
pub mod error;
pub mod adapter;

pub use config::{AdapterConfig, DisableFlags, Intervals};
pub use adapter::{Adapter, AdapterBuilder};
pub use error::{BatchError, ConfigError, ExchangeError, FilterError};
pub use policy::{DefaultOperator, Policy};

// Re-export key types
pub use model::{
    ConnectorId, ConnectorStatus, FacilityId, FacilityRecord, InMemorySource, LocalSource,
    OperatorId, Record, RecordKey, SessionId, SessionRecord, StatusRecord, StreamKind,
};
pub use sync::{
    ActionKind, Change, ChangeBatch, FilterStage, FnStage, OutcomeStatus, PushOutcome,
    RemoteExchange, RequestEvent, ResponseEvent, SchedulerHandle, StreamState, TickReport,
    Verdict, Warning,
};
pub use wire::{WsConnection, WsExchange, WsExchangeConfig};
