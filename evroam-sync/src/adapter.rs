//! Roaming adapter
//!
//! The adapter keeps a remote roaming platform in step with the local
//! charging infrastructure.
//!
//! ## Architecture
//!
//! ```text
//! LocalSource (facilities, statuses, sessions)
//!       │ enumerate per tick
//!       ▼
//! ┌───────────────────────────────────────────┐
//! │    Adapter                                │
//! │  ┌───────────┐  ┌───────────┐  ┌────────┐ │
//! │  │ Scheduler │─►│   Delta   │─►│ Filter │ │
//! │  │ per stream│  │ vs snapsh.│  │ chain  │ │
//! │  └───────────┘  └───────────┘  └───┬────┘ │
//! │        ▲                           ▼      │
//! │  ┌───────────┐  ┌───────────┐  ┌────────┐ │
//! │  │ Snapshot  │◄─│ Reconcile │◄─│Dispatch│ │
//! │  └───────────┘  └───────────┘  └───┬────┘ │
//! └────────────────────────────────────┼──────┘
//!                                      │ RemoteExchange
//!                                      ▼
//!                             Roaming platform
//! ```
//!
//! ## Tick Flow
//!
//! 1. Enumerate the stream's current records
//! 2. Diff against the settled snapshot
//! 3. Run the filter chain; retract records the policy newly excludes and
//!    elide empty batches
//! 4. Notify before-request observers and dispatch
//! 5. Fold the outcome into the snapshot and notify after-response observers

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{AdapterConfig, DisableFlags};
use crate::error::ConfigError;
use crate::model::{ConnectorId, FacilityId, LocalSource, OperatorId, Record, SessionRecord, StreamKind};
use crate::sync::{
    FilterChain, FilterStage, NotificationBus, RemoteExchange, RequestEvent, ResponseEvent,
    SchedulerHandle, StreamSnapshot, StreamState, SubscriptionId, SyncEngine, TickReport,
};

/// The main roaming adapter
pub struct Adapter {
    engine: Arc<SyncEngine>,
    description: Option<String>,
    name: String,
}

impl Adapter {
    /// Create an adapter; fails when the configuration is invalid
    pub fn new(
        config: AdapterConfig,
        source: Arc<dyn LocalSource>,
        exchange: Arc<dyn RemoteExchange>,
    ) -> Result<Self, ConfigError> {
        Self::assemble(config, source, exchange, None)
    }

    fn assemble(
        config: AdapterConfig,
        source: Arc<dyn LocalSource>,
        exchange: Arc<dyn RemoteExchange>,
        filter: Option<FilterChain>,
    ) -> Result<Self, ConfigError> {
        let name = config.name.clone();
        let description = config.description.clone();
        let engine = SyncEngine::with_filter(config, source, exchange, filter)?;

        Ok(Self {
            engine: Arc::new(engine),
            description,
            name,
        })
    }

    pub fn id(&self) -> &str {
        self.engine.adapter_id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Start the per-stream timers
    pub fn start(&self) -> SchedulerHandle {
        let enabled: Vec<String> = StreamKind::ALL
            .into_iter()
            .filter(|s| !self.engine.policy().is_disabled(*s))
            .map(|s| format!("{}={:?}", s, self.engine.policy().intervals.get(s)))
            .collect();
        info!(
            "Starting roaming adapter: id={}, name={}, streams=[{}]",
            self.id(),
            self.name,
            enabled.join(", ")
        );
        SchedulerHandle::start(self.engine.clone())
    }

    /// Run one tick of a stream now, under the same single-flight rule
    pub async fn push_now(&self, stream: StreamKind) -> TickReport {
        self.engine.tick(stream).await
    }

    /// Make the next tick of a stream a full refresh
    pub fn force_full_refresh(&self, stream: StreamKind) {
        info!("Forcing full refresh of {}", stream);
        self.engine.snapshots().reset(stream);
    }

    /// Send a just-concluded session without waiting for the session tick
    pub async fn send_session(&self, session: SessionRecord) -> TickReport {
        self.engine.send_session(session).await
    }

    pub fn stream_state(&self, stream: StreamKind) -> StreamState {
        self.engine.state(stream)
    }

    /// Copy of the settled state of a stream
    pub fn snapshot(&self, stream: StreamKind) -> StreamSnapshot {
        self.engine.snapshots().get(stream)
    }

    pub fn subscribe_before(
        &self,
        observer: impl Fn(&RequestEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus().subscribe_before(observer)
    }

    pub fn subscribe_after(
        &self,
        observer: impl Fn(&ResponseEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus().subscribe_after(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus().unsubscribe(id)
    }

    fn bus(&self) -> &NotificationBus {
        self.engine.bus()
    }
}

/// Builder for creating adapters
pub struct AdapterBuilder {
    config: AdapterConfig,
    extra_stages: Vec<Box<dyn FilterStage>>,
}

impl AdapterBuilder {
    /// Create a new adapter builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            config: AdapterConfig::new(id, name),
            extra_stages: Vec::new(),
        }
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config = self.config.with_description(description);
        self
    }

    /// Set tick intervals
    pub fn intervals(mut self, facility: Duration, status: Duration, session: Duration) -> Self {
        self.config = self
            .config
            .with_interval(StreamKind::Facility, facility)
            .with_interval(StreamKind::Status, status)
            .with_interval(StreamKind::Session, session);
        self
    }

    /// Set disable flags
    pub fn disable(mut self, flags: DisableFlags) -> Self {
        self.config = self.config.with_disable_flags(flags);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    pub fn include_connector(
        mut self,
        include: impl Fn(&ConnectorId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_connector_filter(include);
        self
    }

    pub fn include_facility(
        mut self,
        include: impl Fn(&FacilityId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_facility_filter(include);
        self
    }

    pub fn record_filter(
        mut self,
        keep: impl Fn(StreamKind, &Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_record_filter(keep);
        self
    }

    pub fn record_transform(
        mut self,
        transform: impl Fn(Record) -> Result<Record, String> + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_record_transform(transform);
        self
    }

    pub fn identity_converter(
        mut self,
        convert: impl Fn(&ConnectorId) -> Option<ConnectorId> + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_identity_converter(convert);
        self
    }

    pub fn operator_name_selector(
        mut self,
        select: impl Fn(&OperatorId) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.config = self.config.with_operator_name_selector(select);
        self
    }

    pub fn default_operator(mut self, id: impl Into<OperatorId>, name: impl Into<String>) -> Self {
        self.config = self.config.with_default_operator(id, name);
        self
    }

    /// Append a custom stage after the built-in ones
    pub fn stage(mut self, stage: impl FilterStage + 'static) -> Self {
        self.extra_stages.push(Box::new(stage));
        self
    }

    /// Build the adapter
    pub fn build(
        self,
        source: Arc<dyn LocalSource>,
        exchange: Arc<dyn RemoteExchange>,
    ) -> Result<Adapter, ConfigError> {
        let filter = if self.extra_stages.is_empty() {
            None
        } else {
            let mut chain = FilterChain::from_policy(&self.config.policy);
            for stage in self.extra_stages {
                chain.push_boxed(stage);
            }
            Some(chain)
        };
        Adapter::assemble(self.config, source, exchange, filter)
    }
}

impl From<AdapterConfig> for AdapterBuilder {
    fn from(config: AdapterConfig) -> Self {
        Self {
            config,
            extra_stages: Vec::new(),
        }
    }
}
