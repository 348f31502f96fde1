//! Sync engine
//!
//! Owns everything a tick needs and runs one tick of one stream:
//! enumerate, diff, filter, notify, dispatch, reconcile. The scheduler and
//! the adapter's manual operations both go through here, so the
//! single-flight rule holds for every entry point.
//!
//! Policy outcomes for a change:
//!
//! | Filtered change          | Effect                                        |
//! |--------------------------|-----------------------------------------------|
//! | Insert, FullRefresh      | value remembered as excluded, nothing sent    |
//! | Update                   | remote copy retracted with a Delete           |
//! | Delete                   | left pending, proposed again next tick        |
//! | any, stage failed        | left pending, proposed again next tick        |

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::error::ConfigError;
use crate::model::{LocalSource, Record, RecordKey, SessionRecord, StreamKind};
use crate::policy::Policy;

use super::batch::{ActionKind, Change, ChangeBatch};
use super::delta::compute_delta;
use super::dispatch::{DispatchClient, RemoteExchange};
use super::filter::{FilterChain, FilterOutput};
use super::notify::{NotificationBus, RequestEvent, ResponseEvent};
use super::outcome::Warning;
use super::scheduler::{StreamState, TickReport};
use super::snapshot::SnapshotStore;

/// How a filtered batch reaches the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Periodic,
    ImmediateSession,
}

/// Why a tick could not claim its stream
enum Refusal {
    Busy,
    Closed,
}

/// Shared tick machinery of one adapter
pub struct SyncEngine {
    adapter_id: String,
    policy: Policy,
    source: Arc<dyn LocalSource>,
    dispatch: DispatchClient,
    filter: FilterChain,
    snapshots: SnapshotStore,
    bus: NotificationBus,
    states: [Mutex<StreamState>; 3],
    closed: AtomicBool,
}

impl SyncEngine {
    /// Validate the configuration and assemble the engine
    pub fn new(
        config: AdapterConfig,
        source: Arc<dyn LocalSource>,
        exchange: Arc<dyn RemoteExchange>,
    ) -> Result<Self, ConfigError> {
        Self::with_filter(config, source, exchange, None)
    }

    /// Like [`SyncEngine::new`], with a custom filter chain instead of the
    /// one derived from the policy
    pub fn with_filter(
        config: AdapterConfig,
        source: Arc<dyn LocalSource>,
        exchange: Arc<dyn RemoteExchange>,
        filter: Option<FilterChain>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = config.policy;
        let initial = |stream: StreamKind| {
            Mutex::new(if policy.is_disabled(stream) {
                StreamState::Disabled
            } else {
                StreamState::Idle
            })
        };
        let states = [
            initial(StreamKind::Facility),
            initial(StreamKind::Status),
            initial(StreamKind::Session),
        ];

        Ok(Self {
            adapter_id: config.id,
            filter: filter.unwrap_or_else(|| FilterChain::from_policy(&policy)),
            dispatch: DispatchClient::new(exchange, config.request_timeout),
            snapshots: SnapshotStore::new(),
            bus: NotificationBus::new(),
            states,
            closed: AtomicBool::new(false),
            source,
            policy,
        })
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn state(&self, stream: StreamKind) -> StreamState {
        *self.states[stream.index()].lock()
    }

    /// Refuse every tick from now on; in-flight ticks run to completion
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Adapter {} closed for new ticks", self.adapter_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run one periodic tick of a stream
    pub async fn tick(&self, stream: StreamKind) -> TickReport {
        if self.policy.is_disabled(stream) {
            return self.finish(stream, None, TickReport::Disabled);
        }
        let guard = match self.begin(stream) {
            Ok(guard) => guard,
            Err(refusal) => return self.refuse(stream, refusal),
        };

        let current = self.source.records(stream);
        let live: BTreeSet<RecordKey> = current.iter().map(Record::key).collect();
        self.snapshots.retain_suppressed(stream, &live);

        let snapshot = self.snapshots.get(stream);
        let delta = compute_delta(stream, &current, &snapshot);
        debug!(
            "{} delta: {} changes against {} settled",
            stream,
            delta.len(),
            snapshot.len()
        );

        self.process(&guard, delta, Delivery::Periodic).await
    }

    /// Send one concluded session right away
    pub async fn send_session(&self, session: SessionRecord) -> TickReport {
        let stream = StreamKind::Session;
        if self.policy.disable.session_send {
            return self.finish(stream, None, TickReport::Disabled);
        }
        let guard = match self.begin(stream) {
            Ok(guard) => guard,
            Err(refusal) => return self.refuse(stream, refusal),
        };

        let change = Change::new(ActionKind::Insert, Record::Session(session));
        if self.snapshots.get(stream).contains(&change.key) {
            let warning = Warning::for_record(stream, change.key, "session already delivered");
            return self.finish(
                stream,
                None,
                TickReport::Elided {
                    warnings: vec![warning],
                    suppressed: 0,
                },
            );
        }

        let batch = ChangeBatch::from_ordered(stream, vec![change]);
        self.process(&guard, batch, Delivery::ImmediateSession).await
    }

    /// Report a cycle that found the previous one still running
    pub fn report_skipped(&self, stream: StreamKind) -> TickReport {
        let state = self.state(stream);
        warn!("Skipping {} cycle: previous tick still {:?}", stream, state);
        let warning = Warning::new(
            stream,
            format!("skipped cycle, previous tick still {:?}", state),
        );
        self.finish(stream, None, TickReport::Skipped { warning })
    }

    fn refuse(&self, stream: StreamKind, refusal: Refusal) -> TickReport {
        match refusal {
            Refusal::Busy => self.report_skipped(stream),
            Refusal::Closed => {
                debug!("{} tick refused, adapter closed", stream);
                self.finish(stream, None, TickReport::Stopped)
            }
        }
    }

    async fn process(
        &self,
        guard: &TickGuard<'_>,
        delta: ChangeBatch,
        delivery: Delivery,
    ) -> TickReport {
        let stream = delta.stream();

        guard.advance(StreamState::Filtering);
        let FilterOutput {
            batch,
            source,
            dropped,
            failed,
            mut warnings,
            fatal,
        } = self.filter.apply(&delta);

        if let Some(error) = fatal {
            return self.finish(stream, None, TickReport::Suppressed { error, warnings });
        }
        if !failed.is_empty() {
            debug!("{} {} changes failed filtering, left pending", stream, failed.len());
        }

        // Records the remote holds but the policy now excludes are retracted
        let settled = self.snapshots.get(stream);
        let retractions: Vec<Change> = dropped
            .iter()
            .filter(|c| c.action == ActionKind::Update)
            .filter_map(|c| settled.entries.get(&c.key))
            .map(|held| Change::new(ActionKind::Delete, held.clone()))
            .collect();
        let (batch, source) = if retractions.is_empty() {
            (batch, source)
        } else {
            let retracted = self
                .filter
                .apply(&ChangeBatch::from_ordered(stream, retractions));
            warnings.extend(retracted.warnings);
            if let Some(error) = retracted.fatal {
                return self.finish(stream, None, TickReport::Suppressed { error, warnings });
            }
            (
                batch.with_deletes(retracted.batch.changes().to_vec()),
                source.with_deletes(retracted.source.changes().to_vec()),
            )
        };

        let excluded: Vec<Change> = dropped
            .into_iter()
            .filter(|c| c.action != ActionKind::Delete)
            .collect();
        let suppressed = self.snapshots.suppress(stream, &excluded);

        // An empty full refresh still clears what the remote holds
        let clears_remote = batch.is_full_refresh() && !settled.is_empty();
        if batch.is_empty() && !clears_remote {
            if !delta.is_empty() {
                debug!("{} batch elided, {} changes excluded by policy", stream, suppressed);
            }
            return self.finish(stream, None, TickReport::Elided { warnings, suppressed });
        }

        guard.advance(StreamState::Dispatching);
        let request_id = Uuid::new_v4();
        let batch = Arc::new(batch);
        self.bus.before_request(&RequestEvent {
            request_id,
            adapter_id: self.adapter_id.clone(),
            stream,
            timestamp: Utc::now(),
            batch: batch.clone(),
            warnings: warnings.clone(),
        });

        info!("Pushing {} {} changes (request {})", batch.len(), stream, request_id);
        let outcome = match delivery {
            Delivery::Periodic => self.dispatch.send(&batch).await,
            Delivery::ImmediateSession => match batch.changes().first() {
                Some(change) => self.dispatch.send_session(change).await,
                None => self.dispatch.send(&batch).await,
            },
        };

        guard.advance(StreamState::Reconciling);
        let reconciliation = self.snapshots.reconcile(&source, &outcome);
        info!(
            "{} request {}: {:?} in {:?}, {} settled, {} pending",
            stream,
            request_id,
            outcome.status,
            outcome.runtime,
            reconciliation.settled,
            reconciliation.pending
        );

        self.finish(
            stream,
            Some(request_id),
            TickReport::Pushed {
                outcome,
                warnings,
                reconciliation,
            },
        )
    }

    fn finish(
        &self,
        stream: StreamKind,
        request_id: Option<Uuid>,
        report: TickReport,
    ) -> TickReport {
        self.bus.after_response(&ResponseEvent {
            request_id,
            adapter_id: self.adapter_id.clone(),
            stream,
            timestamp: Utc::now(),
            report: report.clone(),
        });
        report
    }

    /// Claim the stream for one tick
    fn begin(&self, stream: StreamKind) -> Result<TickGuard<'_>, Refusal> {
        let slot = &self.states[stream.index()];
        let mut state = slot.lock();
        if self.is_closed() {
            return Err(Refusal::Closed);
        }
        if state.is_busy() {
            return Err(Refusal::Busy);
        }
        // Immediate session sends may run on a disabled periodic stream
        let resting = *state;
        *state = StreamState::Computing;
        debug!("{} {:?} -> Computing", stream, resting);
        Ok(TickGuard {
            slot,
            stream,
            resting,
        })
    }
}

/// Stream claim; returns the stream to its resting state when dropped
struct TickGuard<'a> {
    slot: &'a Mutex<StreamState>,
    stream: StreamKind,
    resting: StreamState,
}

impl TickGuard<'_> {
    fn advance(&self, next: StreamState) {
        let mut state = self.slot.lock();
        debug!("{} {:?} -> {:?}", self.stream, *state, next);
        *state = next;
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = self.resting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisableFlags;
    use crate::error::ExchangeError;
    use crate::model::*;
    use crate::sync::outcome::{OutcomeStatus, PushOutcome, RecordStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Answers pushes from a queue, defaulting to success
    #[derive(Default)]
    struct QueueExchange {
        answers: Mutex<VecDeque<Result<PushOutcome, ExchangeError>>>,
        pushed: Mutex<Vec<ChangeBatch>>,
        sessions: Mutex<Vec<Change>>,
    }

    impl QueueExchange {
        fn answer(&self, answer: Result<PushOutcome, ExchangeError>) {
            self.answers.lock().push_back(answer);
        }

        fn next(&self) -> Result<PushOutcome, ExchangeError> {
            self.answers
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(PushOutcome::success()))
        }
    }

    #[async_trait]
    impl RemoteExchange for QueueExchange {
        async fn push(&self, batch: &ChangeBatch) -> Result<PushOutcome, ExchangeError> {
            self.pushed.lock().push(batch.clone());
            self.next()
        }

        async fn send_session(&self, change: &Change) -> Result<PushOutcome, ExchangeError> {
            self.sessions.lock().push(change.clone());
            self.next()
        }
    }

    fn status(connector: &str, facility: &str, s: ConnectorStatus) -> StatusRecord {
        StatusRecord {
            connector_id: connector.into(),
            facility_id: facility.into(),
            status: s,
            changed_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn session(id: &str) -> SessionRecord {
        let ended = chrono::DateTime::from_timestamp(1_700_003_600, 0).unwrap();
        SessionRecord {
            id: id.into(),
            connector_id: "C1".into(),
            facility_id: "F1".into(),
            operator_id: None,
            started_at: ended - chrono::Duration::hours(1),
            ended_at: ended,
            energy_kwh: 22.0,
            cost: Some(9.5),
            currency: Some("EUR".into()),
        }
    }

    fn setup(config: AdapterConfig) -> (SyncEngine, Arc<InMemorySource>, Arc<QueueExchange>) {
        let source = Arc::new(InMemorySource::new());
        let exchange = Arc::new(QueueExchange::default());
        let engine = SyncEngine::new(config, source.clone(), exchange.clone()).unwrap();
        (engine, source, exchange)
    }

    fn config() -> AdapterConfig {
        AdapterConfig::new("rs-1", "Test")
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = SyncEngine::new(
            AdapterConfig::new("", "Test"),
            Arc::new(InMemorySource::new()),
            Arc::new(QueueExchange::default()),
        );
        assert!(matches!(result, Err(ConfigError::MissingIdentity)));
    }

    #[tokio::test]
    async fn test_initial_load_then_noop() {
        let (engine, source, exchange) = setup(config());
        source.upsert_status(status("C1", "F1", ConnectorStatus::Available));
        source.upsert_status(status("C2", "F1", ConnectorStatus::Occupied));

        let report = engine.tick(StreamKind::Status).await;
        assert!(report.outcome().map(|o| o.is_success()).unwrap_or(false));
        assert!(exchange.pushed.lock()[0].is_full_refresh());
        assert_eq!(engine.state(StreamKind::Status), StreamState::Idle);

        let report = engine.tick(StreamKind::Status).await;
        assert!(matches!(report, TickReport::Elided { suppressed: 0, .. }));
        assert_eq!(exchange.pushed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_reproposes_rejected() {
        let (engine, source, exchange) = setup(config());
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));
        source.upsert_status(status("B", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        source.upsert_status(status("A", "F1", ConnectorStatus::Occupied));
        source.upsert_status(status("B", "F1", ConnectorStatus::Faulted));
        exchange.answer(Ok(PushOutcome::success().record("B", RecordStatus::Rejected("bad".into()))));

        let report = engine.tick(StreamKind::Status).await;
        assert_eq!(
            report.outcome().map(|o| o.status),
            Some(OutcomeStatus::PartialFailure)
        );

        engine.tick(StreamKind::Status).await;
        let pushed = exchange.pushed.lock();
        let keys: Vec<&str> = pushed[2].changes().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["B"]);
        assert_eq!(pushed[2].changes()[0].action, ActionKind::Update);
    }

    #[tokio::test]
    async fn test_failure_retries_on_next_tick() {
        let (engine, source, exchange) = setup(config());
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));
        exchange.answer(Err(ExchangeError::ConnectionClosed));

        let report = engine.tick(StreamKind::Status).await;
        assert_eq!(report.outcome().map(|o| o.status), Some(OutcomeStatus::Failure));
        assert!(!engine.snapshots().get(StreamKind::Status).initialized);

        engine.tick(StreamKind::Status).await;
        let pushed = exchange.pushed.lock();
        assert_eq!(pushed.len(), 2);
        assert!(pushed[1].is_full_refresh());
    }

    #[tokio::test]
    async fn test_policy_exclusions_stay_out_of_snapshot() {
        let (engine, source, exchange) = setup(
            config().with_facility_filter(|id: &FacilityId| id.as_str() != "F2"),
        );
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        source.upsert_status(status("X", "F2", ConnectorStatus::Available));
        let report = engine.tick(StreamKind::Status).await;
        assert!(matches!(report, TickReport::Elided { suppressed: 1, .. }));
        assert!(!engine.snapshots().get(StreamKind::Status).contains(&"X".into()));

        // Not re-proposed, no new warning
        let report = engine.tick(StreamKind::Status).await;
        assert!(report.warnings().is_empty());
        assert_eq!(exchange.pushed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_excluded_record_is_inserted_once_included() {
        let (engine, source, exchange) = setup(config().with_record_filter(|_, record: &Record| {
            !matches!(record, Record::Status(s) if s.status == ConnectorStatus::Unknown)
        }));
        source.upsert_status(status("C1", "F1", ConnectorStatus::Unknown));
        source.upsert_status(status("C2", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        source.upsert_status(status("C1", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        let pushed = exchange.pushed.lock();
        let actions: Vec<Vec<(ActionKind, &str)>> = pushed
            .iter()
            .map(|b| b.changes().iter().map(|c| (c.action, c.key.as_str())).collect())
            .collect();
        assert_eq!(
            actions,
            vec![
                vec![(ActionKind::FullRefresh, "C2")],
                vec![(ActionKind::Insert, "C1")],
            ]
        );
    }

    #[tokio::test]
    async fn test_newly_excluded_record_is_retracted() {
        let (engine, source, exchange) = setup(config().with_record_filter(|_, record: &Record| {
            !matches!(record, Record::Status(s) if s.status == ConnectorStatus::Unknown)
        }));
        source.upsert_status(status("C1", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        source.upsert_status(status("C1", "F1", ConnectorStatus::Unknown));
        let report = engine.tick(StreamKind::Status).await;
        assert!(report.outcome().map(|o| o.is_success()).unwrap_or(false));

        {
            let pushed = exchange.pushed.lock();
            assert_eq!(pushed.len(), 2);
            let retraction = &pushed[1].changes()[0];
            assert_eq!(retraction.action, ActionKind::Delete);
            // Carries the value the remote holds
            assert_eq!(
                retraction.record,
                Record::Status(status("C1", "F1", ConnectorStatus::Available))
            );
        }
        assert!(engine.snapshots().get(StreamKind::Status).is_empty());

        // Retracted once, then quiet
        let report = engine.tick(StreamKind::Status).await;
        assert!(matches!(report, TickReport::Elided { suppressed: 0, .. }));
        assert_eq!(exchange.pushed.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_of_empty_set_clears_remote() {
        let (engine, source, exchange) = setup(config());
        source.upsert_status(status("C1", "F1", ConnectorStatus::Available));
        engine.tick(StreamKind::Status).await;

        engine.snapshots().reset(StreamKind::Status);
        source.remove_status(&"C1".into());
        let report = engine.tick(StreamKind::Status).await;
        assert!(report.outcome().map(|o| o.is_success()).unwrap_or(false));

        {
            let pushed = exchange.pushed.lock();
            assert!(pushed[1].is_full_refresh());
            assert!(pushed[1].is_empty());
        }
        let snapshot = engine.snapshots().get(StreamKind::Status);
        assert!(snapshot.initialized);
        assert!(snapshot.is_empty());

        let report = engine.tick(StreamKind::Status).await;
        assert!(matches!(report, TickReport::Elided { .. }));
        assert_eq!(exchange.pushed.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_engine_starts_no_tick() {
        let (engine, source, exchange) = setup(config());
        source.upsert_status(status("C1", "F1", ConnectorStatus::Available));
        engine.close();

        assert_eq!(engine.tick(StreamKind::Status).await, TickReport::Stopped);
        assert_eq!(engine.send_session(session("S1")).await, TickReport::Stopped);
        assert!(exchange.pushed.lock().is_empty());
        assert!(exchange.sessions.lock().is_empty());
        assert_eq!(engine.state(StreamKind::Status), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_request_and_response_events_pair_up() {
        let (engine, source, _exchange) = setup(config());
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));

        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(Vec::new()));
        let r = requests.clone();
        engine.bus().subscribe_before(move |e| r.lock().push(e.request_id));
        let r = responses.clone();
        engine.bus().subscribe_after(move |e| r.lock().push(e.request_id));

        engine.tick(StreamKind::Status).await;
        engine.tick(StreamKind::Status).await;

        assert_eq!(requests.lock().len(), 1);
        assert_eq!(*responses.lock(), vec![Some(requests.lock()[0]), None]);
    }

    #[tokio::test]
    async fn test_misconfigured_stage_suppresses_tick() {
        let (engine, source, exchange) = setup(config().with_default_operator("", "Nobody"));
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));

        let report = engine.tick(StreamKind::Status).await;
        assert!(matches!(report, TickReport::Suppressed { .. }));
        assert!(exchange.pushed.lock().is_empty());
        assert_eq!(engine.state(StreamKind::Status), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_send_session_is_not_redelivered() {
        let (engine, source, exchange) = setup(config());
        source.add_session(session("S1"));

        let report = engine.send_session(session("S1")).await;
        assert!(report.outcome().map(|o| o.is_success()).unwrap_or(false));
        assert_eq!(exchange.sessions.lock().len(), 1);

        let report = engine.tick(StreamKind::Session).await;
        assert!(matches!(report, TickReport::Elided { .. }));
        assert!(exchange.pushed.lock().is_empty());

        let report = engine.send_session(session("S1")).await;
        assert!(matches!(report, TickReport::Elided { .. }));
        assert_eq!(exchange.sessions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_send_session_disabled() {
        let (engine, source, exchange) = setup(config().with_disable_flags(DisableFlags {
            session_send: true,
            ..Default::default()
        }));
        source.add_session(session("S1"));

        assert_eq!(engine.send_session(session("S1")).await, TickReport::Disabled);
        assert!(exchange.sessions.lock().is_empty());

        // Still pending for the periodic stream
        engine.tick(StreamKind::Session).await;
        assert_eq!(exchange.pushed.lock()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_send_session_on_disabled_periodic_stream() {
        let (engine, _source, exchange) = setup(config().with_disable_flags(DisableFlags {
            session: true,
            ..Default::default()
        }));

        assert_eq!(engine.tick(StreamKind::Session).await, TickReport::Disabled);
        let report = engine.send_session(session("S1")).await;
        assert!(report.outcome().is_some());
        assert_eq!(exchange.sessions.lock().len(), 1);
        assert_eq!(engine.state(StreamKind::Session), StreamState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tick_is_skipped() {
        struct Stalled;

        #[async_trait]
        impl RemoteExchange for Stalled {
            async fn push(&self, _batch: &ChangeBatch) -> Result<PushOutcome, ExchangeError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(PushOutcome::success())
            }

            async fn send_session(&self, _change: &Change) -> Result<PushOutcome, ExchangeError> {
                Ok(PushOutcome::success())
            }
        }

        let source = Arc::new(InMemorySource::new());
        source.upsert_status(status("A", "F1", ConnectorStatus::Available));
        let engine = Arc::new(SyncEngine::new(config(), source, Arc::new(Stalled)).unwrap());

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.tick(StreamKind::Status).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = engine.tick(StreamKind::Status).await;
        assert!(second.is_skipped());
        // Other streams are unaffected
        assert!(!engine.tick(StreamKind::Facility).await.is_skipped());

        assert!(first.await.unwrap().outcome().is_some());
    }
}
