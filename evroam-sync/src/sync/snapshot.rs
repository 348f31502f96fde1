//! Snapshot store
//!
//! Holds, per stream, the last state acknowledged by the remote side. Each
//! stream has its own lock, so workers of different streams never contend.
//!
//! Records the policy excluded are kept apart from the acknowledged entries:
//! the remote never saw them, but re-proposing an unchanged excluded record
//! every tick would only repeat the same warning.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::model::{Record, RecordKey, StreamKind};

use super::batch::{apply_change, ActionKind, Change, ChangeBatch};
use super::outcome::PushOutcome;

/// Settled state of one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    /// Last acknowledged local value per record
    pub entries: BTreeMap<RecordKey, Record>,
    /// Set once a full refresh has been acknowledged
    pub initialized: bool,
    /// Local values excluded by policy that the remote does not hold
    pub suppressed: BTreeMap<RecordKey, Record>,
}

impl StreamSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether exactly this local value was already excluded by policy
    pub fn is_suppressed(&self, record: &Record) -> bool {
        self.suppressed.get(&record.key()) == Some(record)
    }
}

/// Effect of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Changes now reflected in the snapshot
    pub settled: usize,
    /// Changes left stale for the next tick
    pub pending: usize,
}

/// Per-stream snapshots, exclusively owned by the engine
#[derive(Debug, Default)]
pub struct SnapshotStore {
    streams: [Mutex<StreamSnapshot>; 3],
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a stream's snapshot
    pub fn get(&self, stream: StreamKind) -> StreamSnapshot {
        self.streams[stream.index()].lock().clone()
    }

    pub fn set(&self, stream: StreamKind, snapshot: StreamSnapshot) {
        *self.streams[stream.index()].lock() = snapshot;
    }

    /// Forget that the stream was ever loaded; the next delta is a full refresh
    pub fn reset(&self, stream: StreamKind) {
        self.streams[stream.index()].lock().initialized = false;
    }

    /// Fold a dispatch outcome into the snapshot
    ///
    /// `sent` holds the local values of the batch that reached the remote.
    /// Only acknowledged changes are applied; failures and timeouts leave the
    /// snapshot untouched.
    pub fn reconcile(&self, sent: &ChangeBatch, outcome: &PushOutcome) -> Reconciliation {
        let stream = sent.stream();
        if !outcome.has_acknowledgements() {
            return Reconciliation {
                settled: 0,
                pending: sent.len(),
            };
        }

        let mut snapshot = self.streams[stream.index()].lock();
        let mut result = Reconciliation::default();

        if sent.is_full_refresh() {
            snapshot.entries.clear();
            snapshot.initialized = true;
        }
        for change in sent.changes() {
            if outcome.accepted(&change.key) {
                apply_change(&mut snapshot.entries, change);
                if change.action != ActionKind::Delete {
                    snapshot.suppressed.remove(&change.key);
                }
                result.settled += 1;
            } else {
                result.pending += 1;
            }
        }

        debug!(
            "Reconciled {} snapshot: {} settled, {} pending, {} entries",
            stream,
            result.settled,
            result.pending,
            snapshot.entries.len()
        );

        result
    }

    /// Remember local values the policy excluded
    pub fn suppress(&self, stream: StreamKind, excluded: &[Change]) -> usize {
        let mut snapshot = self.streams[stream.index()].lock();
        for change in excluded {
            snapshot
                .suppressed
                .insert(change.key.clone(), change.record.clone());
        }
        excluded.len()
    }

    /// Forget exclusions of records that no longer exist locally
    pub fn retain_suppressed(&self, stream: StreamKind, live: &BTreeSet<RecordKey>) {
        self.streams[stream.index()]
            .lock()
            .suppressed
            .retain(|key, _| live.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::sync::outcome::{OutcomeStatus, RecordStatus, Warning};
    use chrono::Utc;

    fn status(connector: &str, s: ConnectorStatus) -> Record {
        Record::Status(StatusRecord {
            connector_id: connector.into(),
            facility_id: "F1".into(),
            status: s,
            changed_at: Utc::now(),
        })
    }

    fn partial(accepted: &[&str], rejected: &[&str]) -> PushOutcome {
        let mut outcome = PushOutcome {
            status: OutcomeStatus::PartialFailure,
            ..PushOutcome::success()
        };
        for key in accepted {
            outcome = outcome.record(*key, RecordStatus::Accepted);
        }
        for key in rejected {
            outcome = outcome.record(*key, RecordStatus::Rejected("invalid".into()));
        }
        outcome
    }

    #[test]
    fn test_full_refresh_success_replaces_snapshot() {
        let store = SnapshotStore::new();
        let mut stale = StreamSnapshot::default();
        let old = status("C9", ConnectorStatus::Faulted);
        stale.entries.insert(old.key(), old);
        store.set(StreamKind::Status, stale);

        let batch = ChangeBatch::full_refresh(
            StreamKind::Status,
            vec![
                status("C1", ConnectorStatus::Available),
                status("C2", ConnectorStatus::Occupied),
            ],
        );
        let result = store.reconcile(&batch, &PushOutcome::success());

        assert_eq!(result, Reconciliation { settled: 2, pending: 0 });
        let snapshot = store.get(StreamKind::Status);
        assert!(snapshot.initialized);
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.contains(&"C9".into()));
    }

    #[test]
    fn test_partial_failure_merges_accepted_only() {
        let store = SnapshotStore::new();
        let a_old = status("A", ConnectorStatus::Available);
        let b_old = status("B", ConnectorStatus::Available);
        let mut snapshot = StreamSnapshot {
            initialized: true,
            ..Default::default()
        };
        snapshot.entries.insert(a_old.key(), a_old);
        snapshot.entries.insert(b_old.key(), b_old.clone());
        store.set(StreamKind::Status, snapshot);

        let a_new = status("A", ConnectorStatus::Occupied);
        let b_new = status("B", ConnectorStatus::Faulted);
        let batch = ChangeBatch::new(
            StreamKind::Status,
            vec![
                Change::new(ActionKind::Update, a_new.clone()),
                Change::new(ActionKind::Update, b_new),
            ],
        )
        .unwrap();

        let result = store.reconcile(&batch, &partial(&["A"], &["B"]));
        assert_eq!(result, Reconciliation { settled: 1, pending: 1 });

        let snapshot = store.get(StreamKind::Status);
        assert_eq!(snapshot.entries[&RecordKey::new("A")], a_new);
        assert_eq!(snapshot.entries[&RecordKey::new("B")], b_old);
    }

    #[test]
    fn test_failure_leaves_snapshot_untouched() {
        let store = SnapshotStore::new();
        let batch = ChangeBatch::full_refresh(
            StreamKind::Status,
            vec![status("C1", ConnectorStatus::Available)],
        );

        let outcome = PushOutcome::failure(Warning::new(StreamKind::Status, "503"));
        let result = store.reconcile(&batch, &outcome);

        assert_eq!(result, Reconciliation { settled: 0, pending: 1 });
        assert_eq!(store.get(StreamKind::Status), StreamSnapshot::default());
    }

    #[test]
    fn test_empty_full_refresh_clears_entries() {
        let store = SnapshotStore::new();
        store.reconcile(
            &ChangeBatch::full_refresh(
                StreamKind::Status,
                vec![status("C1", ConnectorStatus::Available)],
            ),
            &PushOutcome::success(),
        );
        store.reset(StreamKind::Status);

        let empty = ChangeBatch::full_refresh(StreamKind::Status, Vec::new());
        store.reconcile(&empty, &PushOutcome::success());

        let snapshot = store.get(StreamKind::Status);
        assert!(snapshot.initialized);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_suppressed_values_stay_out_of_entries() {
        let store = SnapshotStore::new();
        let excluded = status("X1", ConnectorStatus::Unknown);
        store.suppress(
            StreamKind::Status,
            &[Change::new(ActionKind::Insert, excluded.clone())],
        );

        let snapshot = store.get(StreamKind::Status);
        assert!(!snapshot.contains(&"X1".into()));
        assert!(snapshot.is_suppressed(&excluded));
        assert!(!snapshot.is_suppressed(&status("X1", ConnectorStatus::Available)));

        // Acknowledged later with another value: no longer an exclusion
        let sent = ChangeBatch::new(
            StreamKind::Status,
            vec![Change::new(ActionKind::Insert, status("X1", ConnectorStatus::Available))],
        )
        .unwrap();
        store.reconcile(&sent, &PushOutcome::success());
        let snapshot = store.get(StreamKind::Status);
        assert!(snapshot.contains(&"X1".into()));
        assert!(snapshot.suppressed.is_empty());
    }

    #[test]
    fn test_retain_suppressed_forgets_vanished_records() {
        let store = SnapshotStore::new();
        store.suppress(
            StreamKind::Status,
            &[
                Change::new(ActionKind::Insert, status("X1", ConnectorStatus::Unknown)),
                Change::new(ActionKind::Insert, status("X2", ConnectorStatus::Unknown)),
            ],
        );

        let live: BTreeSet<RecordKey> = [RecordKey::new("X2")].into_iter().collect();
        store.retain_suppressed(StreamKind::Status, &live);

        let snapshot = store.get(StreamKind::Status);
        let keys: Vec<&str> = snapshot.suppressed.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["X2"]);
    }

    #[test]
    fn test_reset_clears_initialized_only() {
        let store = SnapshotStore::new();
        let batch = ChangeBatch::full_refresh(
            StreamKind::Status,
            vec![status("C1", ConnectorStatus::Available)],
        );
        store.reconcile(&batch, &PushOutcome::success());

        store.reset(StreamKind::Status);
        let snapshot = store.get(StreamKind::Status);
        assert!(!snapshot.initialized);
        assert_eq!(snapshot.len(), 1);
        // Other streams are unaffected
        assert!(store.get(StreamKind::Facility).is_empty());
    }
}
