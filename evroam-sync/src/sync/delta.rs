//! Delta computation
//!
//! Compares the current local state of a stream with its last settled
//! snapshot and produces the minimal ordered batch of changes.
//!
//! | Stream            | Not yet initialized | Incremental                    |
//! |-------------------|---------------------|--------------------------------|
//! | Facility, Status  | FullRefresh (all)   | Delete, then Update, then Insert |
//! | Session           | Insert (unsent)     | Insert (unsent)                |
//!
//! Within an action group changes are ordered by key, so the result is a
//! pure function of the two inputs. Records the remote does not hold and
//! whose exact value the policy already excluded are left out.

use std::collections::BTreeMap;

use crate::model::{Record, RecordKey, StreamKind};

use super::batch::{ActionKind, Change, ChangeBatch};
use super::snapshot::StreamSnapshot;

/// Compute the change batch that brings the remote from `snapshot` to `current`
pub fn compute_delta(stream: StreamKind, current: &[Record], snapshot: &StreamSnapshot) -> ChangeBatch {
    let current: BTreeMap<RecordKey, &Record> = current
        .iter()
        .filter(|r| r.stream() == stream)
        .map(|r| (r.key(), r))
        .collect();

    if stream == StreamKind::Session {
        return session_delta(stream, &current, snapshot);
    }

    if !snapshot.initialized {
        return ChangeBatch::full_refresh(
            stream,
            current
                .into_values()
                .filter(|r| !snapshot.is_suppressed(r))
                .cloned(),
        );
    }

    let mut deletes = Vec::new();
    let mut updates = Vec::new();
    let mut inserts = Vec::new();

    for (key, settled) in &snapshot.entries {
        if !current.contains_key(key) {
            deletes.push(Change::new(ActionKind::Delete, settled.clone()));
        }
    }

    for (key, record) in &current {
        match snapshot.entries.get(key) {
            Some(settled) if settled == *record => {}
            Some(_) => updates.push(Change::new(ActionKind::Update, (*record).clone())),
            None if snapshot.is_suppressed(record) => {}
            None => inserts.push(Change::new(ActionKind::Insert, (*record).clone())),
        }
    }

    let mut changes = deletes;
    changes.append(&mut updates);
    changes.append(&mut inserts);

    ChangeBatch::from_ordered(stream, changes)
}

/// Sessions are append-only: anything not yet delivered is an insert
fn session_delta(
    stream: StreamKind,
    current: &BTreeMap<RecordKey, &Record>,
    snapshot: &StreamSnapshot,
) -> ChangeBatch {
    let changes = current
        .iter()
        .filter(|(key, record)| {
            !snapshot.entries.contains_key(*key) && !snapshot.is_suppressed(record)
        })
        .map(|(_, record)| Change::new(ActionKind::Insert, (*record).clone()))
        .collect();

    ChangeBatch::from_ordered(stream, changes)
}
