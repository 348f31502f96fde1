//! Change batches
//!
//! A batch is the ordered set of change operations pushed for one stream in
//! one tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::model::{Record, RecordKey, StreamKind};

/// Kind of change operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Insert,
    Update,
    Delete,
    /// Replace the remote's entire known set
    FullRefresh,
}

/// One change operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Local identity; outcomes are reported against it
    pub key: RecordKey,
    pub action: ActionKind,
    /// For deletes, the last settled value
    pub record: Record,
}

impl Change {
    pub fn new(action: ActionKind, record: Record) -> Self {
        Self {
            key: record.key(),
            action,
            record,
        }
    }
}

/// Ordered changes for exactly one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    stream: StreamKind,
    /// Replaces the remote set; holds even when no record survives
    #[serde(default)]
    full_refresh: bool,
    changes: Vec<Change>,
}

impl ChangeBatch {
    /// Build a batch, checking stream membership and the full refresh rule
    pub fn new(stream: StreamKind, changes: Vec<Change>) -> Result<Self, BatchError> {
        for change in &changes {
            let found = change.record.stream();
            if found != stream {
                return Err(BatchError::WrongStream {
                    key: change.key.clone(),
                    expected: stream,
                    found,
                });
            }
        }

        let refreshes = changes
            .iter()
            .filter(|c| c.action == ActionKind::FullRefresh)
            .count();
        if refreshes > 0 && refreshes != changes.len() {
            return Err(BatchError::MixedFullRefresh);
        }

        Ok(Self {
            stream,
            full_refresh: refreshes > 0,
            changes,
        })
    }

    pub fn empty(stream: StreamKind) -> Self {
        Self {
            stream,
            full_refresh: false,
            changes: Vec::new(),
        }
    }

    /// Full refresh of the given records
    pub fn full_refresh(stream: StreamKind, records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            stream,
            full_refresh: true,
            changes: records
                .into_iter()
                .map(|r| Change::new(ActionKind::FullRefresh, r))
                .collect(),
        }
    }

    /// Changes already known to be valid for the stream
    pub(crate) fn from_ordered(stream: StreamKind, changes: Vec<Change>) -> Self {
        let full_refresh = changes
            .first()
            .map(|c| c.action == ActionKind::FullRefresh)
            .unwrap_or(false);
        Self {
            stream,
            full_refresh,
            changes,
        }
    }

    /// Same stream and kind as `self`, with a subset of its changes
    pub(crate) fn derive(&self, changes: Vec<Change>) -> Self {
        Self {
            stream: self.stream,
            full_refresh: self.full_refresh,
            changes,
        }
    }

    /// Merge extra deletes into an incremental batch, keeping the order
    /// deletes, updates, inserts with keys ascending per group
    pub(crate) fn with_deletes(self, extra: Vec<Change>) -> Self {
        if extra.is_empty() || self.full_refresh {
            return self;
        }
        let (mut deletes, rest): (Vec<Change>, Vec<Change>) = self
            .changes
            .into_iter()
            .partition(|c| c.action == ActionKind::Delete);
        deletes.extend(extra);
        deletes.sort_by(|a, b| a.key.cmp(&b.key));
        deletes.extend(rest);
        Self {
            stream: self.stream,
            full_refresh: false,
            changes: deletes,
        }
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn is_full_refresh(&self) -> bool {
        self.full_refresh
    }

    /// Number of changes per action kind
    pub fn count(&self, action: ActionKind) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// Apply the batch to a keyed record set
    pub fn apply_to(&self, state: &mut BTreeMap<RecordKey, Record>) {
        if self.is_full_refresh() {
            state.clear();
        }
        for change in &self.changes {
            apply_change(state, change);
        }
    }
}

/// Apply a single change to a keyed record set
pub(crate) fn apply_change(state: &mut BTreeMap<RecordKey, Record>, change: &Change) {
    match change.action {
        ActionKind::Delete => {
            state.remove(&change.key);
        }
        ActionKind::Insert | ActionKind::Update | ActionKind::FullRefresh => {
            state.insert(change.key.clone(), change.record.clone());
        }
    }
}
