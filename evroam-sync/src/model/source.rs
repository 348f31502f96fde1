//! Read access to the local domain model
//!
//! The engine only enumerates current values; creating and removing charging
//! infrastructure belongs to whoever owns the source.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::record::{Record, StreamKind};
use super::types::*;

/// Enumerates the current local state, keyed by stable identity
pub trait LocalSource: Send + Sync {
    fn facilities(&self) -> Vec<FacilityRecord>;

    fn statuses(&self) -> Vec<StatusRecord>;

    fn sessions(&self) -> Vec<SessionRecord>;

    /// Current records of one stream
    fn records(&self, stream: StreamKind) -> Vec<Record> {
        match stream {
            StreamKind::Facility => self.facilities().into_iter().map(Record::from).collect(),
            StreamKind::Status => self.statuses().into_iter().map(Record::from).collect(),
            StreamKind::Session => self.sessions().into_iter().map(Record::from).collect(),
        }
    }
}

/// In-memory local state
#[derive(Debug, Default)]
pub struct InMemorySource {
    facilities: RwLock<BTreeMap<FacilityId, FacilityRecord>>,
    statuses: RwLock<BTreeMap<ConnectorId, StatusRecord>>,
    sessions: RwLock<BTreeMap<SessionId, SessionRecord>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_facility(&self, facility: FacilityRecord) {
        self.facilities.write().insert(facility.id.clone(), facility);
    }

    /// Remove a facility together with the statuses of its connectors
    pub fn remove_facility(&self, id: &FacilityId) -> Option<FacilityRecord> {
        let removed = self.facilities.write().remove(id);
        if removed.is_some() {
            self.statuses.write().retain(|_, s| &s.facility_id != id);
        }
        removed
    }

    pub fn upsert_status(&self, status: StatusRecord) {
        self.statuses.write().insert(status.connector_id.clone(), status);
    }

    pub fn remove_status(&self, id: &ConnectorId) -> Option<StatusRecord> {
        self.statuses.write().remove(id)
    }

    /// Record a concluded session
    pub fn add_session(&self, session: SessionRecord) {
        self.sessions.write().insert(session.id.clone(), session);
    }
}

impl LocalSource for InMemorySource {
    fn facilities(&self) -> Vec<FacilityRecord> {
        self.facilities.read().values().cloned().collect()
    }

    fn statuses(&self) -> Vec<StatusRecord> {
        self.statuses.read().values().cloned().collect()
    }

    fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.read().values().cloned().collect()
    }
}
