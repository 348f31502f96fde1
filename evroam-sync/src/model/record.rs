//! Stream-agnostic record wrapper

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::*;

/// The three independently scheduled data streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKind {
    Facility,
    Status,
    Session,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Facility, StreamKind::Status, StreamKind::Session];

    /// Dense index for per-stream arrays
    pub fn index(self) -> usize {
        match self {
            StreamKind::Facility => 0,
            StreamKind::Status => 1,
            StreamKind::Session => 2,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Facility => "facility",
            StreamKind::Status => "status",
            StreamKind::Session => "session",
        };
        f.write_str(name)
    }
}

/// A record of any stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Record {
    Facility(FacilityRecord),
    Status(StatusRecord),
    Session(SessionRecord),
}

impl Record {
    /// Stream this record belongs to
    pub fn stream(&self) -> StreamKind {
        match self {
            Record::Facility(_) => StreamKind::Facility,
            Record::Status(_) => StreamKind::Status,
            Record::Session(_) => StreamKind::Session,
        }
    }

    /// Stable identity within the stream
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Facility(f) => RecordKey::new(f.id.as_str()),
            Record::Status(s) => RecordKey::new(s.connector_id.as_str()),
            Record::Session(s) => RecordKey::new(s.id.as_str()),
        }
    }

    /// Facility the record belongs to
    pub fn facility_id(&self) -> &FacilityId {
        match self {
            Record::Facility(f) => &f.id,
            Record::Status(s) => &s.facility_id,
            Record::Session(s) => &s.facility_id,
        }
    }

    /// Connectors referenced by the record
    pub fn connector_ids(&self) -> Vec<&ConnectorId> {
        match self {
            Record::Facility(f) => f.connectors.iter().map(|c| &c.id).collect(),
            Record::Status(s) => vec![&s.connector_id],
            Record::Session(s) => vec![&s.connector_id],
        }
    }
}

impl From<FacilityRecord> for Record {
    fn from(r: FacilityRecord) -> Self {
        Record::Facility(r)
    }
}

impl From<StatusRecord> for Record {
    fn from(r: StatusRecord) -> Self {
        Record::Status(r)
    }
}

impl From<SessionRecord> for Record {
    fn from(r: SessionRecord) -> Self {
        Record::Session(r)
    }
}
