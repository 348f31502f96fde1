//! Normalized dispatch results

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{RecordKey, StreamKind};

/// Overall result of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    PartialFailure,
    Failure,
    Timeout,
}

/// Result for a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Accepted,
    Rejected(String),
}

impl RecordStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RecordStatus::Accepted)
    }
}

/// Advisory condition attached to a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stream: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,
    pub message: String,
}

impl Warning {
    pub fn new(stream: StreamKind, message: impl Into<String>) -> Self {
        Self {
            stream,
            key: None,
            message: message.into(),
        }
    }

    pub fn for_record(stream: StreamKind, key: RecordKey, message: impl Into<String>) -> Self {
        Self {
            stream,
            key: Some(key),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "[{}] {}: {}", self.stream, key, self.message),
            None => write!(f, "[{}] {}", self.stream, self.message),
        }
    }
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub status: OutcomeStatus,
    /// Per-record detail; authoritative for partial outcomes
    pub records: BTreeMap<RecordKey, RecordStatus>,
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub runtime: Duration,
}

impl PushOutcome {
    pub fn success() -> Self {
        Self::with_status(OutcomeStatus::Success)
    }

    pub fn failure(warning: Warning) -> Self {
        let mut outcome = Self::with_status(OutcomeStatus::Failure);
        outcome.warnings.push(warning);
        outcome
    }

    pub fn timeout(warning: Warning) -> Self {
        let mut outcome = Self::with_status(OutcomeStatus::Timeout);
        outcome.warnings.push(warning);
        outcome
    }

    fn with_status(status: OutcomeStatus) -> Self {
        Self {
            status,
            records: BTreeMap::new(),
            warnings: Vec::new(),
            runtime: Duration::ZERO,
        }
    }

    /// Builder-style per-record detail
    pub fn record(mut self, key: impl Into<RecordKey>, status: RecordStatus) -> Self {
        self.records.insert(key.into(), status);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Whether the remote may have taken any of the batch
    pub fn has_acknowledgements(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success | OutcomeStatus::PartialFailure)
    }

    /// Whether the given record was acknowledged
    pub fn accepted(&self, key: &RecordKey) -> bool {
        match self.status {
            OutcomeStatus::Success => self
                .records
                .get(key)
                .map(RecordStatus::is_accepted)
                .unwrap_or(true),
            OutcomeStatus::PartialFailure => self
                .records
                .get(key)
                .map(RecordStatus::is_accepted)
                .unwrap_or(false),
            OutcomeStatus::Failure | OutcomeStatus::Timeout => false,
        }
    }

    pub fn rejected_count(&self) -> usize {
        self.records.values().filter(|s| !s.is_accepted()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_by_status() {
        let partial = PushOutcome {
            status: OutcomeStatus::PartialFailure,
            ..PushOutcome::success()
        }
        .record("A", RecordStatus::Accepted)
        .record("B", RecordStatus::Rejected("unknown operator".into()));

        assert!(partial.accepted(&"A".into()));
        assert!(!partial.accepted(&"B".into()));
        // Missing from a partial map means not acknowledged
        assert!(!partial.accepted(&"C".into()));
        assert_eq!(partial.rejected_count(), 1);

        let success = PushOutcome::success();
        assert!(success.accepted(&"C".into()));

        let timeout = PushOutcome::timeout(Warning::new(StreamKind::Status, "timed out"));
        assert!(!timeout.accepted(&"A".into()));
        assert!(!timeout.has_acknowledgements());
    }

    #[test]
    fn test_warning_display() {
        let w = Warning::for_record(StreamKind::Facility, "F1".into(), "excluded by policy");
        assert_eq!(w.to_string(), "[facility] F1: excluded by policy");
    }
}
