//! Synchronization policy
//!
//! The policy bundles schedule settings with the capability hooks that shape
//! what leaves the adapter. Hooks are plain shared closures; the filter chain
//! turns each configured hook into one stage.

use std::fmt;
use std::sync::Arc;

use crate::config::{DisableFlags, Intervals};
use crate::model::{ConnectorId, FacilityId, OperatorId, Record, StreamKind};

/// Connector-level inclusion rule
pub type ConnectorPredicate = Arc<dyn Fn(&ConnectorId) -> bool + Send + Sync>;

/// Facility-level inclusion rule
pub type FacilityPredicate = Arc<dyn Fn(&FacilityId) -> bool + Send + Sync>;

/// Stream-specific drop rule; `false` drops the record
pub type RecordPredicate = Arc<dyn Fn(StreamKind, &Record) -> bool + Send + Sync>;

/// Per-record override; an `Err` drops the record with the given reason
pub type RecordTransform = Arc<dyn Fn(Record) -> Result<Record, String> + Send + Sync>;

/// Local to remote connector identity; `None` means no remote identity exists
pub type IdentityConverter = Arc<dyn Fn(&ConnectorId) -> Option<ConnectorId> + Send + Sync>;

/// Resolves an operator display name when a record carries none
pub type OperatorNameSelector = Arc<dyn Fn(&OperatorId) -> Option<String> + Send + Sync>;

/// Operator injected into records that carry no operator identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultOperator {
    pub id: OperatorId,
    pub name: String,
}

impl DefaultOperator {
    pub fn new(id: impl Into<OperatorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Immutable policy bundle, fixed at construction
#[derive(Clone, Default)]
pub struct Policy {
    pub intervals: Intervals,
    pub disable: DisableFlags,
    pub include_connector: Option<ConnectorPredicate>,
    pub include_facility: Option<FacilityPredicate>,
    pub record_filter: Option<RecordPredicate>,
    pub record_transform: Option<RecordTransform>,
    pub identity_converter: Option<IdentityConverter>,
    pub operator_name_selector: Option<OperatorNameSelector>,
    pub default_operator: Option<DefaultOperator>,
}

impl Policy {
    /// Whether the periodic stream is disabled
    pub fn is_disabled(&self, stream: StreamKind) -> bool {
        match stream {
            StreamKind::Facility => self.disable.facility,
            StreamKind::Status => self.disable.status,
            StreamKind::Session => self.disable.session,
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("intervals", &self.intervals)
            .field("disable", &self.disable)
            .field("include_connector", &self.include_connector.is_some())
            .field("include_facility", &self.include_facility.is_some())
            .field("record_filter", &self.record_filter.is_some())
            .field("record_transform", &self.record_transform.is_some())
            .field("identity_converter", &self.identity_converter.is_some())
            .field("operator_name_selector", &self.operator_name_selector.is_some())
            .field("default_operator", &self.default_operator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_streams() {
        let policy = Policy {
            disable: DisableFlags {
                status: true,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(policy.is_disabled(StreamKind::Status));
        assert!(!policy.is_disabled(StreamKind::Facility));
        assert!(!policy.is_disabled(StreamKind::Session));
    }

    #[test]
    fn test_debug_lists_configured_hooks() {
        let policy = Policy {
            include_facility: Some(Arc::new(|id: &FacilityId| id.as_str() != "F9")),
            ..Default::default()
        };

        let text = format!("{:?}", policy);
        assert!(text.contains("include_facility: true"));
        assert!(text.contains("record_transform: false"));
    }
}
