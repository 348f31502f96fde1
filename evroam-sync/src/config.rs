//! Configuration for the roaming adapter
//!
//! Combines the adapter identity with the synchronization policy.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::{ConnectorId, FacilityId, OperatorId, Record, StreamKind};
use crate::policy::{DefaultOperator, Policy};

/// Complete adapter configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    // Adapter identity
    pub id: String,
    pub name: String,
    pub description: Option<String>,

    /// Bound on every remote call
    pub request_timeout: Duration,

    // Synchronization policy
    pub policy: Policy,
}

/// Tick interval per stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Static facility data
    pub facility: Duration,
    /// Live connector status
    pub status: Duration,
    /// Session (billing) records
    pub session: Duration,
}

/// Capabilities switched off at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisableFlags {
    pub facility: bool,
    pub status: bool,
    pub session: bool,
    /// Immediate sending of concluded sessions
    pub session_send: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: None,
            request_timeout: Duration::from_secs(30),
            policy: Policy::default(),
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            facility: Duration::from_secs(300),
            status: Duration::from_secs(10),
            session: Duration::from_secs(60),
        }
    }
}

impl Intervals {
    pub fn get(&self, stream: StreamKind) -> Duration {
        match stream {
            StreamKind::Facility => self.facility,
            StreamKind::Status => self.status,
            StreamKind::Session => self.session,
        }
    }
}

impl AdapterConfig {
    /// Create config with basic parameters
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check the parameters required to start the adapter
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingIdentity);
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        for stream in StreamKind::ALL {
            if self.policy.intervals.get(stream).is_zero() && !self.policy.is_disabled(stream) {
                return Err(ConfigError::ZeroInterval { stream });
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set tick interval of one stream
    pub fn with_interval(mut self, stream: StreamKind, interval: Duration) -> Self {
        match stream {
            StreamKind::Facility => self.policy.intervals.facility = interval,
            StreamKind::Status => self.policy.intervals.status = interval,
            StreamKind::Session => self.policy.intervals.session = interval,
        }
        self
    }

    /// Set all disable flags
    pub fn with_disable_flags(mut self, flags: DisableFlags) -> Self {
        self.policy.disable = flags;
        self
    }

    /// Only push connectors matching the predicate
    pub fn with_connector_filter(
        mut self,
        include: impl Fn(&ConnectorId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.policy.include_connector = Some(Arc::new(include));
        self
    }

    /// Only push facilities matching the predicate
    pub fn with_facility_filter(
        mut self,
        include: impl Fn(&FacilityId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.policy.include_facility = Some(Arc::new(include));
        self
    }

    /// Drop records of any stream failing the predicate
    pub fn with_record_filter(
        mut self,
        keep: impl Fn(StreamKind, &Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.policy.record_filter = Some(Arc::new(keep));
        self
    }

    /// Rewrite records before they leave the adapter
    pub fn with_record_transform(
        mut self,
        transform: impl Fn(Record) -> Result<Record, String> + Send + Sync + 'static,
    ) -> Self {
        self.policy.record_transform = Some(Arc::new(transform));
        self
    }

    /// Map local connector identities to remote ones
    pub fn with_identity_converter(
        mut self,
        convert: impl Fn(&ConnectorId) -> Option<ConnectorId> + Send + Sync + 'static,
    ) -> Self {
        self.policy.identity_converter = Some(Arc::new(convert));
        self
    }

    /// Resolve operator display names
    pub fn with_operator_name_selector(
        mut self,
        select: impl Fn(&OperatorId) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.policy.operator_name_selector = Some(Arc::new(select));
        self
    }

    /// Operator injected where records carry none
    pub fn with_default_operator(mut self, id: impl Into<OperatorId>, name: impl Into<String>) -> Self {
        self.policy.default_operator = Some(DefaultOperator::new(id, name));
        self
    }
}
