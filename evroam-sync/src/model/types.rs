//! Charging infrastructure records
//!
//! The three record kinds the adapter synchronizes:
//! - `FacilityRecord`: static data of a charging location and its connectors
//! - `StatusRecord`: live availability of one connector
//! - `SessionRecord`: a concluded charging session (billing record)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identities
// ============================================================================

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

identity!(
    /// Charging location identity
    FacilityId
);
identity!(
    /// Connector (EVSE) identity
    ConnectorId
);
identity!(
    /// Charging session identity
    SessionId
);
identity!(
    /// Charge point operator identity
    OperatorId
);
identity!(
    /// Stable local identity of a record within its stream
    RecordKey
);

// ============================================================================
// Enumerations
// ============================================================================

/// Connector availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Occupied,
    Reserved,
    Unavailable,
    Faulted,
    Unknown,
}

/// Plug type of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlugType {
    Type2,
    Ccs2,
    Chademo,
    Type1,
    Ccs1,
    Domestic,
}

// ============================================================================
// Complex Types
// ============================================================================

/// WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Connector descriptor within a facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    pub id: ConnectorId,
    pub plug: PlugType,
    pub max_power_kw: f64,
}

/// Static facility data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityRecord {
    pub id: FacilityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<OperatorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    pub name: String,
    pub address: String,
    pub location: GeoCoordinates,
    pub connectors: Vec<ConnectorDescriptor>,
}

impl FacilityRecord {
    /// Whether the facility carries the given connector
    pub fn has_connector(&self, connector_id: &ConnectorId) -> bool {
        self.connectors.iter().any(|c| &c.id == connector_id)
    }
}

/// Live connector status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub connector_id: ConnectorId,
    pub facility_id: FacilityId,
    pub status: ConnectorStatus,
    pub changed_at: DateTime<Utc>,
}

/// Concluded charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub connector_id: ConnectorId,
    pub facility_id: FacilityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<OperatorId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub energy_kwh: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl SessionRecord {
    /// Session duration
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at.signed_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facility_serialization() {
        let facility = FacilityRecord {
            id: "F1".into(),
            operator_id: None,
            operator_name: None,
            name: "Depot North".to_string(),
            address: "Bulevar 1, Novi Sad".to_string(),
            location: GeoCoordinates {
                latitude: 45.25,
                longitude: 19.84,
            },
            connectors: vec![ConnectorDescriptor {
                id: "F1*1".into(),
                plug: PlugType::Ccs2,
                max_power_kw: 150.0,
            }],
        };

        let json = serde_json::to_value(&facility).unwrap();
        assert_eq!(json["id"], "F1");
        assert_eq!(json["connectors"][0]["maxPowerKw"], 150.0);
        assert!(json.get("operatorId").is_none());

        let back: FacilityRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, facility);
        assert!(back.has_connector(&"F1*1".into()));
        assert!(!back.has_connector(&"F1*2".into()));
    }

    #[test]
    fn test_session_duration() {
        let started_at = Utc::now();
        let session = SessionRecord {
            id: "S1".into(),
            connector_id: "F1*1".into(),
            facility_id: "F1".into(),
            operator_id: None,
            started_at,
            ended_at: started_at + chrono::Duration::minutes(45),
            energy_kwh: 31.2,
            cost: Some(12.5),
            currency: Some("EUR".to_string()),
        };

        assert_eq!(session.duration().num_minutes(), 45);
    }
}
