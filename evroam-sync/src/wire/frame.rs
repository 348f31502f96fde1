//! JSON-RPC message framing
//!
//! The roaming exchange uses JSON arrays over WebSocket:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::model::{RecordKey, StreamKind};
use crate::sync::{Change, ChangeBatch, OutcomeStatus, PushOutcome, RecordStatus, Warning};

/// Message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// Exchange action names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    PushFacilityData,
    PushStatus,
    PushSessions,
    SendSession,
}

impl Action {
    /// Periodic push action of a stream
    pub fn for_stream(stream: StreamKind) -> Self {
        match stream {
            StreamKind::Facility => Action::PushFacilityData,
            StreamKind::Status => Action::PushStatus,
            StreamKind::Session => Action::PushSessions,
        }
    }

    pub fn stream(self) -> StreamKind {
        match self {
            Action::PushFacilityData => StreamKind::Facility,
            Action::PushStatus => StreamKind::Status,
            Action::PushSessions | Action::SendSession => StreamKind::Session,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Action {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PushFacilityData" => Ok(Action::PushFacilityData),
            "PushStatus" => Ok(Action::PushStatus),
            "PushSessions" => Ok(Action::PushSessions),
            "SendSession" => Ok(Action::SendSession),
            _ => Err(WireError::UnknownAction(s.to_string())),
        }
    }
}

/// Errors in message handling
#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),
}

impl From<WireError> for ExchangeError {
    fn from(e: WireError) -> Self {
        ExchangeError::MalformedResponse(e.to_string())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of the periodic push actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub adapter_id: String,
    pub stream: StreamKind,
    /// The remote replaces its whole set for the stream
    pub full_refresh: bool,
    pub changes: Vec<Change>,
}

/// Payload of `SendSession`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub adapter_id: String,
    pub change: Change,
}

/// Overall status reported by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Accepted,
    PartiallyAccepted,
    Rejected,
}

/// Per-record result reported by the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResult {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// CALLRESULT payload of every action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    pub status: ResultStatus,
    #[serde(default)]
    pub records: BTreeMap<RecordKey, RecordResult>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl PushResult {
    /// Translate into the engine's outcome
    pub fn into_outcome(self, stream: StreamKind) -> PushOutcome {
        let status = match self.status {
            ResultStatus::Accepted => OutcomeStatus::Success,
            ResultStatus::PartiallyAccepted => OutcomeStatus::PartialFailure,
            ResultStatus::Rejected => OutcomeStatus::Failure,
        };

        let records = self
            .records
            .into_iter()
            .map(|(key, result)| {
                let status = if result.accepted {
                    RecordStatus::Accepted
                } else {
                    RecordStatus::Rejected(result.reason.unwrap_or_else(|| "rejected".to_string()))
                };
                (key, status)
            })
            .collect();

        PushOutcome {
            status,
            records,
            warnings: self
                .warnings
                .into_iter()
                .map(|message| Warning::new(stream, message))
                .collect(),
            runtime: Default::default(),
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// CALL message (request)
#[derive(Debug, Clone)]
pub struct Call {
    pub message_id: String,
    pub action: Action,
    pub payload: Value,
}

impl Call {
    /// Create a new CALL message with auto-generated ID
    pub fn new(action: Action, payload: impl Serialize) -> Result<Self, WireError> {
        Ok(Self {
            message_id: Uuid::new_v4().to_string(),
            action,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Create the periodic push call of a batch
    pub fn push(adapter_id: &str, batch: &ChangeBatch) -> Result<Self, WireError> {
        Self::new(
            Action::for_stream(batch.stream()),
            PushRequest {
                adapter_id: adapter_id.to_string(),
                stream: batch.stream(),
                full_refresh: batch.is_full_refresh(),
                changes: batch.changes().to_vec(),
            },
        )
    }

    /// Create a SendSession call
    pub fn send_session(adapter_id: &str, change: &Change) -> Result<Self, WireError> {
        Self::new(
            Action::SendSession,
            SessionRequest {
                adapter_id: adapter_id.to_string(),
                change: change.clone(),
            },
        )
    }

    /// Serialize to wire format: [2, messageId, action, payload]
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.message_id,
            self.action.to_string(),
            &self.payload
        ]);
        Ok(serde_json::to_vec(&array)?)
    }
}

/// CALLRESULT message (success response)
#[derive(Debug, Clone)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    pub fn new(message_id: String, payload: impl Serialize) -> Result<Self, WireError> {
        Ok(Self {
            message_id,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to wire format: [3, messageId, payload]
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.message_id,
            &self.payload
        ]);
        Ok(serde_json::to_vec(&array)?)
    }

    /// Parse the payload as a specific response type
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, WireError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// CALLERROR message (error response)
#[derive(Debug, Clone)]
pub struct CallError {
    pub message_id: String,
    pub error_code: String,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    pub fn new(
        message_id: String,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Serialize to wire format: [4, messageId, errorCode, errorDescription, errorDetails]
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.message_id,
            &self.error_code,
            &self.error_description,
            &self.error_details
        ]);
        Ok(serde_json::to_vec(&array)?)
    }
}

impl From<CallError> for ExchangeError {
    fn from(e: CallError) -> Self {
        ExchangeError::Remote {
            code: e.error_code,
            description: e.error_description,
        }
    }
}

/// Parsed message of any type
#[derive(Debug, Clone)]
pub enum Frame {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl Frame {
    /// Parse a message from JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let array: Vec<Value> = serde_json::from_slice(bytes)?;

        let msg_type = array
            .first()
            .and_then(Value::as_i64)
            .ok_or(WireError::InvalidFormat)?;
        let message_id = array
            .get(1)
            .and_then(Value::as_str)
            .ok_or(WireError::InvalidFormat)?
            .to_string();

        match msg_type {
            2 => {
                if array.len() != 4 {
                    return Err(WireError::InvalidFormat);
                }
                let action = array[2].as_str().ok_or(WireError::InvalidFormat)?.parse()?;
                Ok(Frame::Call(Call {
                    message_id,
                    action,
                    payload: array[3].clone(),
                }))
            }
            3 => {
                if array.len() != 3 {
                    return Err(WireError::InvalidFormat);
                }
                Ok(Frame::CallResult(CallResult {
                    message_id,
                    payload: array[2].clone(),
                }))
            }
            4 => {
                if array.len() != 5 {
                    return Err(WireError::InvalidFormat);
                }
                Ok(Frame::CallError(CallError {
                    message_id,
                    error_code: array[2].as_str().unwrap_or("GenericError").to_string(),
                    error_description: array[3].as_str().unwrap_or("").to_string(),
                    error_details: array[4].clone(),
                }))
            }
            _ => Err(WireError::UnknownMessageType(msg_type)),
        }
    }

    /// Serialize to wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        match self {
            Frame::Call(call) => call.to_bytes(),
            Frame::CallResult(result) => result.to_bytes(),
            Frame::CallError(error) => error.to_bytes(),
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Frame::Call(call) => &call.message_id,
            Frame::CallResult(result) => &result.message_id,
            Frame::CallError(error) => &error.message_id,
        }
    }
}
