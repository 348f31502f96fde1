//! Reference WebSocket exchange
//!
//! - `frame`: JSON-RPC framing (CALL, CALLRESULT, CALLERROR) and payloads
//! - `client`: WebSocket client implementing `RemoteExchange`

pub mod frame;
pub mod client;

pub use frame::{Action, Call, CallError, CallResult, Frame, PushRequest, PushResult, WireError};
pub use client::{build_exchange_url, WsConnection, WsExchange, WsExchangeConfig};
