//! Roaming platform WebSocket client
//!
//! Reference [`RemoteExchange`] over WebSocket. Handles:
//! - WebSocket connection with the exchange subprotocol
//! - Automatic reconnection with exponential backoff
//! - Request/response correlation
//!
//! [`WsExchange`] is the cheap request side handed to the adapter;
//! [`WsConnection`] owns the socket and must be driven with
//! [`WsConnection::run`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::error::ExchangeError;
use crate::sync::{Change, ChangeBatch, PushOutcome, RemoteExchange};

use super::frame::*;

/// Exchange WebSocket subprotocol
pub const EXCHANGE_SUBPROTOCOL: &str = "evroam.v1";

/// Configuration for the WebSocket exchange
#[derive(Debug, Clone)]
pub struct WsExchangeConfig {
    /// Roaming platform WebSocket URL
    pub url: String,
    /// Adapter identity (used in URL path and payloads)
    pub adapter_id: String,
    /// Reconnect delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
    /// Largest accepted message
    pub max_message_size: usize,
}

impl Default for WsExchangeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9210/roaming".to_string(),
            adapter_id: "evroam-001".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

impl WsExchangeConfig {
    pub fn new(url: impl Into<String>, adapter_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            adapter_id: adapter_id.into(),
            ..Default::default()
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<String, PendingRequest>>>;

/// Pending request awaiting response
struct PendingRequest {
    action: Action,
    response_tx: oneshot::Sender<Result<CallResult, ExchangeError>>,
}

/// Removes the pending entry if the caller gives up first
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    message_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.message_id);
    }
}

/// Request side of the exchange
pub struct WsExchange {
    adapter_id: String,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    outgoing_tx: mpsc::Sender<Call>,
}

/// Socket side of the exchange
pub struct WsConnection {
    config: WsExchangeConfig,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    outgoing_rx: mpsc::Receiver<Call>,
}

/// Why a connection ended
enum Closed {
    /// Every request handle was dropped
    Shutdown,
    /// The remote side went away
    Remote,
}

impl WsExchange {
    /// Create the exchange and its connection driver
    pub fn new(config: WsExchangeConfig) -> (Self, WsConnection) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);

        let exchange = Self {
            adapter_id: config.adapter_id.clone(),
            pending: pending.clone(),
            connected: connected.clone(),
            outgoing_tx,
        };
        let connection = WsConnection {
            config,
            pending,
            connected,
            outgoing_rx,
        };
        (exchange, connection)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a request and wait for its response
    pub async fn request(&self, call: Call) -> Result<CallResult, ExchangeError> {
        if !self.is_connected() {
            return Err(ExchangeError::ConnectionClosed);
        }

        let (response_tx, response_rx) = oneshot::channel();
        let _guard = PendingGuard {
            pending: &self.pending,
            message_id: call.message_id.clone(),
        };
        self.pending.lock().insert(
            call.message_id.clone(),
            PendingRequest {
                action: call.action,
                response_tx,
            },
        );

        self.outgoing_tx
            .send(call)
            .await
            .map_err(|_| ExchangeError::ConnectionClosed)?;

        response_rx
            .await
            .map_err(|_| ExchangeError::ConnectionClosed)?
    }

    async fn call(&self, call: Call) -> Result<PushOutcome, ExchangeError> {
        let stream = call.action.stream();
        let result = self.request(call).await?;
        let payload: PushResult = result.parse_payload()?;
        Ok(payload.into_outcome(stream))
    }
}

#[async_trait]
impl RemoteExchange for WsExchange {
    async fn push(&self, batch: &ChangeBatch) -> Result<PushOutcome, ExchangeError> {
        self.call(Call::push(&self.adapter_id, batch)?).await
    }

    async fn send_session(&self, change: &Change) -> Result<PushOutcome, ExchangeError> {
        self.call(Call::send_session(&self.adapter_id, change)?).await
    }
}

impl WsConnection {
    /// Run the connection loop until every request handle is dropped
    pub async fn run(mut self) -> Result<(), ExchangeError> {
        let mut reconnect_delay = self.config.reconnect_delay;

        loop {
            info!("Connecting to roaming platform: {}", self.config.url);

            let result = self.connect_and_run(&mut reconnect_delay).await;
            self.connected.store(false, Ordering::Release);
            self.fail_pending();

            match result {
                Ok(Closed::Shutdown) => {
                    info!("Exchange connection closed gracefully");
                    break Ok(());
                }
                Ok(Closed::Remote) => warn!("Roaming platform closed the connection"),
                Err(e) => error!("Connection error: {}", e),
            }

            // Exponential backoff
            info!("Reconnecting in {:?}", reconnect_delay);
            tokio::time::sleep(reconnect_delay).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, self.config.max_reconnect_delay);
        }
    }

    /// Connect and run until disconnection
    async fn connect_and_run(&mut self, reconnect_delay: &mut Duration) -> Result<Closed, ExchangeError> {
        let url = build_exchange_url(&self.config.url, &self.config.adapter_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(EXCHANGE_SUBPROTOCOL),
        );

        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            ..Default::default()
        };

        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if accepted_protocol != Some(EXCHANGE_SUBPROTOCOL) {
            warn!(
                "Roaming platform did not accept {} subprotocol, got: {:?}",
                EXCHANGE_SUBPROTOCOL, accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);
        self.connected.store(true, Ordering::Release);
        *reconnect_delay = self.config.reconnect_delay;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let outgoing_rx = &mut self.outgoing_rx;
        let pending = &self.pending;

        loop {
            tokio::select! {
                outgoing = outgoing_rx.recv() => {
                    let call = match outgoing {
                        Some(call) => call,
                        None => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            return Ok(Closed::Shutdown);
                        }
                    };
                    let bytes = match call.to_bytes() {
                        Ok(b) => b,
                        Err(e) => {
                            error!("Failed to serialize {}: {}", call.action, e);
                            resolve(pending, &call.message_id, Err(e.into()));
                            continue;
                        }
                    };

                    debug!("Sending {} ({} bytes)", call.action, bytes.len());
                    ws_tx
                        .send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into()))
                        .await
                        .map_err(|e| ExchangeError::Transport(e.to_string()))?;
                }

                incoming = ws_rx.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            debug!("Received: {}", text);
                            if let Some(reply) = handle_frame(pending, text.as_bytes()) {
                                let bytes = reply.to_bytes()?;
                                ws_tx
                                    .send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into()))
                                    .await
                                    .map_err(|e| ExchangeError::Transport(e.to_string()))?;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(Closed::Remote),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(ExchangeError::Transport(e.to_string())),
                    }
                }
            }
        }
    }

    fn fail_pending(&self) {
        for (_, req) in self.pending.lock().drain() {
            let _ = req.response_tx.send(Err(ExchangeError::ConnectionClosed));
        }
    }
}

/// Route a received frame; returns a reply to send back, if any
fn handle_frame(pending: &PendingMap, bytes: &[u8]) -> Option<CallError> {
    match Frame::parse(bytes) {
        Ok(Frame::CallResult(result)) => {
            let id = result.message_id.clone();
            resolve(pending, &id, Ok(result));
            None
        }
        Ok(Frame::CallError(error)) => {
            let id = error.message_id.clone();
            resolve(pending, &id, Err(error.into()));
            None
        }
        Ok(Frame::Call(call)) => {
            // The platform never calls adapters; answer so it does not wait
            warn!("Unexpected {} request from roaming platform", call.action);
            Some(CallError::new(
                call.message_id,
                "NotSupported",
                "adapter accepts no requests",
            ))
        }
        Err(e) => {
            warn!("Failed to parse exchange message: {}", e);
            None
        }
    }
}

fn resolve(pending: &PendingMap, message_id: &str, result: Result<CallResult, ExchangeError>) {
    let request = pending.lock().remove(message_id);
    match request {
        Some(req) => {
            debug!("Response for {} {}", req.action, message_id);
            let _ = req.response_tx.send(result);
        }
        None => debug!("Dropping response for unknown request {}", message_id),
    }
}

/// Build the full exchange WebSocket URL
pub fn build_exchange_url(base_url: &str, adapter_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), adapter_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::sync::{ActionKind, OutcomeStatus};
    use chrono::Utc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn test_build_exchange_url() {
        let url = build_exchange_url("ws://localhost:9210/roaming", "rs-1");
        assert_eq!(url, "ws://localhost:9210/roaming/rs-1");

        let url = build_exchange_url("ws://localhost:9210/roaming/", "rs-1");
        assert_eq!(url, "ws://localhost:9210/roaming/rs-1");
    }

    #[tokio::test]
    async fn test_request_fails_fast_when_disconnected() {
        let (exchange, _connection) = WsExchange::new(WsExchangeConfig::default());
        let batch = ChangeBatch::empty(StreamKind::Status);

        let err = exchange.push(&batch).await.unwrap_err();
        assert!(matches!(err, ExchangeError::ConnectionClosed));
    }

    /// Accept one connection and answer every call with `reply`
    async fn serve_once(listener: TcpListener, reply: fn(&Call) -> Frame) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, |_req: &Request, mut resp: Response| {
            resp.headers_mut().insert(
                header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_static(EXCHANGE_SUBPROTOCOL),
            );
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if let Ok(Frame::Call(call)) = Frame::parse(text.as_bytes()) {
                    let bytes = reply(&call).to_bytes().unwrap();
                    let text = String::from_utf8(bytes).unwrap();
                    ws.send(Message::Text(text.into())).await.unwrap();
                }
            }
        }
    }

    async fn connected_exchange(reply: fn(&Call) -> Frame) -> WsExchange {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_once(listener, reply));

        let config = WsExchangeConfig::new(format!("ws://{}/roaming", addr), "rs-1");
        let (exchange, connection) = WsExchange::new(config);
        tokio::spawn(connection.run());

        for _ in 0..100 {
            if exchange.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(exchange.is_connected());
        exchange
    }

    fn status_batch() -> ChangeBatch {
        ChangeBatch::new(
            StreamKind::Status,
            vec![
                Change::new(
                    ActionKind::Update,
                    Record::Status(StatusRecord {
                        connector_id: "F1*1".into(),
                        facility_id: "F1".into(),
                        status: ConnectorStatus::Occupied,
                        changed_at: Utc::now(),
                    }),
                ),
                Change::new(
                    ActionKind::Update,
                    Record::Status(StatusRecord {
                        connector_id: "F1*2".into(),
                        facility_id: "F1".into(),
                        status: ConnectorStatus::Faulted,
                        changed_at: Utc::now(),
                    }),
                ),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_push_round_trip() {
        let exchange = connected_exchange(|call| {
            assert_eq!(call.action, Action::PushStatus);
            let result = PushResult {
                status: ResultStatus::PartiallyAccepted,
                records: [
                    (RecordKey::new("F1*1"), RecordResult { accepted: true, reason: None }),
                    (
                        RecordKey::new("F1*2"),
                        RecordResult {
                            accepted: false,
                            reason: Some("unknown EVSE".into()),
                        },
                    ),
                ]
                .into_iter()
                .collect(),
                warnings: vec![],
            };
            Frame::CallResult(CallResult::new(call.message_id.clone(), result).unwrap())
        })
        .await;

        let outcome = exchange.push(&status_batch()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::PartialFailure);
        assert!(outcome.accepted(&"F1*1".into()));
        assert!(!outcome.accepted(&"F1*2".into()));
    }

    #[tokio::test]
    async fn test_call_error_becomes_remote_error() {
        let exchange = connected_exchange(|call| {
            Frame::CallError(CallError::new(
                call.message_id.clone(),
                "InternalError",
                "registry unavailable",
            ))
        })
        .await;

        let err = exchange.push(&status_batch()).await.unwrap_err();
        match err {
            ExchangeError::Remote { code, description } => {
                assert_eq!(code, "InternalError");
                assert_eq!(description, "registry unavailable");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
