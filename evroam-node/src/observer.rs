//! Logging observer for request and response events

use evroam_sync::sync::SubscriptionId;
use evroam_sync::{ActionKind, Adapter, RequestEvent, ResponseEvent, TickReport};
use tracing::{info, warn};

/// Log every outgoing batch and every tick report of the adapter
pub fn register(adapter: &Adapter) -> (SubscriptionId, SubscriptionId) {
    let before = adapter.subscribe_before(|event| info!("{}", describe_request(event)));
    let after = adapter.subscribe_after(|event| {
        let line = describe_response(event);
        match event.report {
            TickReport::Suppressed { .. } | TickReport::Skipped { .. } => warn!("{}", line),
            _ => info!("{}", line),
        }
        for warning in event.report.warnings() {
            warn!("  {}", warning);
        }
    });
    (before, after)
}

/// One-line summary of an outgoing batch
pub fn describe_request(event: &RequestEvent) -> String {
    let batch = &event.batch;
    let counts = if batch.is_full_refresh() {
        format!("full refresh of {}", batch.len())
    } else {
        format!(
            "+{} ~{} -{}",
            batch.count(ActionKind::Insert),
            batch.count(ActionKind::Update),
            batch.count(ActionKind::Delete)
        )
    };
    format!(
        "-> {} {} [{}] {}",
        event.adapter_id, event.stream, event.request_id, counts
    )
}

/// One-line summary of a tick report
pub fn describe_response(event: &ResponseEvent) -> String {
    match event.request_id {
        Some(id) => format!("<- {} {} [{}] {}", event.adapter_id, event.stream, id, event.report),
        None => format!("<- {} {} {}", event.adapter_id, event.stream, event.report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use evroam_sync::{StreamKind, Warning};

    #[test]
    fn test_describe_skipped_tick() {
        let event = ResponseEvent {
            request_id: None,
            adapter_id: "rs-1".to_string(),
            stream: StreamKind::Status,
            timestamp: Utc::now(),
            report: TickReport::Skipped {
                warning: Warning::new(StreamKind::Status, "previous tick still running"),
            },
        };

        assert_eq!(describe_response(&event), "<- rs-1 status skipped");
    }

    #[test]
    fn test_describe_disabled_tick() {
        let event = ResponseEvent {
            request_id: None,
            adapter_id: "rs-1".to_string(),
            stream: StreamKind::Session,
            timestamp: Utc::now(),
            report: TickReport::Disabled,
        };

        assert_eq!(describe_response(&event), "<- rs-1 session disabled");
    }
}
