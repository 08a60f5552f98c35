//! Category router: validates and decodes raw envelopes, fail-closed.
//!
//! An envelope reaches subscribers only if its outer discriminant maps to a
//! known category AND its payload decodes into that category's closed
//! variant set. Anything else is dropped with a diagnostic - a newly
//! introduced server-side event type is invisible to older clients rather
//! than corrupting their state.

use serde_json::Value;

use super::wire::{
    Category, DownloadEvent, EventPayload, LogEvent, ServerStateEvent, VerificationEvent,
};

/// Decodes one raw envelope, or returns `None` if it must be dropped.
///
/// Never panics on malformed input; drop reasons are logged at `debug`
/// (unknown discriminant, not JSON) or `warn` (known discriminant whose
/// payload no longer matches the closed set - contract drift).
#[must_use]
pub fn route(raw: &str) -> Option<EventPayload> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(%err, "dropping non-JSON envelope");
            return None;
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        tracing::debug!("dropping envelope without a type discriminant");
        return None;
    };

    let Some(category) = Category::for_discriminant(kind) else {
        tracing::debug!(kind, "dropping envelope with unknown category");
        return None;
    };
    let kind = kind.to_owned();

    match category {
        Category::ServerState => decode::<ServerStateEvent>(&kind, value)
            .map(EventPayload::ServerState),
        Category::DownloadProgress => {
            // Second validation pass: the `download` envelope wraps an inner
            // event with its own closed discriminant set.
            let Some(inner) = value.get("event").cloned() else {
                tracing::warn!("dropping download envelope without inner event");
                return None;
            };
            decode::<DownloadEvent>(&kind, inner).map(EventPayload::DownloadProgress)
        }
        Category::Log => decode::<LogEvent>(&kind, value).map(EventPayload::Log),
        Category::Verification => {
            decode::<VerificationEvent>(&kind, value).map(EventPayload::Verification)
        }
    }
}

/// Decodes a known-category payload, logging contract drift on failure.
fn decode<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::warn!(kind, %err, "dropping envelope: payload drifted from known variants");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_server_event() {
        let payload =
            route(r#"{"type":"server_stopped","modelName":"Phi-3"}"#).expect("should decode");
        assert_eq!(payload.category(), Category::ServerState);
    }

    #[test]
    fn test_routes_wrapped_download_event() {
        let raw = r#"{"type":"download","event":{"type":"download_progress","id":"m1","downloaded":512,"total":1024,"percentage":50.0}}"#;
        let payload = route(raw).expect("should decode");
        match payload {
            EventPayload::DownloadProgress(DownloadEvent::DownloadProgress {
                id,
                percentage,
                ..
            }) => {
                assert_eq!(id, "m1");
                assert!((percentage - 50.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_routes_queue_snapshot_as_served() {
        // Field-for-field what the server serializes for a queue snapshot.
        let raw = r#"{"type":"download","event":{"type":"queue_snapshot","items":[{"id":"m1:q4","display_name":"M1 Q4","status":"queued","position":1}],"max_size":5}}"#;
        let payload = route(raw).expect("should decode");
        match payload {
            EventPayload::DownloadProgress(DownloadEvent::QueueSnapshot { items, max_size }) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, "m1:q4");
                assert_eq!(max_size, 5);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_routes_server_health_changed_as_served() {
        let raw = r#"{"type":"server_health_changed","serverId":7,"modelId":3,"status":{"status":"unreachable","lastError":"connection refused"},"timestamp":1724400000000}"#;
        let payload = route(raw).expect("should decode");
        match payload {
            EventPayload::ServerState(ServerStateEvent::ServerHealthChanged {
                server_id,
                status,
                ..
            }) => {
                assert_eq!(server_id, 7);
                assert_eq!(
                    status,
                    crate::events::ServerHealthStatus::Unreachable {
                        last_error: "connection refused".into()
                    }
                );
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_routes_verification_complete_as_served() {
        let raw = r#"{"type":"verification_complete","modelId":3,"modelName":"Qwen","overallHealth":"unhealthy"}"#;
        let payload = route(raw).expect("should decode");
        match payload {
            EventPayload::Verification(VerificationEvent::VerificationComplete {
                overall_health,
                ..
            }) => {
                assert_eq!(overall_health, crate::events::OverallHealth::Unhealthy);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_drops_unknown_discriminant() {
        assert!(route(r#"{"type":"gpu_metrics","load":0.4}"#).is_none());
    }

    #[test]
    fn test_drops_unknown_inner_variant() {
        let raw = r#"{"type":"download","event":{"type":"download_resumed","id":"m1"}}"#;
        assert!(route(raw).is_none());
    }

    #[test]
    fn test_drops_download_without_inner_event() {
        assert!(route(r#"{"type":"download"}"#).is_none());
    }

    #[test]
    fn test_drops_malformed_json() {
        assert!(route("not json at all").is_none());
        assert!(route("").is_none());
        assert!(route(r#"{"type": 42}"#).is_none());
    }

    #[test]
    fn test_drops_drifted_known_payload() {
        // Known discriminant, but a required field is missing.
        assert!(route(r#"{"type":"server_started","modelName":"X"}"#).is_none());
    }

    #[test]
    fn test_routes_log_event() {
        let payload = route(r#"{"type":"log","message":"listening on 8080"}"#).unwrap();
        match payload {
            EventPayload::Log(log) => assert_eq!(log.message, "listening on 8080"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_routes_verification_event() {
        let raw = r#"{"type":"verification_progress","modelName":"Qwen","bytesProcessed":10,"totalBytes":100}"#;
        let payload = route(raw).unwrap();
        assert_eq!(payload.category(), Category::Verification);
    }
}
