//! Request handlers for the control surface, one per route in
//! `examples/original_source/thermod/socket.py`'s `ControlRequestHandler`:
//! `/settings` (GET the full configuration, POST to mutate it),
//! `/status/heating` (current status), `/monitor` (long-poll for the next
//! status change) and `/version`.

use super::response::with_timestamp_headers;
use crate::coordinator::Coordinator;
use crate::error::ThermodError;
use crate::status::{StatusBus, ThermodStatus};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::warn;
use serde_json::Value;

/// The crate's own version, exposed verbatim by `GET /version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state every handler closes over.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub status_bus: StatusBus,
}

pub async fn get_settings(State(state): State<AppState>) -> Response {
    let (settings, last_modified) = state
        .coordinator
        .with(|tt| (tt.settings(), tt.last_update_timestamp()));
    with_timestamp_headers(Json(settings).into_response(), last_modified)
}

/// The field names `apply_batch` understands individually. `settings`
/// (a full configuration blob) is handled separately, below.
const RECOGNIZED_OPTIONS: [&str; 6] = ["mode", "t0", "tmin", "tmax", "differential", "grace_time"];

/// `POST /settings` (spec.md §4.6): either a full configuration blob under
/// the `settings` key, or a flat map of individual option names to values
/// applied as one transaction. Unknown fields are logged and ignored; if
/// nothing recognized survives that filtering, the request fails with 400
/// rather than silently doing nothing.
pub async fn post_settings(State(state): State<AppState>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return (&ThermodError::Validation(format!("invalid JSON body: {e}"))).into_response()
        }
    };

    let Some(object) = value.as_object() else {
        return (&ThermodError::Validation(
            "request body must be a JSON object".to_string(),
        ))
            .into_response();
    };

    if let Some(blob) = object.get("settings") {
        for key in object.keys().filter(|k| k.as_str() != "settings") {
            warn!("ignoring `{key}` alongside a full `settings` replacement");
        }
        let result = state
            .coordinator
            .with_mut(|tt| tt.load(&blob.to_string()));
        return finish_mutation(state, result).await;
    }

    let mut pairs = Vec::new();
    for (key, value) in object {
        if RECOGNIZED_OPTIONS.contains(&key.as_str()) {
            pairs.push((key.clone(), scalar_to_string(value)));
        } else {
            warn!("ignoring unrecognized settings option `{key}`");
        }
    }

    if pairs.is_empty() {
        return (&ThermodError::Validation(
            "no recognized settings option in request body".to_string(),
        ))
            .into_response();
    }

    let result = state.coordinator.with_mut(|tt| tt.apply_batch(&pairs));
    finish_mutation(state, result).await
}

async fn finish_mutation(state: AppState, result: Result<(), ThermodError>) -> Response {
    match result {
        Ok(()) => {
            let save_result = state.coordinator.with(crate::timetable::Timetable::save);
            match save_result {
                Ok(()) => get_settings(State(state)).await,
                Err(e) => (&e).into_response(),
            }
        }
        Err(e) => (&e).into_response(),
    }
}

/// Renders a JSON option value the way a human typing a string would have:
/// numbers and `null` lose their quotes, strings pass through unchanged.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub async fn get_heating(State(state): State<AppState>) -> Response {
    let status = state.status_bus.current();
    let last_modified = state.coordinator.with(crate::timetable::Timetable::last_update_timestamp);
    with_timestamp_headers(Json(status).into_response(), last_modified)
}

/// `GET /monitor`: a long-poll endpoint that blocks until the next status
/// publication (spec.md §4.4's status bus, Open Question (b)) and returns
/// it. No timeout is applied here: spec.md §5 is explicit that "long-poll
/// has no timeout — the transport's keep-alive is authoritative", so this
/// only resolves on an actual new snapshot, however long that takes.
pub async fn get_monitor(State(state): State<AppState>) -> Response {
    let mut receiver = state.status_bus.subscribe();
    let _ = receiver.changed().await;
    let status: ThermodStatus = receiver.borrow().clone();
    Json(status).into_response()
}

pub async fn get_version() -> Response {
    Json(serde_json::json!({ "version": VERSION })).into_response()
}

/// Returned for any request path the router has no route for.
pub async fn not_found() -> Response {
    let body = serde_json::json!({ "error": "not found", "explain": "no such resource" });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Returned for a recognized path accessed with a method the original
/// socket handler never implemented (anything but GET/HEAD/POST).
pub async fn not_implemented() -> Response {
    StatusCode::NOT_IMPLEMENTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::{Anchors, Mode, Timetable};

    fn sample_state() -> AppState {
        let mut tt = Timetable::new("/tmp/handlers-test.json");
        tt.load(&crate::timetable::minimal_json(
            Mode::Auto,
            Anchors {
                t0: 5.0,
                tmin: 10.0,
                tmax: 20.0,
            },
            0.5,
        ))
        .expect("valid json");
        let coordinator = Coordinator::new(tt);
        let status_bus = StatusBus::new(ThermodStatus::ok(Some(18.0), 20.0, false, Mode::Auto, 0.0));
        AppState {
            coordinator,
            status_bus,
        }
    }

    #[tokio::test]
    async fn get_settings_returns_ok() {
        let response = get_settings(State(sample_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_heating_reports_current_status() {
        let response = get_heating(State(sample_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_version_reports_crate_version() {
        let response = get_version().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn monitor_resolves_once_a_new_status_is_published() {
        use std::time::Duration;

        let state = sample_state();
        let bus = state.status_bus.clone();
        let monitor = tokio::spawn(get_monitor(State(state)));

        // Give the spawned task a chance to subscribe and start waiting
        // before a status is actually published, exercising the long-poll
        // parking behaviour rather than racing it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish(ThermodStatus::ok(Some(19.0), 20.0, true, Mode::Auto, 1.0));

        let response = tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .expect("monitor resolved after the publish")
            .expect("monitor task did not panic");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn monitor_does_not_resolve_for_a_publish_that_already_happened() {
        use std::time::Duration;

        let state = sample_state();
        state
            .status_bus
            .publish(ThermodStatus::ok(Some(19.0), 20.0, true, Mode::Auto, 1.0));

        // Subscribing happens inside `get_monitor`, after the publish
        // above, so this must keep waiting rather than return the stale
        // snapshot immediately (spec.md §4.7: only the edge matters).
        let result = tokio::time::timeout(Duration::from_millis(50), get_monitor(State(state))).await;
        assert!(result.is_err(), "monitor should still be parked, not resolved");
    }

    #[tokio::test]
    async fn post_settings_applies_a_recognized_scalar_option() {
        let state = sample_state();
        let body = Bytes::from(r#"{"tmax": 22.5}"#);
        let response = post_settings(State(state.clone()), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let tmax = state
            .coordinator
            .with(|tt| tt.settings()["temperatures"]["tmax"].as_f64().expect("number"));
        assert!((tmax - 22.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn post_settings_ignores_unrecognized_fields_but_still_applies_known_ones() {
        let state = sample_state();
        let body = Bytes::from(r#"{"tmax": 23.0, "bogus": "whatever"}"#);
        let response = post_settings(State(state.clone()), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let tmax = state
            .coordinator
            .with(|tt| tt.settings()["temperatures"]["tmax"].as_f64().expect("number"));
        assert!((tmax - 23.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn post_settings_with_only_unrecognized_fields_is_bad_request() {
        let state = sample_state();
        let body = Bytes::from(r#"{"bogus": "whatever"}"#);
        let response = post_settings(State(state), body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_settings_rejects_malformed_json() {
        let state = sample_state();
        let response = post_settings(State(state), Bytes::from("not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
