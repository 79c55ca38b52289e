//! Maps `ThermodError` onto HTTP responses, and sets the `Last-Modified`,
//! `Date` and `Content-Type` headers the control surface's handlers need.
//!
//! Grounded on `examples/original_source/thermod/socket.py`'s
//! `ControlRequestHandler`, which maps validation failures to 400, sensor
//! or actuator failures to 503, and unexpected exceptions to 500. The
//! `httpdate` crate replaces `email.utils.formatdate` with the equivalent
//! RFC 7231 IMF-fixdate formatter.

use crate::error::ThermodError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::SystemTime;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    explain: String,
}

/// Seconds suggested in `Retry-After` for a persistence failure (spec.md
/// §4.6): the in-memory change is kept, so a prompt retry of the same
/// write is the expected recovery.
const PERSISTENCE_RETRY_AFTER_SECONDS: u64 = 5;

impl IntoResponse for &ThermodError {
    fn into_response(self) -> Response {
        let status = match self {
            ThermodError::Validation(_) => StatusCode::BAD_REQUEST,
            ThermodError::Sensor(_) | ThermodError::Actuator(_) | ThermodError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ThermodError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ThermodError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.short(),
            explain: self.explain(),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, ThermodError::Persistence { .. }) {
            if let Ok(value) =
                header::HeaderValue::from_str(&PERSISTENCE_RETRY_AFTER_SECONDS.to_string())
            {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Attach `Last-Modified` (the timetable's last mutation time) and `Date`
/// (now) headers to a JSON response, as the original control socket does
/// for every successful `GET`.
pub fn with_timestamp_headers(mut response: Response, last_modified_unix: f64) -> Response {
    let headers = response.headers_mut();
    if let Ok(last_modified) = header::HeaderValue::from_str(&httpdate::fmt_http_date(
        SystemTime::UNIX_EPOCH + std::time::Duration::from_secs_f64(last_modified_unix.max(0.0)),
    )) {
        headers.insert(header::LAST_MODIFIED, last_modified);
    }
    if let Ok(date) = header::HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
        headers.insert(header::DATE, date);
    }
    response
}
