//! The HTTP control surface: a thin axum veneer over the same four
//! resources `examples/original_source/thermod/socket.py`'s
//! `ControlRequestHandler` exposed over a bespoke `BaseHTTPServer`
//! subclass — `/settings`, `/heating`, `/monitor`, `/version` — running on
//! a single-worker Tokio runtime to match the spec's single-threaded
//! cooperative scheduling model (see `main.rs`).

pub mod handlers;
pub mod response;

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, MethodRouter};
use axum::Router;
use handlers::AppState;

/// Build the router. Every recognized path accepts GET (and, for axum's
/// built-in behaviour, HEAD) plus whatever other method it needs; anything
/// else on a known path gets 501, and unknown paths get 404.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/settings", settings_methods())
        .route(
            "/status/heating",
            get(handlers::get_heating).fallback(handlers::not_implemented),
        )
        .route("/monitor", get(handlers::get_monitor).fallback(handlers::not_implemented))
        .route("/version", get(handlers::get_version).fallback(handlers::not_implemented))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(close_every_connection))
        .with_state(state)
}

/// The original control socket serves one request per connection (see
/// `examples/original_source/thermod/socket.py`'s single-threaded
/// `BaseHTTPServer`); `Connection: close` keeps axum's clients from
/// expecting keep-alive semantics the daemon never offered.
async fn close_every_connection(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

fn settings_methods() -> MethodRouter<AppState> {
    get(handlers::get_settings)
        .post(handlers::post_settings)
        .fallback(handlers::not_implemented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::status::{StatusBus, ThermodStatus};
    use crate::timetable::{Anchors, Mode, Timetable};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn sample_state() -> AppState {
        let mut tt = Timetable::new("/tmp/surface-mod-test.json");
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
        AppState {
            coordinator: Coordinator::new(tt),
            status_bus: StatusBus::new(ThermodStatus::ok(Some(18.0), 20.0, false, Mode::Auto, 0.0)),
        }
    }

    #[tokio::test]
    async fn get_settings_returns_ok_over_the_real_router() {
        let app = router(sample_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/settings")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("router never errors");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = router(sample_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("router never errors");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unsupported_method_on_a_known_path_is_501() {
        let app = router(sample_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/status/heating")
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
            .expect("router never errors");
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
