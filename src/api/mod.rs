//! HTTP surface: routes and the middleware stack around them.
//!
//! Layer order, outermost first:
//!
//! 1. [`RequestLogLayer`]: one access record per request, every route
//!    including 404s
//! 2. [`CatchPanicLayer`]: a panicking handler becomes a logged 500
//! 3. [`TimeoutLayer`]: responses not produced within the write timeout
//!    become `408 Request Timeout`

pub mod health;
pub mod recover;
pub mod request_log;
pub mod status_recorder;

use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

pub use request_log::RequestLogLayer;

/// Build the service router.
///
/// `GET /healthz` (and `HEAD`) reach the liveness handler; every other
/// method or path, including `POST /healthz`, is answered with 404.
pub fn router(write_timeout: Duration) -> Router {
    let routes = Router::new()
        .route("/healthz", get(health::healthz).fallback(not_found))
        .fallback(not_found);
    with_middleware(routes, write_timeout)
}

/// Wrap `routes` in the standard middleware stack.
#[allow(deprecated)]
pub fn with_middleware(routes: Router, write_timeout: Duration) -> Router {
    routes
        .layer(TimeoutLayer::new(write_timeout))
        .layer(CatchPanicLayer::custom(recover::panic_response))
        .layer(RequestLogLayer::new())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
