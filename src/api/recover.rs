//! Per-request fault boundary.
//!
//! Used with [`tower_http::catch_panic::CatchPanicLayer`]: a handler that
//! panics produces a logged error and a `500` JSON response instead of
//! tearing down its connection. Other connections and the accept loop never
//! see the panic.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Convert a caught panic payload into a `500 Internal Server Error`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic_message(payload.as_ref());
    tracing::error!(panic = %detail, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else {
        "non-string panic payload"
    }
}
