//! Liveness endpoint.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Body of a successful liveness check.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: &'static str,
}

impl HealthStatus {
    pub const OK: Self = Self { status: "ok" };
}

/// `GET /healthz`: always returns 200 OK with `{"status":"ok"}`.
///
/// This endpoint reads nothing from the request and touches no state, making
/// it safe to use as a Docker / Kubernetes liveness check.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthStatus::OK))
}
