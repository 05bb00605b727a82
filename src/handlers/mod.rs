//! # API Handlers
//!
//! HTTP endpoint handlers for the dialer service.

pub mod calls;
pub mod token;
pub mod voice;
pub mod webhooks;

use crate::models::ServiceInfo;
use axum::response::Json;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/test",
    responses(
        (status = 200, description = "Server is up", body = String, content_type = "text/plain")
    ),
    tag = "root"
)]
pub async fn liveness() -> &'static str {
    "Server is working"
}

#[cfg(test)]
mod tests;
