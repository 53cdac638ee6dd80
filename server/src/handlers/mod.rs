use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod orders;
pub mod payments;
pub mod scans;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gate-ticketing",
    };

    success(payload, "Health check successful")
}
