use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Page, ScanLogFilter};
use crate::services::ImageSink;
use crate::state::AppState;
use crate::store::TicketStore;
use crate::utils::error::AppError;
use crate::utils::response::{rejected, success};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub code: String,
    pub scanner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanLogQuery {
    pub scanner_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Gate scanner endpoint. Refused scans are normal operation and come back
/// as 200 with `success: false` and the outcome in `data`.
pub async fn redeem<S, I>(
    State(state): State<AppState<S, I>>,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let report = state
        .redemption
        .redeem(&request.code, &request.scanner_id)
        .await?;

    let message = report.message.clone();
    if report.is_success() {
        Ok(success(report, message))
    } else {
        Ok(rejected(report, message))
    }
}

pub async fn list_logs<S, I>(
    State(state): State<AppState<S, I>>,
    Query(query): Query<ScanLogQuery>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let filter = ScanLogFilter {
        scanner_id: query.scanner_id.filter(|s| !s.trim().is_empty()),
        from: query.from,
        to: query.to,
    };
    let page = Page::new(query.offset.unwrap_or(0), query.limit.unwrap_or(Page::default().limit));

    let logs = state.lookup.scan_logs(filter, page).await?;
    Ok(success(logs, "Scan log retrieved"))
}
