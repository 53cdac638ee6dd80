use axum::extract::State;
use axum::response::Response;
use axum::Json;

use crate::services::{ImageSink, PaymentCallback, PrepareRequest};
use crate::state::AppState;
use crate::store::TicketStore;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn prepare<S, I>(
    State(state): State<AppState<S, I>>,
    Json(request): Json<PrepareRequest>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let payment = state.payments.prepare(request).await?;
    Ok(success(payment, "Payment request prepared"))
}

/// Gateway completion callback. Replays of an already issued order return the
/// existing tickets instead of an error.
pub async fn callback<S, I>(
    State(state): State<AppState<S, I>>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let issued = state.payments.complete(callback).await?;
    if issued.already_issued {
        Ok(success(issued, "Tickets already issued"))
    } else {
        Ok(created(issued, "Tickets issued"))
    }
}
