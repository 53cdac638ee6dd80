use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::models::Page;
use crate::services::ImageSink;
use crate::state::AppState;
use crate::store::TicketStore;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub phone: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_by_phone<S, I>(
    State(state): State<AppState<S, I>>,
    Query(query): Query<OrdersQuery>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let phone = query
        .phone
        .ok_or_else(|| AppError::MissingParameter("phone".to_string()))?;
    let page = Page::new(query.offset.unwrap_or(0), query.limit.unwrap_or(Page::default().limit));

    let orders = state.lookup.orders_by_phone(&phone, page).await?;
    Ok(success(orders, "Orders retrieved"))
}

pub async fn get_order<S, I>(
    State(state): State<AppState<S, I>>,
    Path(order_id): Path<String>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let details = state.lookup.order_by_id(&order_id).await?;
    Ok(success(details, "Order retrieved"))
}

pub async fn cancel_order<S, I>(
    State(state): State<AppState<S, I>>,
    Path(order_id): Path<String>,
) -> Result<Response, AppError>
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    let details = state.ledger.cancel_order(&order_id).await?;
    Ok(success(details, "Order cancelled"))
}
