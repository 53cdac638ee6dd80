use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{health_check, orders, payments, scans};
use crate::services::ImageSink;
use crate::state::AppState;
use crate::store::TicketStore;

pub fn create_routes<S, I>(state: AppState<S, I>, request_timeout: Duration) -> Router
where
    S: TicketStore + 'static,
    I: ImageSink + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/payments/prepare", post(payments::prepare::<S, I>))
        .route("/payments/callback", post(payments::callback::<S, I>))
        .route("/orders", get(orders::list_by_phone::<S, I>))
        .route("/orders/:order_id", get(orders::get_order::<S, I>))
        .route("/orders/:order_id/cancel", post(orders::cancel_order::<S, I>))
        .route("/scans", post(scans::redeem::<S, I>).get(scans::list_logs::<S, I>))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
}
