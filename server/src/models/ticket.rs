use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Unused,
    Used,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketItem {
    pub id: Uuid,
    pub order_id: String,
    pub ticket_class: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
}

