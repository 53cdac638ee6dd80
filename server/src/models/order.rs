use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::ticket::TicketItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Checkout data handed to the ledger once payment has cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub amount: Decimal,
    pub line_items: Vec<NewLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub ticket_class: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewLineItem {
    /// `None` when the product does not fit in a `Decimal`.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<TicketItem>,
}

/// Code admitting a single line item rather than the whole party.
#[derive(Debug, Clone, Serialize)]
pub struct ItemCode {
    pub item_id: Uuid,
    pub ticket_class: String,
    pub code: String,
}

/// Result of a successful issuance: the stored order plus the ticket code the
/// customer presents at the gate.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedOrder {
    pub order: Order,
    pub items: Vec<TicketItem>,
    pub ticket_code: String,
    pub item_codes: Vec<ItemCode>,
    pub image_url: Option<String>,
    pub already_issued: bool,
}
