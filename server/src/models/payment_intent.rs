use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::NewOrder;

/// Checkout recorded when a payment is prepared. The gateway callback only
/// confirms that this exact checkout was paid; the order issued afterwards is
/// always built from the stored copy, never from the callback body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub order_id: String,
    /// Amount exactly as sent to, and signed by, the gateway.
    pub amount: String,
    pub checkout: NewOrder,
    pub created_at: DateTime<Utc>,
}
