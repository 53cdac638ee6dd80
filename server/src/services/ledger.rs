use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    IssuedOrder, ItemCode, NewOrder, Order, OrderDetails, OrderStatus, TicketItem, TicketStatus,
};
use crate::services::ticket_code::{self, ImageSink};
use crate::store::TicketStore;
use crate::utils::error::AppError;

/// Owns issuance and cancellation of orders and their ticket items.
pub struct OrderLedger<S, I> {
    store: Arc<S>,
    images: Arc<I>,
}

impl<S, I> Clone for OrderLedger<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            images: Arc::clone(&self.images),
        }
    }
}

impl<S: TicketStore, I: ImageSink> OrderLedger<S, I> {
    pub fn new(store: Arc<S>, images: Arc<I>) -> Self {
        Self { store, images }
    }

    /// Persist an order and its ticket items atomically, then attach the
    /// ticket code and a best-effort rendered image.
    ///
    /// A replay of the same order id fails with `DuplicateOrder`; callers that
    /// receive duplicate payment callbacks should use [`Self::reissue`].
    #[instrument(skip_all, fields(order_id = %new_order.order_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<IssuedOrder, AppError> {
        let new_order = normalized(new_order);
        validate(&new_order)?;

        let order = Order {
            order_id: new_order.order_id.clone(),
            customer_id: new_order.customer_id,
            customer_name: new_order.customer_name,
            phone: new_order.phone,
            email: new_order.email,
            total_amount: new_order.amount,
            status: OrderStatus::Completed,
            view_count: 0,
            created_at: Utc::now(),
        };

        let items: Vec<TicketItem> = new_order
            .line_items
            .into_iter()
            .map(|line| TicketItem {
                id: Uuid::new_v4(),
                order_id: order.order_id.clone(),
                ticket_class: line.ticket_class,
                quantity: line.quantity,
                unit_price: line.unit_price,
                status: TicketStatus::Unused,
                used_at: None,
            })
            .collect();

        self.store
            .insert_order(&order, &items)
            .await
            .map_err(|e| e.for_order(&order.order_id))?;

        info!(
            total = %order.total_amount,
            items = items.len(),
            "Order issued"
        );

        self.attach_code(order, items, false).await
    }

    /// Return an already issued order with its ticket code, for replays of a
    /// payment callback.
    #[instrument(skip(self))]
    pub async fn reissue(&self, order_id: &str) -> Result<IssuedOrder, AppError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{}'", order_id)))?;
        let items = self.store.items_for_order(order_id).await?;
        self.attach_code(order, items, true).await
    }

    /// Soft-cancel a completed order. Items that were already used stay used.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &str) -> Result<OrderDetails, AppError> {
        let Some(order) = self.store.cancel_order(order_id).await? else {
            return match self.store.find_order(order_id).await? {
                None => Err(AppError::NotFound(format!("Order '{}'", order_id))),
                Some(existing) => Err(AppError::InvalidState(format!(
                    "Order '{}' is {:?} and cannot be cancelled",
                    order_id, existing.status
                ))),
            };
        };

        let items = self.store.items_for_order(order_id).await?;
        info!("Order cancelled");
        Ok(OrderDetails { order, items })
    }

    async fn attach_code(
        &self,
        order: Order,
        items: Vec<TicketItem>,
        already_issued: bool,
    ) -> Result<IssuedOrder, AppError> {
        let ticket_code = ticket_code::encode(&order.order_id, &order.phone)?;
        let item_codes = items
            .iter()
            .map(|item| {
                Ok(ItemCode {
                    item_id: item.id,
                    ticket_class: item.ticket_class.clone(),
                    code: ticket_code::encode_item(&order.order_id, &order.phone, item.id)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        let image_url = self.render_image(&order.order_id, &ticket_code).await;

        Ok(IssuedOrder {
            order,
            items,
            ticket_code,
            item_codes,
            image_url,
            already_issued,
        })
    }

    async fn render_image(&self, order_id: &str, payload: &str) -> Option<String> {
        let png = match ticket_code::render_png(payload) {
            Ok(png) => png,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Ticket image rendering failed");
                return None;
            }
        };

        match self.images.store(order_id, png).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Ticket image could not be stored");
                None
            }
        }
    }
}

/// Stored amounts carry at most cents; anything finer would be rounded by
/// the `NUMERIC(14, 2)` columns and break the order total.
const MAX_SCALE: u32 = 2;

/// Trim the free-text customer fields. The order id is left alone: it is the
/// gateway's key and must match byte for byte.
fn normalized(mut order: NewOrder) -> NewOrder {
    for field in [
        &mut order.customer_id,
        &mut order.customer_name,
        &mut order.phone,
    ] {
        *field = field.trim().to_string();
    }
    order.email = order
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    for line in &mut order.line_items {
        line.ticket_class = line.ticket_class.trim().to_string();
    }
    order
}

pub(crate) fn validate(order: &NewOrder) -> Result<(), AppError> {
    for (name, value) in [
        ("order_id", &order.order_id),
        ("customer_id", &order.customer_id),
        ("customer_name", &order.customer_name),
        ("phone", &order.phone),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::MissingParameter(name.to_string()));
        }
    }
    if order.order_id.trim() != order.order_id {
        return Err(AppError::InvalidParameter(format!(
            "order_id {:?} has surrounding whitespace",
            order.order_id
        )));
    }

    if order.line_items.is_empty() {
        return Err(AppError::MissingParameter("line_items".to_string()));
    }

    let mut total = Decimal::ZERO;
    for line in &order.line_items {
        if line.ticket_class.trim().is_empty() {
            return Err(AppError::MissingParameter("ticket_class".to_string()));
        }
        if line.quantity <= 0 {
            return Err(AppError::InvalidAmount(format!(
                "quantity {} for '{}' must be positive",
                line.quantity, line.ticket_class
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "unit price {} for '{}' is negative",
                line.unit_price, line.ticket_class
            )));
        }
        if line.unit_price.scale() > MAX_SCALE {
            return Err(AppError::InvalidAmount(format!(
                "unit price {} for '{}' has more than {} decimal places",
                line.unit_price, line.ticket_class, MAX_SCALE
            )));
        }
        total = line
            .subtotal()
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| {
                AppError::InvalidAmount(format!(
                    "line item total for '{}' is out of range",
                    line.ticket_class
                ))
            })?;
    }

    if order.amount <= Decimal::ZERO {
        return Err(AppError::InvalidAmount(order.amount.to_string()));
    }
    if order.amount.scale() > MAX_SCALE {
        return Err(AppError::InvalidAmount(format!(
            "amount {} has more than {} decimal places",
            order.amount, MAX_SCALE
        )));
    }
    if total != order.amount {
        return Err(AppError::InvalidAmount(format!(
            "amount {} does not match line item total {}",
            order.amount, total
        )));
    }
    Ok(())
}
