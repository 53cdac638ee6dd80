use std::sync::Arc;

use tracing::{instrument, warn};

use crate::models::{OrderDetails, Page, Paginated, ScanLogEntry, ScanLogFilter};
use crate::store::TicketStore;
use crate::utils::error::AppError;

/// Read-side queries over orders, ticket items and the scan log.
pub struct Lookup<S> {
    store: Arc<S>,
}

impl<S> Clone for Lookup<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TicketStore> Lookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fetch one order with its items. The view counter bump afterwards is
    /// best-effort and never fails the lookup.
    #[instrument(skip(self))]
    pub async fn order_by_id(&self, order_id: &str) -> Result<OrderDetails, AppError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{}'", order_id)))?;
        let items = self.store.items_for_order(order_id).await?;

        if let Err(e) = self.store.increment_view_count(order_id).await {
            warn!(order_id = %order_id, error = %e, "View counter update skipped");
        }

        Ok(OrderDetails { order, items })
    }

    #[instrument(skip(self))]
    pub async fn orders_by_phone(
        &self,
        phone: &str,
        page: Page,
    ) -> Result<Paginated<OrderDetails>, AppError> {
        if phone.trim().is_empty() {
            return Err(AppError::MissingParameter("phone".to_string()));
        }
        let page = page.normalized();
        let (orders, total) = self.store.orders_by_phone(phone, page).await?;

        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.store.items_for_order(&order.order_id).await?;
            details.push(OrderDetails { order, items });
        }

        Ok(Paginated {
            items: details,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    #[instrument(skip(self))]
    pub async fn scan_logs(
        &self,
        filter: ScanLogFilter,
        page: Page,
    ) -> Result<Paginated<ScanLogEntry>, AppError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::InvalidParameter(
                    "date range: 'from' must not be after 'to'".to_string(),
                ));
            }
        }
        let page = page.normalized();
        let (entries, total) = self.store.scan_logs(&filter, page).await?;
        Ok(Paginated {
            items: entries,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }
}
