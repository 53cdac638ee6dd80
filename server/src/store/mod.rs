//! Persistence seam for orders, ticket items and the scan audit log.
//!
//! Every correctness-critical transition is expressed as a single conditional
//! write in the store so that independent service instances (several gate
//! scanners, horizontally scaled API nodes) never need in-process locks.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Order, Page, PaymentIntent, ScanLogEntry, ScanLogFilter, TicketItem};
use crate::utils::error::AppError;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, AppError>;

pub trait TicketStore: Send + Sync {
    /// Record the checkout a payment was prepared for.
    ///
    /// # Errors
    ///
    /// - `AppError::DuplicateOrder` when a payment was already prepared for the
    ///   order id
    fn insert_payment_intent(
        &self,
        intent: &PaymentIntent,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn find_payment_intent(
        &self,
        order_id: &str,
    ) -> impl Future<Output = StoreResult<Option<PaymentIntent>>> + Send;

    /// Insert an order and all of its ticket items as one atomic unit.
    ///
    /// # Errors
    ///
    /// - `AppError::DuplicateOrder` when the order id already exists
    /// - `AppError::Database` for any other failure; nothing is left behind
    fn insert_order(
        &self,
        order: &Order,
        items: &[TicketItem],
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn find_order(&self, order_id: &str)
        -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    fn items_for_order(
        &self,
        order_id: &str,
    ) -> impl Future<Output = StoreResult<Vec<TicketItem>>> + Send;

    /// Orders for a phone number, most recent first, with the unpaged total.
    fn orders_by_phone(
        &self,
        phone: &str,
        page: Page,
    ) -> impl Future<Output = StoreResult<(Vec<Order>, i64)>> + Send;

    fn increment_view_count(&self, order_id: &str)
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Compare-and-swap every `unused` item of the order to `used`.
    ///
    /// Returns the items this call transitioned; empty when another caller
    /// got there first or nothing redeemable is left.
    fn redeem_order_items(
        &self,
        order_id: &str,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<TicketItem>>> + Send;

    /// Compare-and-swap a single item from `unused` to `used`.
    fn redeem_item(
        &self,
        order_id: &str,
        item_id: Uuid,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<TicketItem>>> + Send;

    /// `completed -> cancelled` for the order and `unused -> cancelled` for its
    /// items, atomically. `None` when the order was not in `completed`.
    fn cancel_order(&self, order_id: &str)
        -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    fn append_scan_log(&self, entry: &ScanLogEntry)
        -> impl Future<Output = StoreResult<()>> + Send;

    fn scan_logs(
        &self,
        filter: &ScanLogFilter,
        page: Page,
    ) -> impl Future<Output = StoreResult<(Vec<ScanLogEntry>, i64)>> + Send;
}
