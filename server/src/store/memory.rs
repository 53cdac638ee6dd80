//! In-memory `TicketStore` for tests, with the same atomicity guarantees as
//! `PgStore`.
//!
//! All state sits behind one mutex, so each trait call is a single critical
//! section and the compare-and-swap transitions behave exactly like their
//! conditional `UPDATE` counterparts. Failure switches let tests exercise the
//! rollback and best-effort paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Order, OrderStatus, Page, PaymentIntent, ScanLogEntry, ScanLogFilter, TicketItem,
    TicketStatus,
};
use crate::store::{StoreResult, TicketStore};
use crate::utils::error::AppError;

#[derive(Default)]
struct Inner {
    intents: HashMap<String, PaymentIntent>,
    orders: HashMap<String, Order>,
    items: Vec<TicketItem>,
    scan_logs: Vec<ScanLogEntry>,
}

#[derive(Default)]
struct Faults {
    item_insert: AtomicBool,
    view_count: AtomicBool,
    scan_log: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    faults: Arc<Faults>,
}

fn injected(what: &str) -> AppError {
    AppError::Database(sqlx::Error::Protocol(format!("injected {what} failure")))
}

fn paginate<T: Clone>(rows: &[T], page: Page) -> Vec<T> {
    rows.iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .cloned()
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the ticket item insert fail after the order row was written.
    pub fn fail_item_inserts(&self, fail: bool) {
        self.faults.item_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_view_count(&self, fail: bool) {
        self.faults.view_count.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scan_log(&self, fail: bool) {
        self.faults.scan_log.store(fail, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.lock().map(|inner| inner.orders.len()).unwrap_or(0)
    }

    pub fn item_count(&self) -> usize {
        self.lock().map(|inner| inner.items.len()).unwrap_or(0)
    }

    pub fn scan_log_count(&self) -> usize {
        self.lock().map(|inner| inner.scan_logs.len()).unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

impl TicketStore for MemoryStore {
    async fn insert_payment_intent(&self, intent: &PaymentIntent) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.intents.contains_key(&intent.order_id) {
            return Err(AppError::DuplicateOrder(intent.order_id.clone()));
        }
        inner.intents.insert(intent.order_id.clone(), intent.clone());
        Ok(())
    }

    async fn find_payment_intent(&self, order_id: &str) -> StoreResult<Option<PaymentIntent>> {
        Ok(self.lock()?.intents.get(order_id).cloned())
    }

    async fn insert_order(&self, order: &Order, items: &[TicketItem]) -> StoreResult<()> {
        let mut inner = self.lock()?;

        if inner.orders.contains_key(&order.order_id) {
            return Err(AppError::DuplicateOrder(order.order_id.clone()));
        }
        inner.orders.insert(order.order_id.clone(), order.clone());

        if self.faults.item_insert.load(Ordering::SeqCst) {
            inner.orders.remove(&order.order_id);
            return Err(injected("ticket item insert"));
        }
        inner.items.extend_from_slice(items);
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }

    async fn items_for_order(&self, order_id: &str) -> StoreResult<Vec<TicketItem>> {
        let inner = self.lock()?;
        let mut items: Vec<TicketItem> = inner
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.ticket_class.cmp(&b.ticket_class).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn orders_by_phone(&self, phone: &str, page: Page) -> StoreResult<(Vec<Order>, i64)> {
        let inner = self.lock()?;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.phone == phone)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        let total = orders.len() as i64;
        Ok((paginate(&orders, page), total))
    }

    async fn increment_view_count(&self, order_id: &str) -> StoreResult<()> {
        if self.faults.view_count.load(Ordering::SeqCst) {
            return Err(injected("view counter"));
        }
        if let Some(order) = self.lock()?.orders.get_mut(order_id) {
            order.view_count += 1;
        }
        Ok(())
    }

    async fn redeem_order_items(
        &self,
        order_id: &str,
        used_at: DateTime<Utc>,
    ) -> StoreResult<Vec<TicketItem>> {
        let mut inner = self.lock()?;
        let mut redeemed = Vec::new();
        for item in inner
            .items
            .iter_mut()
            .filter(|item| item.order_id == order_id && item.status == TicketStatus::Unused)
        {
            item.status = TicketStatus::Used;
            item.used_at = Some(used_at);
            redeemed.push(item.clone());
        }
        Ok(redeemed)
    }

    async fn redeem_item(
        &self,
        order_id: &str,
        item_id: Uuid,
        used_at: DateTime<Utc>,
    ) -> StoreResult<Option<TicketItem>> {
        let mut inner = self.lock()?;
        let item = inner.items.iter_mut().find(|item| {
            item.id == item_id && item.order_id == order_id && item.status == TicketStatus::Unused
        });
        Ok(item.map(|item| {
            item.status = TicketStatus::Used;
            item.used_at = Some(used_at);
            item.clone()
        }))
    }

    async fn cancel_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let mut inner = self.lock()?;
        let cancelled = match inner.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Completed => {
                order.status = OrderStatus::Cancelled;
                order.clone()
            }
            _ => return Ok(None),
        };
        for item in inner
            .items
            .iter_mut()
            .filter(|item| item.order_id == order_id && item.status == TicketStatus::Unused)
        {
            item.status = TicketStatus::Cancelled;
        }
        Ok(Some(cancelled))
    }

    async fn append_scan_log(&self, entry: &ScanLogEntry) -> StoreResult<()> {
        if self.faults.scan_log.load(Ordering::SeqCst) {
            return Err(injected("scan log"));
        }
        self.lock()?.scan_logs.push(entry.clone());
        Ok(())
    }

    async fn scan_logs(
        &self,
        filter: &ScanLogFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScanLogEntry>, i64)> {
        let inner = self.lock()?;
        let mut entries: Vec<ScanLogEntry> = inner
            .scan_logs
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at));
        let total = entries.len() as i64;
        Ok((paginate(&entries, page), total))
    }
}
