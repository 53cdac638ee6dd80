use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{NewOrder, Order, Page, PaymentIntent, ScanLogEntry, ScanLogFilter, TicketItem};
use crate::store::{StoreResult, TicketStore};
use crate::utils::error::AppError;

const ORDER_COLUMNS: &str = "order_id, customer_id, customer_name, phone, email, total_amount, \
                             status, view_count, created_at";
const ITEM_COLUMNS: &str = "id, order_id, ticket_class, quantity, unit_price, status, used_at";

const SCAN_FILTER: &str = "($1::text IS NULL OR scanner_id = $1) \
                           AND ($2::timestamptz IS NULL OR scanned_at >= $2) \
                           AND ($3::timestamptz IS NULL OR scanned_at < $3)";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(FromRow)]
struct IntentRow {
    order_id: String,
    amount: String,
    checkout: Json<NewOrder>,
    created_at: DateTime<Utc>,
}

impl From<IntentRow> for PaymentIntent {
    fn from(row: IntentRow) -> Self {
        Self {
            order_id: row.order_id,
            amount: row.amount,
            checkout: row.checkout.0,
            created_at: row.created_at,
        }
    }
}

impl TicketStore for PgStore {
    async fn insert_payment_intent(&self, intent: &PaymentIntent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents (order_id, amount, checkout, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&intent.order_id)
        .bind(&intent.amount)
        .bind(Json(&intent.checkout))
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateOrder(intent.order_id.clone())
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn find_payment_intent(&self, order_id: &str) -> StoreResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(
            "SELECT order_id, amount, checkout, created_at FROM payment_intents WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PaymentIntent::from))
    }

    async fn insert_order(&self, order: &Order, items: &[TicketItem]) -> StoreResult<()> {
        // Dropping the transaction on any early return rolls back the order row.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, customer_id, customer_name, phone, email, total_amount,
                 status, view_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.customer_id)
        .bind(&order.customer_name)
        .bind(&order.phone)
        .bind(&order.email)
        .bind(order.total_amount)
        .bind(order.status)
        .bind(order.view_count)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateOrder(order.order_id.clone())
            } else {
                AppError::Database(e)
            }
        })?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO ticket_items
                    (id, order_id, ticket_class, quantity, unit_price, status, used_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(&item.order_id)
            .bind(&item.ticket_class)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.status)
            .bind(item.used_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn items_for_order(&self, order_id: &str) -> StoreResult<Vec<TicketItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM ticket_items WHERE order_id = $1 ORDER BY ticket_class, id"
        );
        let items = sqlx::query_as::<_, TicketItem>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn orders_by_phone(&self, phone: &str, page: Page) -> StoreResult<(Vec<Order>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE phone = $1")
            .bind(phone)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE phone = $1 \
             ORDER BY created_at DESC, order_id DESC OFFSET $2 LIMIT $3"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(phone)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok((orders, total))
    }

    async fn increment_view_count(&self, order_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE orders SET view_count = view_count + 1 WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn redeem_order_items(
        &self,
        order_id: &str,
        used_at: DateTime<Utc>,
    ) -> StoreResult<Vec<TicketItem>> {
        let sql = format!(
            "UPDATE ticket_items SET status = 'used', used_at = $2 \
             WHERE order_id = $1 AND status = 'unused' \
             RETURNING {ITEM_COLUMNS}"
        );
        let items = sqlx::query_as::<_, TicketItem>(&sql)
            .bind(order_id)
            .bind(used_at)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn redeem_item(
        &self,
        order_id: &str,
        item_id: Uuid,
        used_at: DateTime<Utc>,
    ) -> StoreResult<Option<TicketItem>> {
        let sql = format!(
            "UPDATE ticket_items SET status = 'used', used_at = $3 \
             WHERE id = $1 AND order_id = $2 AND status = 'unused' \
             RETURNING {ITEM_COLUMNS}"
        );
        let item = sqlx::query_as::<_, TicketItem>(&sql)
            .bind(item_id)
            .bind(order_id)
            .bind(used_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn cancel_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE orders SET status = 'cancelled' \
             WHERE order_id = $1 AND status = 'completed' \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

        if order.is_some() {
            sqlx::query(
                "UPDATE ticket_items SET status = 'cancelled' \
                 WHERE order_id = $1 AND status = 'unused'",
            )
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn append_scan_log(&self, entry: &ScanLogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_logs
                (id, raw_code, order_id, ticket_item_id, scanner_id, outcome, scanned_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.raw_code)
        .bind(&entry.order_id)
        .bind(entry.ticket_item_id)
        .bind(&entry.scanner_id)
        .bind(entry.outcome)
        .bind(entry.scanned_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan_logs(
        &self,
        filter: &ScanLogFilter,
        page: Page,
    ) -> StoreResult<(Vec<ScanLogEntry>, i64)> {
        let count_sql = format!("SELECT COUNT(*) FROM scan_logs WHERE {SCAN_FILTER}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&filter.scanner_id)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT id, raw_code, order_id, ticket_item_id, scanner_id, outcome, scanned_at \
             FROM scan_logs WHERE {SCAN_FILTER} \
             ORDER BY scanned_at DESC, id OFFSET $4 LIMIT $5"
        );
        let entries = sqlx::query_as::<_, ScanLogEntry>(&sql)
            .bind(&filter.scanner_id)
            .bind(filter.from)
            .bind(filter.to)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok((entries, total))
    }
}
