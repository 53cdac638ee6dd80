use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{ScanLogEntry, ScanOutcome, TicketItem};
use crate::services::ticket_code::{self, DecodedCode};
use crate::store::TicketStore;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReport {
    pub outcome: ScanOutcome,
    pub order_id: Option<String>,
    pub items: Vec<TicketItem>,
    pub message: String,
    /// False when the outcome was determined but the audit row could not be
    /// written. The outcome itself is still authoritative.
    pub audit_recorded: bool,
    pub scanned_at: DateTime<Utc>,
}

impl RedemptionReport {
    pub fn is_success(&self) -> bool {
        self.outcome == ScanOutcome::Success
    }
}

/// Gate-side `unused -> used` transition plus its audit trail.
pub struct Redemption<S> {
    store: Arc<S>,
}

impl<S> Clone for Redemption<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TicketStore> Redemption<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Redeem a scanned code exactly once.
    ///
    /// Refused scans (`AlreadyUsed`, `NotFound`, `Malformed`) are ordinary
    /// reports, not errors. An `Err` means no outcome could be determined
    /// (store unreachable, missing scanner id). Do not retry blindly: a retry
    /// after an applied transition reports `AlreadyUsed`.
    #[instrument(skip(self, code))]
    pub async fn redeem(&self, code: &str, scanner_id: &str) -> Result<RedemptionReport, AppError> {
        if scanner_id.trim().is_empty() {
            return Err(AppError::MissingParameter("scanner_id".to_string()));
        }
        let scanned_at = Utc::now();

        let decoded = match ticket_code::decode(code) {
            Ok(decoded) => decoded,
            Err(_) => {
                let attempt = Attempt::new(code, scanner_id, scanned_at);
                return Ok(self.finish(attempt, ScanOutcome::Malformed, Vec::new()).await);
            }
        };

        let mut attempt = Attempt::new(code, scanner_id, scanned_at);
        attempt.order_id = Some(decoded.order_id.clone());
        attempt.item_id = decoded.item_id;

        if !self.identity_matches(&decoded).await? {
            return Ok(self.finish(attempt, ScanOutcome::NotFound, Vec::new()).await);
        }

        let redeemed: Vec<TicketItem> = match decoded.item_id {
            Some(item_id) => self
                .store
                .redeem_item(&decoded.order_id, item_id, scanned_at)
                .await?
                .into_iter()
                .collect(),
            None => {
                self.store
                    .redeem_order_items(&decoded.order_id, scanned_at)
                    .await?
            }
        };

        let outcome = if redeemed.is_empty() {
            ScanOutcome::AlreadyUsed
        } else {
            ScanOutcome::Success
        };
        Ok(self.finish(attempt, outcome, redeemed).await)
    }

    /// The payload is unsigned, so the decoded identity is only trusted once
    /// it matches a stored order (and, for item codes, one of its items).
    async fn identity_matches(&self, decoded: &DecodedCode) -> Result<bool, AppError> {
        let Some(order) = self.store.find_order(&decoded.order_id).await? else {
            return Ok(false);
        };
        if order.phone != decoded.phone {
            return Ok(false);
        }
        match decoded.item_id {
            None => Ok(true),
            Some(item_id) => Ok(self
                .store
                .items_for_order(&order.order_id)
                .await?
                .iter()
                .any(|item| item.id == item_id)),
        }
    }

    async fn finish(
        &self,
        attempt: Attempt<'_>,
        outcome: ScanOutcome,
        items: Vec<TicketItem>,
    ) -> RedemptionReport {
        let ticket_item_id = match items.as_slice() {
            [single] => Some(single.id),
            _ => attempt.item_id,
        };

        let entry = ScanLogEntry {
            id: Uuid::new_v4(),
            raw_code: attempt.raw_code.to_string(),
            order_id: attempt.order_id.clone(),
            ticket_item_id,
            scanner_id: attempt.scanner_id.to_string(),
            outcome,
            scanned_at: attempt.scanned_at,
        };

        let audit_recorded = match self.store.append_scan_log(&entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    scan_id = %entry.id,
                    outcome = ?outcome,
                    error = %e,
                    "Scan audit write failed, reporting outcome with audit gap"
                );
                false
            }
        };

        match outcome {
            ScanOutcome::Success => info!(
                order_id = ?attempt.order_id,
                redeemed = items.len(),
                "Ticket redeemed"
            ),
            _ => warn!(order_id = ?attempt.order_id, outcome = ?outcome, "Scan refused"),
        }

        RedemptionReport {
            outcome,
            order_id: attempt.order_id,
            items,
            message: outcome.message().to_string(),
            audit_recorded,
            scanned_at: attempt.scanned_at,
        }
    }
}

struct Attempt<'a> {
    raw_code: &'a str,
    scanner_id: &'a str,
    scanned_at: DateTime<Utc>,
    order_id: Option<String>,
    item_id: Option<Uuid>,
}

impl<'a> Attempt<'a> {
    fn new(raw_code: &'a str, scanner_id: &'a str, scanned_at: DateTime<Utc>) -> Self {
        Self {
            raw_code,
            scanner_id,
            scanned_at,
            order_id: None,
            item_id: None,
        }
    }
}
