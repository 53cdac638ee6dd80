use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::PaymentConfig;
use crate::models::{IssuedOrder, NewLineItem, NewOrder, PaymentIntent};
use crate::services::checksum;
use crate::services::ledger::{self, OrderLedger};
use crate::services::ticket_code::ImageSink;
use crate::store::TicketStore;
use crate::utils::error::AppError;

/// Checkout submitted by the storefront before redirecting to the gateway.
/// `amount` stays a string so the exact bytes the gateway signs are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareRequest {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub amount: String,
    pub line_items: Vec<NewLineItem>,
}

/// Fields posted to the payment gateway to open a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRequest {
    pub service_id: String,
    pub order_id: String,
    pub amount: String,
    pub checksum: String,
    pub return_url: String,
}

/// Completion callback delivered by the gateway once payment cleared. May be
/// delivered more than once for the same order. `checksum` is the gateway's
/// approval signature, not the handshake token.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub order_id: String,
    pub amount: String,
    pub transaction_id: String,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct PaymentGateway {
    config: PaymentConfig,
}

impl PaymentGateway {
    pub fn new(config: PaymentConfig) -> Self {
        Self { config }
    }

    /// Build the gateway request for an order. The amount is sent, and hashed,
    /// exactly as given.
    pub fn prepare(&self, order_id: &str, amount: &str) -> Result<PaymentRequest, AppError> {
        let checksum = checksum::compute_checksum(
            &self.config.service_id,
            order_id,
            amount,
            &self.config.secret,
        )?;

        Ok(PaymentRequest {
            service_id: self.config.service_id.clone(),
            order_id: order_id.to_string(),
            amount: amount.to_string(),
            checksum,
            return_url: self.config.return_url.clone(),
        })
    }

    /// Reject callbacks the gateway did not sign for this exact amount.
    pub fn verify_approval(&self, callback: &PaymentCallback) -> Result<(), AppError> {
        checksum::verify_approval(
            &self.config.service_id,
            &callback.order_id,
            &callback.amount,
            &callback.transaction_id,
            &self.config.secret,
            &callback.checksum,
        )
    }
}

/// Prepare/confirm handshake. Preparing records the checkout server-side;
/// only a gateway-approved callback for that record issues tickets.
pub struct PaymentFlow<S, I> {
    gateway: Arc<PaymentGateway>,
    store: Arc<S>,
    ledger: OrderLedger<S, I>,
}

impl<S, I> Clone for PaymentFlow<S, I> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: TicketStore, I: ImageSink> PaymentFlow<S, I> {
    pub fn new(gateway: PaymentGateway, store: Arc<S>, ledger: OrderLedger<S, I>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            store,
            ledger,
        }
    }

    #[instrument(skip_all, fields(order_id = %request.order_id))]
    pub async fn prepare(&self, request: PrepareRequest) -> Result<PaymentRequest, AppError> {
        let payment = self.gateway.prepare(&request.order_id, &request.amount)?;
        let amount = Decimal::from_str(&request.amount)
            .map_err(|_| AppError::InvalidAmount(request.amount.clone()))?;

        let checkout = NewOrder {
            order_id: request.order_id,
            customer_id: request.customer_id,
            customer_name: request.customer_name,
            phone: request.phone,
            email: request.email,
            amount,
            line_items: request.line_items,
        };
        ledger::validate(&checkout)?;

        let intent = PaymentIntent {
            order_id: checkout.order_id.clone(),
            amount: request.amount,
            checkout,
            created_at: Utc::now(),
        };
        self.store.insert_payment_intent(&intent).await?;

        info!(amount = %intent.amount, "Payment request prepared");
        Ok(payment)
    }

    /// Issue the prepared checkout once the gateway approved it. Replays of an
    /// already issued order return the existing tickets.
    #[instrument(skip_all, fields(order_id = %callback.order_id))]
    pub async fn complete(&self, callback: PaymentCallback) -> Result<IssuedOrder, AppError> {
        let intent = self
            .store
            .find_payment_intent(&callback.order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Prepared payment for order '{}'", callback.order_id))
            })?;

        if callback.amount != intent.amount {
            warn!(
                prepared = %intent.amount,
                received = %callback.amount,
                "Callback amount differs from prepared amount"
            );
            return Err(AppError::ChecksumMismatch(callback.order_id));
        }
        self.gateway.verify_approval(&callback)?;

        match self.ledger.create_order(intent.checkout).await {
            Ok(issued) => Ok(issued),
            Err(AppError::DuplicateOrder(order_id)) => {
                info!("Duplicate payment callback, returning issued order");
                self.ledger.reissue(&order_id).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const SERVICE: &str = "svc-gate";
    const SECRET: &str = "shared-secret";

    struct NoImages;

    impl ImageSink for NoImages {
        async fn store(&self, _order_id: &str, _png: Vec<u8>) -> Result<String, AppError> {
            Err(AppError::Rendering("disabled".to_string()))
        }
    }

    fn gateway() -> PaymentGateway {
        PaymentGateway::new(PaymentConfig {
            service_id: SERVICE.to_string(),
            secret: SECRET.to_string(),
            return_url: "https://tickets.example.com/return".to_string(),
        })
    }

    fn flow() -> (PaymentFlow<MemoryStore, NoImages>, MemoryStore) {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let ledger = OrderLedger::new(Arc::clone(&shared), Arc::new(NoImages));
        (PaymentFlow::new(gateway(), shared, ledger), store)
    }

    fn prepare_request(order_id: &str, amount: &str) -> PrepareRequest {
        PrepareRequest {
            order_id: order_id.to_string(),
            customer_id: "cust-1".to_string(),
            customer_name: "Kim".to_string(),
            phone: "0101".to_string(),
            email: None,
            amount: amount.to_string(),
            line_items: vec![NewLineItem {
                ticket_class: "adult".to_string(),
                quantity: 1,
                unit_price: Decimal::from(1000),
            }],
        }
    }

    fn approved(order_id: &str, amount: &str) -> PaymentCallback {
        PaymentCallback {
            order_id: order_id.to_string(),
            amount: amount.to_string(),
            transaction_id: "txn-1".to_string(),
            checksum: checksum::compute_approval(SERVICE, order_id, amount, "txn-1", SECRET)
                .unwrap(),
        }
    }

    #[test]
    fn test_prepare_uses_configured_fields() {
        let request = gateway().prepare("ORD-1", "68000").unwrap();
        assert_eq!(request.service_id, "svc-gate");
        assert_eq!(request.amount, "68000");
        assert_eq!(
            request.checksum,
            checksum::compute_checksum(SERVICE, "ORD-1", "68000", SECRET).unwrap()
        );
        assert_eq!(request.return_url, "https://tickets.example.com/return");
    }

    #[test]
    fn test_prepare_keeps_amount_bytes() {
        for amount in ["1000.00", "01000"] {
            assert_eq!(gateway().prepare("ORD-1", amount).unwrap().amount, amount);
        }
    }

    #[test]
    fn test_prepare_rejects_non_positive_amount() {
        assert!(matches!(
            gateway().prepare("ORD-1", "0"),
            Err(AppError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_numeric_callback_amount_is_not_accepted() {
        let body = r#"{"order_id":"ORD-1","amount":1000.00,"transaction_id":"txn-1","checksum":"00"}"#;
        assert!(serde_json::from_str::<PaymentCallback>(body).is_err());

        let body = r#"{"order_id":"ORD-1","amount":"1000.00","transaction_id":"txn-1","checksum":"00"}"#;
        let callback: PaymentCallback = serde_json::from_str(body).unwrap();
        assert_eq!(callback.amount, "1000.00");
    }

    #[tokio::test]
    async fn test_prepared_checkout_is_issued_after_approval() {
        let (flow, store) = flow();
        flow.prepare(prepare_request("ORD-1", "1000.00")).await.unwrap();
        assert_eq!(store.order_count(), 0);

        let issued = flow.complete(approved("ORD-1", "1000.00")).await.unwrap();
        assert_eq!(issued.order.total_amount, Decimal::from(1000));
        assert_eq!(issued.order.phone, "0101");
        assert_eq!(issued.items.len(), 1);
        assert!(!issued.already_issued);

        let again = flow.complete(approved("ORD-1", "1000.00")).await.unwrap();
        assert!(again.already_issued);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_handshake_token_does_not_confirm_payment() {
        let (flow, store) = flow();
        let payment = flow.prepare(prepare_request("ORD-1", "1000")).await.unwrap();

        let forged = PaymentCallback {
            order_id: "ORD-1".to_string(),
            amount: "1000".to_string(),
            transaction_id: "txn-1".to_string(),
            checksum: payment.checksum,
        };
        assert!(matches!(
            flow.complete(forged).await,
            Err(AppError::ChecksumMismatch(_))
        ));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_callback_must_match_prepared_amount() {
        let (flow, store) = flow();
        flow.prepare(prepare_request("ORD-1", "1000.00")).await.unwrap();

        assert!(matches!(
            flow.complete(approved("ORD-1", "1000")).await,
            Err(AppError::ChecksumMismatch(_))
        ));
        assert!(matches!(
            flow.complete(approved("ORD-2", "1000.00")).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_validates_checkout_once() {
        let (flow, _) = flow();

        assert!(matches!(
            flow.prepare(prepare_request("ORD-1", "999")).await,
            Err(AppError::InvalidAmount(_))
        ));

        flow.prepare(prepare_request("ORD-1", "1000")).await.unwrap();
        assert!(matches!(
            flow.prepare(prepare_request("ORD-1", "1000")).await,
            Err(AppError::DuplicateOrder(_))
        ));
    }
}
