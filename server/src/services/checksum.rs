//! Integrity token for the payment gateway handshake.
//!
//! The gateway recomputes the token from the same inputs, so the byte layout
//! is a fixed external contract: HMAC-SHA256 keyed with the shared secret over
//! `service_id || order_id || amount`, hex encoded in lowercase. The amount is
//! hashed exactly as the string sent on the wire; `"1000"` and `"1000.00"`
//! produce different tokens.
//!
//! The handshake token is handed to the customer's browser, so it proves
//! nothing about payment. The gateway's completion callback carries a
//! separate approval signature over the transaction id, keyed with a key
//! derived from the shared secret. Only the gateway can produce it.

use std::str::FromStr;

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;

use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const APPROVAL_KEY_CONTEXT: &[u8] = b"payment-approval-v1";

pub fn compute_checksum(
    service_id: &str,
    order_id: &str,
    amount: &str,
    secret: &str,
) -> Result<String, AppError> {
    let mac = keyed_mac(service_id, order_id, amount, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Approval signature over a completed payment, as the gateway computes it.
pub fn compute_approval(
    service_id: &str,
    order_id: &str,
    amount: &str,
    transaction_id: &str,
    secret: &str,
) -> Result<String, AppError> {
    let mac = approval_mac(service_id, order_id, amount, transaction_id, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of the approval signature on a gateway callback.
pub fn verify_approval(
    service_id: &str,
    order_id: &str,
    amount: &str,
    transaction_id: &str,
    secret: &str,
    checksum: &str,
) -> Result<(), AppError> {
    let mac = approval_mac(service_id, order_id, amount, transaction_id, secret)?;
    verify_mac(mac, order_id, checksum)
}

fn verify_mac(mac: HmacSha256, order_id: &str, checksum: &str) -> Result<(), AppError> {
    let received =
        hex::decode(checksum).map_err(|_| AppError::ChecksumMismatch(order_id.to_string()))?;

    mac.verify_slice(&received).map_err(|_| {
        tracing::warn!(order_id = %order_id, "payment checksum verification failed");
        AppError::ChecksumMismatch(order_id.to_string())
    })
}

fn keyed_mac(
    service_id: &str,
    order_id: &str,
    amount: &str,
    secret: &str,
) -> Result<HmacSha256, AppError> {
    require("service_id", service_id)?;
    require("order_id", order_id)?;
    require("secret", secret)?;
    validate_amount(amount)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(service_id.as_bytes());
    mac.update(order_id.as_bytes());
    mac.update(amount.as_bytes());
    Ok(mac)
}

/// Fields are length-prefixed so no two field tuples hash the same bytes.
fn approval_mac(
    service_id: &str,
    order_id: &str,
    amount: &str,
    transaction_id: &str,
    secret: &str,
) -> Result<HmacSha256, AppError> {
    require("service_id", service_id)?;
    require("order_id", order_id)?;
    require("transaction_id", transaction_id)?;
    require("secret", secret)?;
    validate_amount(amount)?;

    let mut derive = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {e}")))?;
    derive.update(APPROVAL_KEY_CONTEXT);
    let key = derive.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| AppError::Internal(format!("HMAC key rejected: {e}")))?;
    for field in [service_id, order_id, amount, transaction_id] {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field.as_bytes());
    }
    Ok(mac)
}

fn require(name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::MissingParameter(name.to_string()));
    }
    Ok(())
}

/// Only plain positive decimals are accepted: digits with an optional
/// fractional part. Grouping separators, signs and whitespace are rejected so
/// the hashed bytes always equal what the gateway will see.
fn validate_amount(amount: &str) -> Result<(), AppError> {
    let plain = !amount.is_empty()
        && amount.chars().all(|c| c.is_ascii_digit() || c == '.')
        && amount.matches('.').count() <= 1
        && !amount.starts_with('.')
        && !amount.ends_with('.');
    if !plain {
        return Err(AppError::InvalidAmount(amount.to_string()));
    }

    match Decimal::from_str(amount) {
        Ok(value) if value > Decimal::ZERO => Ok(()),
        _ => Err(AppError::InvalidAmount(amount.to_string())),
    }
}
