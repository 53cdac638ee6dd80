use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/gate_ticketing";
const DEFAULT_IMAGE_DIR: &str = "./ticket-images";
const DEFAULT_IMAGE_BASE_URL: &str = "/ticket-images";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Gateway credentials shared with the payment vendor.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub service_id: String,
    pub secret: String,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub payment: PaymentConfig,
    pub ticket_image_dir: PathBuf,
    pub ticket_image_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout: Duration::from_secs(parse_or("DB_ACQUIRE_TIMEOUT_SECS", 5)?),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 10)?),
            payment: PaymentConfig {
                service_id: required("PAYMENT_SERVICE_ID")?,
                secret: required("PAYMENT_SECRET")?,
                return_url: required("PAYMENT_RETURN_URL")?,
            },
            ticket_image_dir: env::var("TICKET_IMAGE_DIR")
                .unwrap_or_else(|_| DEFAULT_IMAGE_DIR.to_string())
                .into(),
            ticket_image_base_url: env::var("TICKET_IMAGE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_BASE_URL.to_string()),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_falls_back_to_default() {
        std::env::remove_var("GATE_TEST_UNSET_TIMEOUT");
        let value: u64 = parse_or("GATE_TEST_UNSET_TIMEOUT", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        std::env::set_var("GATE_TEST_BAD_TIMEOUT", "soon");
        let result: Result<u64, _> = parse_or("GATE_TEST_BAD_TIMEOUT", 7);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        std::env::remove_var("GATE_TEST_BAD_TIMEOUT");
    }

    #[test]
    fn test_required_rejects_blank() {
        std::env::set_var("GATE_TEST_BLANK_SECRET", "  ");
        assert!(matches!(
            required("GATE_TEST_BLANK_SECRET"),
            Err(ConfigError::Missing(_))
        ));
        std::env::remove_var("GATE_TEST_BLANK_SECRET");
    }
}
