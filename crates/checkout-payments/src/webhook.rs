//! LiraPay Webhook Handling
//!
//! Status notifications pushed by the provider. They are logged and
//! acknowledged; the confirmation poller stays the source of truth for the
//! checkout, so nothing here changes session state.

use checkout_core::TransactionStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{PaymentError, Result};

/// Notification body as LiraPay sends it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub external_id: String,

    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total_amount: Option<Decimal>,

    #[serde(default = "unknown_status", deserialize_with = "any_status")]
    pub status: TransactionStatus,

    #[serde(default)]
    pub payment_method: String,
}

fn unknown_status() -> TransactionStatus {
    TransactionStatus::Unknown(String::new())
}

/// Non-string statuses are kept as their JSON text
fn any_status<'de, D>(deserializer: D) -> std::result::Result<TransactionStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(status) => TransactionStatus::from(status),
        other => TransactionStatus::Unknown(other.to_string()),
    })
}

/// What the handler made of a delivery
#[derive(Clone, Debug)]
pub enum WebhookEvent {
    /// Well-formed notification
    Notification {
        notification: WebhookNotification,
        received_at: DateTime<Utc>,
    },

    /// Body that could not be parsed; still acknowledged
    Malformed { error: String },
}

/// Parse a raw webhook body
pub fn parse_notification(body: &str) -> Result<WebhookNotification> {
    serde_json::from_str(body).map_err(|e| PaymentError::WebhookParse(e.to_string()))
}

/// Webhook handler
#[derive(Clone, Debug, Default)]
pub struct WebhookHandler;

impl WebhookHandler {
    pub fn new() -> Self {
        Self
    }

    /// Process a delivery; never fails so the caller can always acknowledge
    pub fn handle(&self, body: &str) -> WebhookEvent {
        let notification = match parse_notification(body) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Webhook processing error");
                return WebhookEvent::Malformed { error: e.to_string() };
            }
        };

        let id = notification.id.as_str();
        match &notification.status {
            TransactionStatus::Authorized => {
                tracing::info!(transaction_id = %id, external_id = %notification.external_id, "Payment authorized");
            }
            TransactionStatus::Failed => {
                tracing::warn!(transaction_id = %id, "Payment failed");
            }
            TransactionStatus::Chargeback => {
                tracing::warn!(transaction_id = %id, "Chargeback");
            }
            TransactionStatus::InDispute => {
                tracing::warn!(transaction_id = %id, "Dispute");
            }
            other => {
                tracing::info!(transaction_id = %id, status = %other, "Unknown status");
            }
        }

        WebhookEvent::Notification {
            notification,
            received_at: Utc::now(),
        }
    }
}
