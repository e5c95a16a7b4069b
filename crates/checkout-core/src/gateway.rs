//! Payment Gateway Strategy
//!
//! Common interface over the PIX payment provider so the checkout flow and
//! the confirmation poller work against any backend (LiraPay in production,
//! scripted mocks in tests).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::model::{Customer, LineItem, Transaction};

/// Only payment method the checkout offers
pub const PAYMENT_METHOD_PIX: &str = "PIX";

/// Body of a transaction-creation call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub external_id: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,

    pub payment_method: String,

    /// Where the provider pushes status changes
    pub webhook_url: String,

    pub items: Vec<LineItem>,

    /// Payer IP
    pub ip: String,

    pub customer: Customer,
}

impl CreateTransactionRequest {
    /// Provider-side constraints, checked before any network call
    pub fn validate(&self) -> Result<()> {
        if self.total_amount <= Decimal::ZERO {
            return Err(CheckoutError::Validation("amount must be positive".into()));
        }
        if self.items.is_empty() {
            return Err(CheckoutError::Validation("at least one line item is required".into()));
        }
        Ok(())
    }
}

/// Payment provider (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a PIX transaction
    async fn create_transaction(&self, request: &CreateTransactionRequest) -> Result<Transaction>;

    /// Fetch the current state of a transaction
    async fn get_transaction(&self, id: &str) -> Result<Transaction>;

    /// Account details for the configured credentials
    async fn account_info(&self) -> Result<serde_json::Value>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(total: Decimal, items: Vec<LineItem>) -> CreateTransactionRequest {
        CreateTransactionRequest {
            external_id: "pampers-1-abc".into(),
            total_amount: total,
            payment_method: PAYMENT_METHOD_PIX.into(),
            webhook_url: "https://example.com/webhooks/lirapay".into(),
            items,
            ip: "127.0.0.1".into(),
            customer: Customer::default(),
        }
    }

    fn item() -> LineItem {
        LineItem {
            id: "x".into(),
            title: "x".into(),
            description: String::new(),
            price: dec!(1),
            quantity: 1,
            is_physical: false,
        }
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        assert!(request(dec!(0), vec![item()]).validate().is_err());
        assert!(request(dec!(-1), vec![item()]).validate().is_err());
    }

    #[test]
    fn test_rejects_empty_items() {
        assert!(request(dec!(10), vec![]).validate().is_err());
        assert!(request(dec!(10), vec![item()]).validate().is_ok());
    }

    #[test]
    fn test_wire_amount_is_a_number() {
        let value = serde_json::to_value(request(dec!(24.9), vec![item()])).unwrap();
        assert_eq!(value["total_amount"], serde_json::json!(24.9));
        assert_eq!(value["payment_method"], "PIX");
    }
}
