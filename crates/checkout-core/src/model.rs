//! Domain Models
//!
//! Transaction mirror, customer identity and line items exchanged with the
//! payment provider. Uses `rust_decimal` for all monetary values; the
//! provider wire format carries them as JSON numbers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency for every amount in the checkout
pub const CURRENCY: &str = "BRL";

/// Status reported by the payment provider
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Pending,
    Authorized,
    Failed,
    Chargeback,
    InDispute,
    /// Any status string the provider adds later
    Unknown(String),
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Authorized => "AUTHORIZED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Chargeback => "CHARGEBACK",
            TransactionStatus::InDispute => "IN_DISPUTE",
            TransactionStatus::Unknown(s) => s,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, TransactionStatus::Authorized)
    }
}

impl From<String> for TransactionStatus {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "PENDING" => TransactionStatus::Pending,
            "AUTHORIZED" => TransactionStatus::Authorized,
            "FAILED" => TransactionStatus::Failed,
            "CHARGEBACK" => TransactionStatus::Chargeback,
            "IN_DISPUTE" => TransactionStatus::InDispute,
            _ => TransactionStatus::Unknown(s),
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy-paste PIX code returned with a created transaction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixCode {
    #[serde(default)]
    pub payload: String,
}

/// Customer summary echoed back by the provider
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionCustomer {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Read-only mirror of a provider transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Provider transaction id
    pub id: String,

    /// Our correlation id
    #[serde(default)]
    pub external_id: String,

    pub status: TransactionStatus,

    /// Amount charged (the provider calls it `total_value`); zero when a
    /// lookup leaves it out
    #[serde(default, rename = "total_value", with = "rust_decimal::serde::float")]
    pub total: Decimal,

    #[serde(default)]
    pub payment_method: String,

    #[serde(default)]
    pub customer: TransactionCustomer,

    /// Absent on lookups for some providers' older records
    #[serde(default)]
    pub pix: Option<PixCode>,

    #[serde(default, rename = "hasError")]
    pub has_error: bool,
}

impl Transaction {
    /// PIX payload, empty if the provider did not return one
    pub fn pix_payload(&self) -> &str {
        self.pix.as_ref().map_or("", |p| p.payload.as_str())
    }
}

/// Identity document type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    #[default]
    Cpf,
    Cnpj,
}

/// Payer identity as submitted to the provider
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    /// Digits only
    pub phone: String,
    pub document_type: DocumentType,
    /// Digits only
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
}

/// Delivery address collected at step 2
///
/// Kept with the order but never sent to the provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Address {
    pub cep: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "BR".into()
}

/// A cart line as the provider expects it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    pub is_physical: bool,
}

impl LineItem {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_from_provider_json() {
        let json = r#"{
            "id": "tx_123",
            "external_id": "pampers-1-abc",
            "status": "PENDING",
            "total_value": 24.9,
            "customer": {"email": "a@b.com", "name": "Ana"},
            "payment_method": "PIX",
            "pix": {"payload": "00020126..."},
            "hasError": false
        }"#;

        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.total, dec!(24.9));
        assert_eq!(tx.pix_payload(), "00020126...");
    }

    #[test]
    fn test_status_only_lookup_parses() {
        let tx: Transaction = serde_json::from_str(r#"{"id":"tx_9","status":"AUTHORIZED"}"#).unwrap();
        assert_eq!(tx.status, TransactionStatus::Authorized);
        assert_eq!(tx.total, Decimal::ZERO);
        assert_eq!(tx.pix_payload(), "");
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: TransactionStatus = serde_json::from_str(r#""REFUNDED""#).unwrap();
        assert_eq!(status, TransactionStatus::Unknown("REFUNDED".into()));
        assert_eq!(serde_json::to_string(&status).unwrap(), r#""REFUNDED""#);
    }

    #[test]
    fn test_customer_omits_missing_utm() {
        let customer = Customer {
            name: "Ana".into(),
            utm_source: Some("tiktok".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&customer).unwrap();
        assert_eq!(value["document_type"], "CPF");
        assert_eq!(value["utm_source"], "tiktok");
        assert!(value.get("utm_medium").is_none());
    }
}
