//! Payment Error Types

use checkout_core::CheckoutError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors raised outside the `PaymentGateway` calls
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Postal code is not 8 digits
    #[error("Invalid postal code: {0}")]
    InvalidPostalCode(String),

    /// Lookup service knows nothing about the postal code
    #[error("Postal code not found: {0}")]
    PostalCodeNotFound(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Http(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Config(_) => "Pagamentos indisponíveis no momento.",
            PaymentError::InvalidPostalCode(_) => "CEP inválido.",
            PaymentError::PostalCodeNotFound(_) => "CEP não encontrado.",
            _ => "Erro ao processar a solicitação.",
        }
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Config(msg) => CheckoutError::Config(msg),
            PaymentError::Http(e) => CheckoutError::GatewayUnavailable(e.to_string()),
            PaymentError::InvalidPostalCode(cep) => CheckoutError::Validation(format!("CEP inválido: {cep}")),
            PaymentError::PostalCodeNotFound(cep) => CheckoutError::NotFound(cep),
            PaymentError::WebhookParse(msg) => CheckoutError::Validation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_into_checkout_error() {
        let err: CheckoutError = PaymentError::Config("LIRAPAY_API_SECRET not set".into()).into();
        assert!(matches!(err, CheckoutError::Config(_)));

        let err: CheckoutError = PaymentError::PostalCodeNotFound("00000000".into()).into();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(PaymentError::InvalidPostalCode("1".into()).user_message(), "CEP inválido.");
        assert!(!PaymentError::WebhookParse("eof".into()).is_retryable());
    }
}
