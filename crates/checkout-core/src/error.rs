//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout error types
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Payment provider returned a non-2xx response
    #[error("Gateway error: {status} - {body}")]
    Gateway { status: u16, body: String },

    /// Payment provider could not be reached
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Transaction id unknown to the provider
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Input rejected before submission
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkout session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Attribution or session storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Conversion pixel delivery failed
    #[error("Pixel error: {0}")]
    Pixel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CheckoutError {
    /// Check if error is retryable
    ///
    /// Nothing in the checkout retries automatically; callers use this only
    /// to decide whether to tell the user to try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::GatewayUnavailable(_) | CheckoutError::Storage(_)
        ) || matches!(self, CheckoutError::Gateway { status, .. } if *status >= 500)
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Gateway { status, body } => {
                format!("Erro no pagamento: {status} - {body}")
            }
            CheckoutError::GatewayUnavailable(_) => {
                "O serviço de pagamento está indisponível. Tente novamente.".into()
            }
            CheckoutError::NotFound(_) => "Transação não encontrada.".into(),
            CheckoutError::Validation(msg) => msg.clone(),
            CheckoutError::SessionNotFound(_) => "Sessão de checkout expirada.".into(),
            _ => "Erro interno. Tente novamente.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_5xx_is_retryable() {
        let err = CheckoutError::Gateway { status: 502, body: "{}".into() };
        assert!(err.is_retryable());

        let err = CheckoutError::Gateway { status: 400, body: "{}".into() };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_gateway_message_carries_raw_body() {
        let err = CheckoutError::Gateway {
            status: 422,
            body: r#"{"message":"invalid document"}"#.into(),
        };
        assert!(err.user_message().contains("invalid document"));
    }
}
