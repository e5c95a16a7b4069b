//! Postal-code Lookup
//!
//! Best-effort address prefill from ViaCEP. Any failure leaves the fields
//! blank for the customer to type.

use std::time::Duration;

use checkout_core::validation::normalize_cep;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

pub const DEFAULT_BASE_URL: &str = "https://viacep.com.br";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Address fields the lookup can fill
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPrefill {
    pub cep: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    bairro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
    /// `true`, or `"true"` on newer API versions
    #[serde(default)]
    erro: Option<serde_json::Value>,
}

impl ViaCepResponse {
    fn is_error(&self) -> bool {
        match &self.erro {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        }
    }

    fn into_prefill(self, cep: String) -> AddressPrefill {
        AddressPrefill {
            cep,
            street: self.logradouro,
            neighborhood: self.bairro,
            city: self.localidade,
            state: self.uf,
        }
    }
}

/// ViaCEP client
#[derive(Clone)]
pub struct ViaCepClient {
    client: reqwest::Client,
    base_url: String,
}

impl ViaCepClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `VIACEP_BASE_URL`, else the public endpoint
    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var("VIACEP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()))
    }

    fn lookup_url(&self, cep: &str) -> String {
        format!("{}/ws/{cep}/json/", self.base_url)
    }

    /// Look up a CEP, formatted or not
    pub async fn lookup(&self, cep: &str) -> Result<AddressPrefill> {
        let cep = normalize_cep(cep).ok_or_else(|| PaymentError::InvalidPostalCode(cep.to_string()))?;

        let response: ViaCepResponse = self
            .client
            .get(self.lookup_url(&cep))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.is_error() {
            return Err(PaymentError::PostalCodeNotFound(cep));
        }

        Ok(response.into_prefill(cep))
    }

    /// Lookup that never fails; blank fields on any error
    pub async fn prefill(&self, cep: &str) -> AddressPrefill {
        match self.lookup(cep).await {
            Ok(prefill) => prefill,
            Err(e) => {
                tracing::warn!(cep = %cep, error = %e, "Postal code lookup failed");
                AddressPrefill {
                    cep: normalize_cep(cep).unwrap_or_default(),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_url() {
        let client = ViaCepClient::new("https://viacep.test/").unwrap();
        assert_eq!(client.lookup_url("01310100"), "https://viacep.test/ws/01310100/json/");
    }

    #[test]
    fn test_maps_response_fields() {
        let response: ViaCepResponse = serde_json::from_str(
            r#"{"cep":"01310-100","logradouro":"Avenida Paulista","bairro":"Bela Vista","localidade":"São Paulo","uf":"SP"}"#,
        )
        .unwrap();

        assert!(!response.is_error());
        let prefill = response.into_prefill("01310100".into());
        assert_eq!(prefill.street, "Avenida Paulista");
        assert_eq!(prefill.city, "São Paulo");
        assert_eq!(prefill.state, "SP");
    }

    #[test]
    fn test_error_flag_forms() {
        let bool_flag: ViaCepResponse = serde_json::from_str(r#"{"erro":true}"#).unwrap();
        let str_flag: ViaCepResponse = serde_json::from_str(r#"{"erro":"true"}"#).unwrap();
        assert!(bool_flag.is_error());
        assert!(str_flag.is_error());
    }

    #[tokio::test]
    async fn test_invalid_cep_prefills_blank() {
        let client = ViaCepClient::new("http://127.0.0.1:9").unwrap();

        assert!(matches!(client.lookup("123").await, Err(PaymentError::InvalidPostalCode(_))));

        let prefill = client.prefill("123").await;
        assert_eq!(prefill, AddressPrefill::default());
    }
}
