//! Attribution Context
//!
//! Captures UTM and click-id parameters from the landing URL once per
//! checkout session and attaches them to every conversion event.
//!
//! The context is constructed per session and passed down explicitly; the
//! bundle is persisted through an [`AttributionStore`] so a rebuilt context
//! for the same session rehydrates it instead of starting empty.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::model::Customer;

/// Attribution parameters recognized on the landing URL
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbclid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
}

impl UtmParams {
    /// Parse a query string, with or without the leading `?`
    ///
    /// Empty values are treated as absent.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut params = Self::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "utm_source" => &mut params.utm_source,
                "utm_medium" => &mut params.utm_medium,
                "utm_campaign" => &mut params.utm_campaign,
                "utm_content" => &mut params.utm_content,
                "utm_term" => &mut params.utm_term,
                "fbclid" => &mut params.fbclid,
                "gclid" => &mut params.gclid,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }

        params
    }

    /// Parse the query part of a full landing URL
    pub fn from_url(landing_url: &str) -> Self {
        url::Url::parse(landing_url)
            .ok()
            .and_then(|u| u.query().map(Self::from_query))
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Present parameters as key/value pairs, in a stable order
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("utm_source", &self.utm_source),
            ("utm_medium", &self.utm_medium),
            ("utm_campaign", &self.utm_campaign),
            ("utm_content", &self.utm_content),
            ("utm_term", &self.utm_term),
            ("fbclid", &self.fbclid),
            ("gclid", &self.gclid),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }

    /// Copy the UTM fields onto the payer record sent to the provider
    pub fn apply_to(&self, customer: &mut Customer) {
        customer.utm_source.clone_from(&self.utm_source);
        customer.utm_medium.clone_from(&self.utm_medium);
        customer.utm_campaign.clone_from(&self.utm_campaign);
        customer.utm_content.clone_from(&self.utm_content);
        customer.utm_term.clone_from(&self.utm_term);
    }
}

/// Session-scoped attribution storage
pub trait AttributionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Option<UtmParams>>;

    fn save(&self, session_id: &str, params: &UtmParams) -> Result<()>;
}

/// In-memory attribution store
#[derive(Default)]
pub struct MemoryAttributionStore {
    entries: RwLock<HashMap<String, UtmParams>>,
}

impl MemoryAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributionStore for MemoryAttributionStore {
    fn load(&self, session_id: &str) -> Result<Option<UtmParams>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CheckoutError::Storage(e.to_string()))?;
        Ok(entries.get(session_id).cloned())
    }

    fn save(&self, session_id: &str, params: &UtmParams) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CheckoutError::Storage(e.to_string()))?;
        entries.insert(session_id.to_string(), params.clone());
        Ok(())
    }
}

/// Attribution for one checkout session
pub struct AttributionContext {
    session_id: String,
    store: Arc<dyn AttributionStore>,
    params: Option<UtmParams>,
}

impl AttributionContext {
    pub fn new(session_id: impl Into<String>, store: Arc<dyn AttributionStore>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            params: None,
        }
    }

    /// Capture parameters from the landing query string
    ///
    /// The first non-empty bundle wins and is persisted; later captures
    /// leave it untouched.
    pub fn capture(&mut self, query: &str) -> UtmParams {
        let current = self.params();
        if !current.is_empty() {
            return current;
        }

        let captured = UtmParams::from_query(query);
        if captured.is_empty() {
            return captured;
        }

        if let Err(e) = self.store.save(&self.session_id, &captured) {
            tracing::warn!(session_id = %self.session_id, error = %e, "Failed to persist attribution");
        }
        tracing::debug!(session_id = %self.session_id, params = ?captured, "Captured attribution");

        self.params = Some(captured.clone());
        captured
    }

    /// Current bundle: cached, else rehydrated from the store, else empty
    pub fn params(&mut self) -> UtmParams {
        if let Some(params) = &self.params {
            return params.clone();
        }

        match self.store.load(&self.session_id) {
            Ok(Some(saved)) => {
                self.params = Some(saved.clone());
                saved
            }
            Ok(None) => UtmParams::default(),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to load attribution");
                UtmParams::default()
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
