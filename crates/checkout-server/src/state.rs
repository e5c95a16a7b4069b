//! Application State

use std::sync::Arc;

use checkout_core::{AttributionStore, PaymentGateway, PixelSink};
use checkout_payments::{ViaCepClient, WebhookHandler};

use crate::config::ServerConfig;
use crate::session::SessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment provider (None if not configured)
    pub gateway: Option<Arc<dyn PaymentGateway>>,

    /// Live checkout sessions
    pub sessions: Arc<SessionStore>,

    /// Attribution bundles, keyed by session id
    pub attribution: Arc<dyn AttributionStore>,

    /// Where pixel events go
    pub pixels: Arc<dyn PixelSink>,

    /// Address prefill
    pub postal: Arc<ViaCepClient>,

    pub webhooks: Arc<WebhookHandler>,

    pub config: Arc<ServerConfig>,
}
