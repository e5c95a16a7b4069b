//! PIX Checkout HTTP Server
//!
//! Axum-based server backing the single-product checkout funnel: pricing,
//! checkout sessions with attribution and pixel queues, PIX payment via
//! LiraPay with server-side confirmation polling, and the provider webhook.

mod config;
mod handlers;
mod routes;
mod session;
mod state;

use std::sync::Arc;

use checkout_core::{MemoryAttributionStore, PaymentGateway, TracingPixelSink};
use checkout_payments::{LiraPayClient, ViaCepClient, WebhookHandler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    // Initialize payments
    let gateway: Option<Arc<dyn PaymentGateway>> = match LiraPayClient::from_env() {
        Ok(client) => {
            tracing::info!("✓ LiraPay configured");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!("⚠ LiraPay not configured - payments disabled ({e})");
            tracing::warn!("  Set LIRAPAY_API_SECRET in .env");
            None
        }
    };

    if let Some(gateway) = &gateway {
        match gateway.account_info().await {
            Ok(_) => tracing::info!("✓ LiraPay account reachable"),
            Err(e) => tracing::warn!("⚠ LiraPay account check failed: {}", e.user_message()),
        }
    }

    let postal = match &config.viacep_base_url {
        Some(url) => ViaCepClient::new(url.clone())?,
        None => ViaCepClient::from_env()?,
    };

    let sessions = Arc::new(SessionStore::with_idle_ttl(config.session_idle_ttl));
    sessions.spawn_sweeper(config.session_sweep_interval);

    // Build application state
    let state = AppState {
        gateway,
        sessions,
        attribution: Arc::new(MemoryAttributionStore::new()),
        pixels: Arc::new(TracingPixelSink),
        postal: Arc::new(postal),
        webhooks: Arc::new(WebhookHandler::new()),
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 checkout server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                              - Health check");
    tracing::info!("  GET    /api/catalog                         - Shipping and add-ons");
    tracing::info!("  POST   /api/cart/quote                      - Price a selection");
    tracing::info!("  GET    /api/postal-codes/{{cep}}              - Address prefill");
    tracing::info!("  POST   /api/sessions                        - Open checkout session");
    tracing::info!("  PUT    /api/sessions/{{id}}/cart              - Update cart");
    tracing::info!("  POST   /api/sessions/{{id}}/pixels/{{pixel}}/ready - Pixel loaded");
    tracing::info!("  POST   /api/sessions/{{id}}/payment           - Create PIX payment");
    tracing::info!("  GET    /api/sessions/{{id}}/payment           - Confirmation status");
    tracing::info!("  DELETE /api/sessions/{{id}}/payment           - Go back");
    tracing::info!("  GET    /api/transactions/{{id}}               - Transaction status");
    tracing::info!("  POST   /webhooks/lirapay                    - LiraPay webhook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
