//! Router

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    cancel_payment, catalog, check_transaction, create_payment, get_session, health_check,
    lirapay_webhook, lookup_postal_code, open_session, payment_status, pixel_ready, quote_cart,
    update_cart,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & catalog
        .route("/health", get(health_check))
        .route("/api/catalog", get(catalog))
        .route("/api/cart/quote", post(quote_cart))
        .route("/api/postal-codes/{cep}", get(lookup_postal_code))

        // Checkout sessions
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/cart", put(update_cart))
        .route("/api/sessions/{id}/pixels/{pixel}/ready", post(pixel_ready))
        .route(
            "/api/sessions/{id}/payment",
            post(create_payment).get(payment_status).delete(cancel_payment),
        )

        // Payments
        .route("/api/transactions/{id}", get(check_transaction))
        .route("/webhooks/lirapay", post(lirapay_webhook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
