//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use checkout_core::pricing::{
    self, MAIN_PRODUCT_ID, MAIN_PRODUCT_NAME, ORDER_BUMPS, OrderBump, PRODUCT_CATEGORY,
};
use checkout_core::validation::{normalize_cep, validate_address, validate_customer};
use checkout_core::{
    Address, Cart, CartSelection, CheckoutError, ConfirmationSnapshot, Customer, DocumentType,
    PixelKind, ShippingMethod, model::CURRENCY,
};
use checkout_payments::AddressPrefill;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::session::{CheckoutSession, PlacedOrder, SessionId, SessionView};
use crate::state::AppState;

const DEFAULT_PAYER_IP: &str = "127.0.0.1";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
    pub gateway_reachable: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub struct ProductInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

#[derive(Serialize)]
pub struct ShippingOption {
    pub key: &'static str,
    pub title: &'static str,
    pub price: Decimal,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub currency: &'static str,
    pub product: ProductInfo,
    pub shipping: Vec<ShippingOption>,
    pub bumps: &'static [OrderBump],
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    /// Reuse an id the page already holds (rehydrates attribution)
    #[serde(default)]
    pub session_id: Option<String>,
    /// Full landing URL; its query string is the attribution source
    #[serde(default)]
    pub landing_url: Option<String>,
    /// Bare query string, used when no landing URL is given
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub selection: CartSelection,
}

#[derive(Debug, Serialize)]
pub struct PixelReadyResponse {
    pub pixel: PixelKind,
    pub flushed: usize,
}

#[derive(Debug, Deserialize)]
pub struct CustomerInput {
    #[serde(alias = "fullName")]
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(alias = "cpf")]
    pub document: String,
}

impl From<CustomerInput> for Customer {
    fn from(input: CustomerInput) -> Self {
        Customer {
            name: input.name,
            email: input.email,
            phone: input.phone,
            document_type: DocumentType::Cpf,
            document: input.document,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub customer: CustomerInput,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub order: PlacedOrder,
    pub confirmation: Option<ConfirmationSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn error_status(err: &CheckoutError) -> (StatusCode, &'static str) {
    match err {
        CheckoutError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        CheckoutError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
        CheckoutError::NotFound(_) => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
        CheckoutError::Gateway { .. } => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
        CheckoutError::GatewayUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNAVAILABLE"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

fn checkout_error(err: CheckoutError) -> ApiError {
    let (status, code) = error_status(&err);
    api_error(status, err.user_message(), code)
}

fn payment_in_progress() -> ApiError {
    api_error(StatusCode::CONFLICT, "Pagamento em andamento", "ORDER_IN_PROGRESS")
}

fn payments_disabled() -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "Payments not configured", "PAYMENTS_DISABLED")
}

/// First `x-forwarded-for` hop, else `x-real-ip`, else loopback
pub fn payer_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .unwrap_or(DEFAULT_PAYER_IP)
        .to_string()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway_reachable = match &state.gateway {
        Some(gateway) => gateway.account_info().await.is_ok(),
        None => false,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.gateway.is_some(),
        gateway_reachable,
        active_sessions: state.sessions.len().await,
    })
}

/// Shipping methods and add-ons
pub async fn catalog() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        currency: CURRENCY,
        product: ProductInfo {
            id: MAIN_PRODUCT_ID,
            name: MAIN_PRODUCT_NAME,
            category: PRODUCT_CATEGORY,
        },
        shipping: ShippingMethod::ALL
            .into_iter()
            .map(|m| ShippingOption {
                key: m.as_str(),
                title: m.title(),
                price: m.price(),
            })
            .collect(),
        bumps: &ORDER_BUMPS,
    })
}

/// Price a selection without touching any session
pub async fn quote_cart(Json(selection): Json<CartSelection>) -> Json<Cart> {
    Json(pricing::quote(&selection))
}

/// Best-effort address prefill
pub async fn lookup_postal_code(
    State(state): State<AppState>,
    Path(cep): Path<String>,
) -> Result<Json<AddressPrefill>, ApiError> {
    if normalize_cep(&cep).is_none() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "CEP inválido", "INVALID_CEP"));
    }
    Ok(Json(state.postal.prefill(&cep).await))
}

/// Open (or resume) a checkout session
pub async fn open_session(
    State(state): State<AppState>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    if let Some(id) = &payload.session_id {
        if let Ok(existing) = state.sessions.get(id).await {
            let view = existing.lock().await.view();
            return Ok((StatusCode::OK, Json(view)));
        }
    }

    let query = payload
        .landing_url
        .as_deref()
        .and_then(|u| url::Url::parse(u).ok())
        .and_then(|u| u.query().map(String::from))
        .or(payload.query)
        .unwrap_or_default();

    let id = payload.session_id.map_or_else(SessionId::new, SessionId::from_string);
    let session = CheckoutSession::open(
        id,
        state.attribution.clone(),
        state.pixels.clone(),
        &query,
        payload.selection,
    );

    let session = state.sessions.insert(session).await;
    let view = session.lock().await.view();
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(checkout_error)?;
    let view = session.lock().await.view();
    Ok(Json(view))
}

/// Change shipping, add-ons or the diagnostic flag
pub async fn update_cart(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(selection): Json<CartSelection>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(checkout_error)?;
    let mut session = session.lock().await;

    if session.has_payment_in_progress() {
        return Err(payment_in_progress());
    }

    session.update_cart(selection);
    Ok(Json(session.view()))
}

/// Pixel script finished loading on the page
pub async fn pixel_ready(
    State(state): State<AppState>,
    Path((id, pixel)): Path<(String, String)>,
) -> Result<Json<PixelReadyResponse>, ApiError> {
    let kind = PixelKind::parse(&pixel).ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("Unknown pixel: {pixel}"), "UNKNOWN_PIXEL")
    })?;

    let session = state.sessions.get(&id).await.map_err(checkout_error)?;
    let flushed = session.lock().await.mark_pixel_ready(kind);

    Ok(Json(PixelReadyResponse { pixel: kind, flushed }))
}

/// Validate the customer, create the PIX transaction, start confirmation
///
/// The session lock is released while the provider call is in flight; the
/// session's submitting flag keeps a second submission out meanwhile.
pub async fn create_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let gateway = state.gateway.clone().ok_or_else(payments_disabled)?;
    let shared = state.sessions.get(&id).await.map_err(checkout_error)?;

    let mut customer = Customer::from(payload.customer);
    validate_customer(&mut customer).map_err(checkout_error)?;

    let address = match payload.address {
        Some(mut address) => {
            validate_address(&mut address).map_err(checkout_error)?;
            Some(address)
        }
        None => None,
    };

    let request = {
        let mut session = shared.lock().await;
        if session.has_payment_in_progress() {
            return Err(payment_in_progress());
        }
        session
            .transaction_request(customer, payer_ip(&headers), &state.config.webhook_url)
            .map_err(checkout_error)?
    };

    let created = gateway.create_transaction(&request).await;
    let mut session = shared.lock().await;

    let transaction = created.map_err(|e| {
        session.abort_submission();
        tracing::error!(session_id = %id, external_id = %request.external_id, error = %e, "Payment processing error");
        checkout_error(e)
    })?;

    let order = session
        .begin_confirmation(
            &transaction,
            request.external_id,
            address,
            gateway,
            state.config.confirmation.clone(),
        )
        .clone();

    tracing::info!(
        session_id = %id,
        transaction_id = %order.transaction_id,
        total = %order.total_amount,
        test_mode = order.test_mode,
        "PIX payment created"
    );

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            success: true,
            order,
            confirmation: session.confirmation(),
        }),
    ))
}

/// Countdown, state and redirect target
pub async fn payment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConfirmationSnapshot>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(checkout_error)?;
    let snapshot = session.lock().await.confirmation();

    snapshot
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Nenhum pagamento em andamento", "NO_PAYMENT"))
}

/// Customer left the payment view
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(checkout_error)?;
    let cancelled = session.lock().await.cancel_confirmation();
    Ok(Json(CancelResponse { cancelled }))
}

/// Direct status lookup
pub async fn check_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(gateway) = state.gateway.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "success": false, "error": "Payments not configured" })),
        );
    };

    match gateway.get_transaction(&id).await {
        Ok(transaction) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "status": transaction.status,
                "transaction": transaction,
            })),
        ),
        Err(e) => {
            tracing::error!(transaction_id = %id, error = %e, "Error checking payment status");
            let (status, _) = error_status(&e);
            (status, Json(serde_json::json!({ "success": false, "error": e.to_string() })))
        }
    }
}

/// LiraPay webhook; always acknowledged
pub async fn lirapay_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    let body = String::from_utf8_lossy(&body);
    tracing::info!(body = %body, "LiraPay webhook received");

    state.webhooks.handle(&body);

    Json(WebhookAck { received: true })
}
