//! Checkout Sessions
//!
//! One session per visitor: attribution, pixel queues, the current cart and,
//! once the customer pays, the placed order with its confirmation poller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use checkout_core::gateway::PAYMENT_METHOD_PIX;
use checkout_core::pricing::{self, FALLBACK_CHECKOUT_VALUE};
use checkout_core::{
    Address, AttributionContext, AttributionStore, Cart, CartSelection, CheckoutError, ConfirmationConfig,
    ConfirmationSnapshot, ConversionTracker, CreateTransactionRequest, Customer, OnAuthorized,
    PaymentGateway, PaymentPoller, PixelKind, PixelSink, PollerHandle, Result, Transaction, UtmParams,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

const QR_CODE_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Sessions untouched for this long are dropped, with their poller
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction created for the session
#[derive(Clone, Debug, Serialize)]
pub struct PlacedOrder {
    pub transaction_id: String,
    pub external_id: String,
    pub pix_payload: String,
    pub qr_code_url: String,
    /// Amount as reported back by the provider
    pub total_amount: Decimal,
    pub test_mode: bool,
    /// Delivery address; never sent to the provider
    pub address: Option<Address>,
    pub created_at: DateTime<Utc>,
}

/// Readiness of one pixel
#[derive(Clone, Debug, Serialize)]
pub struct PixelStatus {
    pub pixel: PixelKind,
    pub ready: bool,
    pub pending: usize,
}

/// Serializable view of a session
#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub attribution: UtmParams,
    pub cart: Cart,
    pub pixels: Vec<PixelStatus>,
    pub order: Option<PlacedOrder>,
    pub confirmation: Option<ConfirmationSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A visitor's checkout
pub struct CheckoutSession {
    pub id: SessionId,
    attribution: AttributionContext,
    tracker: Arc<Mutex<ConversionTracker>>,
    selection: CartSelection,
    cart: Cart,
    order: Option<PlacedOrder>,
    /// A creation request is out at the provider
    submitting: bool,
    poller: Option<PollerHandle>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Open a session: capture attribution and fire InitiateCheckout
    pub fn open(
        id: SessionId,
        store: Arc<dyn AttributionStore>,
        sink: Arc<dyn PixelSink>,
        landing_query: &str,
        selection: CartSelection,
    ) -> Self {
        let now = Utc::now();
        let mut attribution = AttributionContext::new(id.as_str(), store);
        let utm = attribution.capture(landing_query);
        let cart = pricing::quote(&selection);

        let session = Self {
            id,
            attribution,
            tracker: Arc::new(Mutex::new(ConversionTracker::new(sink))),
            selection,
            cart,
            order: None,
            submitting: false,
            poller: None,
            created_at: now,
            updated_at: now,
        };

        let value = if session.cart.total > Decimal::ZERO {
            session.cart.total
        } else {
            FALLBACK_CHECKOUT_VALUE
        };
        session.with_tracker(|t| t.initiate_checkout(value, &utm));

        tracing::info!(session_id = %session.id, value = %value, "Checkout session opened");
        session
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn order(&self) -> Option<&PlacedOrder> {
        self.order.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// An order exists or is being created
    pub fn has_payment_in_progress(&self) -> bool {
        self.submitting || self.order.is_some()
    }

    /// Replace the selection; AddToCart fires for each newly added add-on
    pub fn update_cart(&mut self, selection: CartSelection) -> &Cart {
        let utm = self.attribution.params();
        let diagnostic = selection.test_mode;

        let added: Vec<u32> = selection
            .bumps
            .difference(&self.selection.bumps)
            .copied()
            .collect();

        for id in added {
            if let Some(bump) = pricing::find_bump(id) {
                let price = pricing::bump_price(id, diagnostic);
                self.with_tracker(|t| t.add_to_cart(price, &bump.content_id(), bump.title, &utm));
            }
        }

        self.cart = pricing::quote(&selection);
        self.selection = selection;
        self.touch();
        &self.cart
    }

    /// Pixel script loaded on the page; returns the number of flushed events
    pub fn mark_pixel_ready(&mut self, kind: PixelKind) -> usize {
        let mut flushed = 0;
        self.with_tracker(|t| flushed = t.mark_ready(kind));
        self.touch();
        flushed
    }

    /// Build the provider request for the current cart and mark the session
    /// as submitting until `begin_confirmation` or `abort_submission`
    pub fn transaction_request(
        &mut self,
        mut customer: Customer,
        ip: String,
        webhook_url: &str,
    ) -> Result<CreateTransactionRequest> {
        if !self.cart.is_chargeable() {
            return Err(CheckoutError::Validation("Selecione uma opção de frete".into()));
        }

        self.attribution.params().apply_to(&mut customer);
        self.submitting = true;
        self.touch();

        Ok(CreateTransactionRequest {
            external_id: external_id(self.cart.external_id_prefix()),
            total_amount: self.cart.total,
            payment_method: PAYMENT_METHOD_PIX.into(),
            webhook_url: webhook_url.to_string(),
            items: self.cart.items.clone(),
            ip,
            customer,
        })
    }

    /// The provider refused the request
    pub fn abort_submission(&mut self) {
        self.submitting = false;
        self.touch();
    }

    /// Record the created transaction and start waiting for payment
    pub fn begin_confirmation(
        &mut self,
        transaction: &Transaction,
        external_id: String,
        address: Option<Address>,
        gateway: Arc<dyn PaymentGateway>,
        config: ConfirmationConfig,
    ) -> &PlacedOrder {
        self.cancel_confirmation();
        self.submitting = false;

        let utm = self.attribution.params();
        let tracker = Arc::clone(&self.tracker);
        let created_total = transaction.total;
        let on_authorized: OnAuthorized = Box::new(move |tx: &Transaction| {
            // lookups may omit the amount
            let value = if tx.total > Decimal::ZERO { tx.total } else { created_total };
            match tracker.lock() {
                Ok(mut tracker) => tracker.purchase(value, &tx.id, &utm),
                Err(e) => tracing::warn!(transaction_id = %tx.id, error = %e, "Purchase event dropped"),
            }
        });

        self.poller = Some(PaymentPoller::spawn(gateway, transaction.id.clone(), config, on_authorized));
        self.touch();

        self.order.insert(PlacedOrder {
            transaction_id: transaction.id.clone(),
            external_id,
            pix_payload: transaction.pix_payload().to_string(),
            qr_code_url: qr_code_url(transaction.pix_payload()),
            total_amount: transaction.total,
            test_mode: self.cart.test_mode,
            address,
            created_at: Utc::now(),
        })
    }

    pub fn confirmation(&self) -> Option<ConfirmationSnapshot> {
        self.poller.as_ref().map(PollerHandle::snapshot)
    }

    /// Customer went back: stop the timers and forget the order
    pub fn cancel_confirmation(&mut self) -> bool {
        let had_order = self.order.take().is_some();
        if let Some(poller) = self.poller.take() {
            poller.cancel();
            tracing::info!(session_id = %self.id, "Payment confirmation cancelled");
        }
        self.touch();
        had_order
    }

    pub fn view(&mut self) -> SessionView {
        let pixels = match self.tracker.lock() {
            Ok(tracker) => PixelKind::ALL
                .into_iter()
                .filter_map(|kind| tracker.channel(kind))
                .map(|c| PixelStatus {
                    pixel: c.kind(),
                    ready: c.is_ready(),
                    pending: c.pending_len(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        SessionView {
            session_id: self.id.to_string(),
            attribution: self.attribution.params(),
            cart: self.cart.clone(),
            pixels,
            order: self.order.clone(),
            confirmation: self.confirmation(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn with_tracker(&self, f: impl FnOnce(&mut ConversionTracker)) {
        match self.tracker.lock() {
            Ok(mut tracker) => f(&mut tracker),
            Err(e) => tracing::warn!(session_id = %self.id, error = %e, "Pixel tracker unavailable"),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// `<prefix>-<unix millis>-<9 random chars>`
pub fn external_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", Utc::now().timestamp_millis(), &random[..9])
}

/// QR image for a PIX payload
pub fn qr_code_url(payload: &str) -> String {
    url::Url::parse_with_params(QR_CODE_ENDPOINT, &[("size", "300x300"), ("data", payload)])
        .map(String::from)
        .unwrap_or_default()
}

pub type SharedSession = Arc<tokio::sync::Mutex<CheckoutSession>>;

struct StoredSession {
    session: SharedSession,
    last_seen: Instant,
}

/// Live sessions, evicted after sitting idle
pub struct SessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_SESSION_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub async fn insert(&self, session: CheckoutSession) -> SharedSession {
        let key = session.id.to_string();
        let session = Arc::new(tokio::sync::Mutex::new(session));
        self.sessions.write().await.insert(
            key,
            StoredSession {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        session
    }

    /// Fetch a session and mark it as seen
    pub async fn get(&self, id: &str) -> Result<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| CheckoutError::SessionNotFound(id.to_string()))?;
        entry.last_seen = Instant::now();
        Ok(Arc::clone(&entry.session))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle past the TTL and stop their pollers.
    ///
    /// A session that is locked or waiting on the provider counts as active.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.idle_ttl;
        let mut evicted = Vec::new();

        self.sessions.write().await.retain(|id, entry| {
            if now.duration_since(entry.last_seen) < ttl {
                return true;
            }
            match entry.session.try_lock() {
                Ok(mut session) if !session.is_submitting() => {
                    session.cancel_confirmation();
                    evicted.push(id.clone());
                    false
                }
                _ => true,
            }
        });

        for id in &evicted {
            tracing::info!(session_id = %id, "Idle checkout session evicted");
        }
        evicted.len()
    }

    /// Run `evict_idle` every `every` until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(live) = store.upgrade() else { break };
                let evicted = live.evict_idle().await;
                if evicted > 0 {
                    let remaining = live.len().await;
                    tracing::debug!(evicted, remaining, "Session sweep");
                }
            }
        })
    }
}
