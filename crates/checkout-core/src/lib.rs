//! # checkout-core
//!
//! Domain logic for a single-product PIX checkout funnel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Checkout Session                        │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │   Pricing   │  │ Attribution  │  │   PaymentGateway     │  │
//! │  │ Calculator  │  │   Context    │  │   (Strategy)         │  │
//! │  └─────────────┘  └──────┬───────┘  └──────────┬───────────┘  │
//! │                          │                     │              │
//! │                   ┌──────▼───────┐     ┌───────▼──────────┐   │
//! │                   │  Conversion  │◀────│ PaymentPoller    │   │
//! │                   │   Tracker    │     │ (countdown+poll) │   │
//! │                   └──────────────┘     └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `PaymentGateway` trait keeps the poller and the checkout flow
//! independent of the provider; `checkout-payments` supplies LiraPay.

pub mod attribution;
pub mod confirmation;
pub mod error;
pub mod gateway;
pub mod model;
pub mod pixel;
pub mod pricing;
pub mod validation;

pub use attribution::{AttributionContext, AttributionStore, MemoryAttributionStore, UtmParams};
pub use confirmation::{
    ConfirmationConfig, ConfirmationSnapshot, ConfirmationState, Countdown, OnAuthorized,
    PaymentConfirmation, PaymentPoller, PollerHandle,
};
pub use error::{CheckoutError, Result};
pub use gateway::{CreateTransactionRequest, PaymentGateway};
pub use model::{Address, Customer, DocumentType, LineItem, Transaction, TransactionStatus};
pub use pixel::{
    ConversionEvent, ConversionTracker, PixelKind, PixelSink, RecordingPixelSink, TracingPixelSink,
};
pub use pricing::{Cart, CartSelection, ShippingMethod};
