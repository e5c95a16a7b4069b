//! # checkout-payments
//!
//! Provider integrations for the PIX checkout.
//!
//! ## Payment Flow
//!
//! ```text
//! ┌─────────────┐  POST /v1/transactions   ┌─────────────┐
//! │  Checkout   │─────────────────────────▶│   LiraPay   │
//! │   Server    │◀─── pix.payload ─────────│             │
//! │             │                          │             │
//! │  (poller)   │── GET /v1/transactions ─▶│             │
//! │             │◀── status ───────────────│             │
//! │             │                          │             │
//! │  /webhooks  │◀── POST status change ───│             │
//! └─────────────┘                          └─────────────┘
//! ```
//!
//! Polling decides the outcome; the webhook is acknowledged and logged.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::LiraPayClient;
//! use checkout_core::PaymentGateway;
//!
//! let client = LiraPayClient::from_env()?;
//! let tx = client.create_transaction(&request).await?;
//! println!("{}", tx.pix_payload());
//! ```

mod error;
mod lirapay;
mod mock;
mod postal;
mod webhook;

pub use error::{PaymentError, Result};
pub use lirapay::{LiraPayClient, LiraPayConfig};
pub use mock::MockGateway;
pub use postal::{AddressPrefill, ViaCepClient};
pub use webhook::{WebhookEvent, WebhookHandler, WebhookNotification, parse_notification};
