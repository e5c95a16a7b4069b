//! Conversion Pixels
//!
//! Funnel events (InitiateCheckout, AddToCart, Purchase) fanned out to the
//! Meta and TikTok pixels.
//!
//! A pixel that has not signalled readiness yet buffers events; the first
//! `mark_ready` flushes the buffer in order and later events go straight
//! through.
//!
//! ```text
//!             track()                 mark_ready()
//!   ┌────────┐ ───────▶ ┌──────────┐ ────────────▶ ┌────────┐
//!   │ event  │          │ pending  │   drain once  │  sink  │
//!   └────────┘ ──ready─────────────────────────────▶└────────┘
//! ```

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::attribution::UtmParams;
use crate::error::{CheckoutError, Result};
use crate::model::CURRENCY;
use crate::pricing::{MAIN_PRODUCT_ID, MAIN_PRODUCT_NAME, PRODUCT_CATEGORY};

/// Ad platform receiving the events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelKind {
    Meta,
    TikTok,
}

impl PixelKind {
    pub const ALL: [PixelKind; 2] = [PixelKind::Meta, PixelKind::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelKind::Meta => "meta",
            PixelKind::TikTok => "tiktok",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "meta" | "facebook" => Some(PixelKind::Meta),
            "tiktok" => Some(PixelKind::TikTok),
            _ => None,
        }
    }

    /// Event payload in this platform's vocabulary, attribution merged in
    pub fn payload(&self, event: &ConversionEvent, utm: &UtmParams) -> Value {
        let (content_id, content_name) = event.content();
        let value = decimal_to_json(event.value());

        let mut payload = match self {
            PixelKind::Meta => json!({
                "value": value,
                "currency": CURRENCY,
                "content_type": "product",
                "content_ids": [content_id],
                "content_name": content_name,
                "content_category": PRODUCT_CATEGORY,
            }),
            PixelKind::TikTok => json!({
                "value": value,
                "currency": CURRENCY,
                "content_type": "product",
                "content_id": content_id,
                "content_name": content_name,
                "content_category": PRODUCT_CATEGORY,
                "quantity": 1,
            }),
        };

        let Some(fields) = payload.as_object_mut() else {
            return payload;
        };

        if *self == PixelKind::Meta && !matches!(event, ConversionEvent::AddToCart { .. }) {
            fields.insert("num_items".into(), json!(1));
        }

        if let ConversionEvent::Purchase { transaction_id, .. } = event {
            let key = match self {
                PixelKind::Meta => "transaction_id",
                PixelKind::TikTok => "order_id",
            };
            fields.insert(key.into(), json!(transaction_id));
        }

        merge_attribution(fields, utm);
        payload
    }
}

fn decimal_to_json(value: Decimal) -> Value {
    value.to_f64().map_or(Value::Null, Value::from)
}

fn merge_attribution(fields: &mut Map<String, Value>, utm: &UtmParams) {
    for (key, value) in utm.pairs() {
        fields.insert(key.into(), json!(value));
    }
}

/// A funnel step worth reporting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ConversionEvent {
    InitiateCheckout {
        value: Decimal,
    },
    AddToCart {
        value: Decimal,
        content_id: String,
        content_name: String,
    },
    Purchase {
        value: Decimal,
        transaction_id: String,
    },
}

impl ConversionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConversionEvent::InitiateCheckout { .. } => "InitiateCheckout",
            ConversionEvent::AddToCart { .. } => "AddToCart",
            ConversionEvent::Purchase { .. } => "Purchase",
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            ConversionEvent::InitiateCheckout { value }
            | ConversionEvent::AddToCart { value, .. }
            | ConversionEvent::Purchase { value, .. } => *value,
        }
    }

    fn content(&self) -> (&str, &str) {
        match self {
            ConversionEvent::AddToCart { content_id, content_name, .. } => {
                (content_id.as_str(), content_name.as_str())
            }
            _ => (MAIN_PRODUCT_ID, MAIN_PRODUCT_NAME),
        }
    }
}

/// Event ready for delivery to one platform
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PixelEvent {
    pub pixel: PixelKind,
    pub name: &'static str,
    pub payload: Value,
}

/// Delivery target for pixel events
pub trait PixelSink: Send + Sync {
    fn deliver(&self, event: &PixelEvent) -> Result<()>;
}

/// Emits each event as a structured log record
#[derive(Default)]
pub struct TracingPixelSink;

impl PixelSink for TracingPixelSink {
    fn deliver(&self, event: &PixelEvent) -> Result<()> {
        tracing::info!(
            pixel = event.pixel.as_str(),
            event = event.name,
            payload = %event.payload,
            "Pixel event"
        );
        Ok(())
    }
}

/// Keeps delivered events in memory
#[derive(Default)]
pub struct RecordingPixelSink {
    events: Mutex<Vec<PixelEvent>>,
}

impl RecordingPixelSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PixelEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pixel: PixelKind, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.pixel == pixel && e.name == name)
            .count()
    }
}

impl PixelSink for RecordingPixelSink {
    fn deliver(&self, event: &PixelEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| CheckoutError::Pixel(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// What happened to a tracked event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// One pixel with its readiness state and pending buffer
pub struct PixelChannel {
    kind: PixelKind,
    ready: bool,
    pending: Vec<PixelEvent>,
    sink: Arc<dyn PixelSink>,
}

impl PixelChannel {
    pub fn new(kind: PixelKind, sink: Arc<dyn PixelSink>) -> Self {
        Self {
            kind,
            ready: false,
            pending: Vec::new(),
            sink,
        }
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn track(&mut self, event: PixelEvent) -> Delivery {
        if self.ready {
            self.dispatch(&event);
            Delivery::Sent
        } else {
            tracing::debug!(pixel = self.kind.as_str(), event = event.name, "Pixel not ready, queued");
            self.pending.push(event);
            Delivery::Queued
        }
    }

    /// Flip to ready and flush the buffer; returns how many were flushed
    pub fn mark_ready(&mut self) -> usize {
        if self.ready {
            return 0;
        }
        self.ready = true;

        let pending = std::mem::take(&mut self.pending);
        for event in &pending {
            self.dispatch(event);
        }

        tracing::info!(pixel = self.kind.as_str(), flushed = pending.len(), "Pixel ready");
        pending.len()
    }

    fn dispatch(&self, event: &PixelEvent) {
        if let Err(e) = self.sink.deliver(event) {
            tracing::warn!(pixel = self.kind.as_str(), event = event.name, error = %e, "Pixel delivery failed");
        }
    }
}

/// Fans funnel events out to every pixel
pub struct ConversionTracker {
    channels: Vec<PixelChannel>,
}

impl ConversionTracker {
    pub fn new(sink: Arc<dyn PixelSink>) -> Self {
        Self {
            channels: PixelKind::ALL
                .into_iter()
                .map(|kind| PixelChannel::new(kind, sink.clone()))
                .collect(),
        }
    }

    pub fn track(&mut self, event: &ConversionEvent, utm: &UtmParams) {
        for channel in &mut self.channels {
            let payload = channel.kind().payload(event, utm);
            channel.track(PixelEvent {
                pixel: channel.kind(),
                name: event.name(),
                payload,
            });
        }
    }

    pub fn initiate_checkout(&mut self, value: Decimal, utm: &UtmParams) {
        self.track(&ConversionEvent::InitiateCheckout { value }, utm);
    }

    pub fn add_to_cart(&mut self, value: Decimal, content_id: &str, content_name: &str, utm: &UtmParams) {
        self.track(
            &ConversionEvent::AddToCart {
                value,
                content_id: content_id.into(),
                content_name: content_name.into(),
            },
            utm,
        );
    }

    pub fn purchase(&mut self, value: Decimal, transaction_id: &str, utm: &UtmParams) {
        self.track(
            &ConversionEvent::Purchase {
                value,
                transaction_id: transaction_id.into(),
            },
            utm,
        );
    }

    pub fn mark_ready(&mut self, kind: PixelKind) -> usize {
        self.channels
            .iter_mut()
            .find(|c| c.kind() == kind)
            .map_or(0, PixelChannel::mark_ready)
    }

    pub fn channel(&self, kind: PixelKind) -> Option<&PixelChannel> {
        self.channels.iter().find(|c| c.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn utm() -> UtmParams {
        UtmParams::from_query("utm_source=tiktok&utm_campaign=launch")
    }

    #[test]
    fn test_meta_purchase_payload() {
        let event = ConversionEvent::Purchase {
            value: dec!(24.90),
            transaction_id: "tx_1".into(),
        };
        let payload = PixelKind::Meta.payload(&event, &utm());

        assert_eq!(payload["value"], json!(24.9));
        assert_eq!(payload["currency"], "BRL");
        assert_eq!(payload["content_ids"], json!([MAIN_PRODUCT_ID]));
        assert_eq!(payload["num_items"], 1);
        assert_eq!(payload["transaction_id"], "tx_1");
        assert_eq!(payload["utm_source"], "tiktok");
    }

    #[test]
    fn test_tiktok_add_to_cart_payload() {
        let event = ConversionEvent::AddToCart {
            value: dec!(16.17),
            content_id: "order-bump-2".into(),
            content_name: "Shampoo".into(),
        };
        let payload = PixelKind::TikTok.payload(&event, &UtmParams::default());

        assert_eq!(payload["content_id"], "order-bump-2");
        assert_eq!(payload["quantity"], 1);
        assert!(payload.get("order_id").is_none());
        assert!(payload.get("utm_source").is_none());
    }

    #[test]
    fn test_queue_drains_once_in_order() {
        let sink = Arc::new(RecordingPixelSink::new());
        let mut channel = PixelChannel::new(PixelKind::TikTok, sink.clone());

        for name in ["InitiateCheckout", "AddToCart"] {
            let delivery = channel.track(PixelEvent {
                pixel: PixelKind::TikTok,
                name,
                payload: Value::Null,
            });
            assert_eq!(delivery, Delivery::Queued);
        }
        assert!(sink.events().is_empty());

        assert_eq!(channel.mark_ready(), 2);
        assert_eq!(channel.mark_ready(), 0);

        let names: Vec<_> = sink.events().iter().map(|e| e.name).collect();
        assert_eq!(names, ["InitiateCheckout", "AddToCart"]);

        let delivery = channel.track(PixelEvent {
            pixel: PixelKind::TikTok,
            name: "Purchase",
            payload: Value::Null,
        });
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(sink.events().len(), 3);
    }

    #[test]
    fn test_tracker_fans_out_per_pixel_readiness() {
        let sink = Arc::new(RecordingPixelSink::new());
        let mut tracker = ConversionTracker::new(sink.clone());

        tracker.mark_ready(PixelKind::Meta);
        tracker.initiate_checkout(dec!(12.80), &utm());

        assert_eq!(sink.count(PixelKind::Meta, "InitiateCheckout"), 1);
        assert_eq!(sink.count(PixelKind::TikTok, "InitiateCheckout"), 0);
        assert_eq!(tracker.channel(PixelKind::TikTok).map(PixelChannel::pending_len), Some(1));

        tracker.mark_ready(PixelKind::TikTok);
        assert_eq!(sink.count(PixelKind::TikTok, "InitiateCheckout"), 1);
    }

    struct FailingSink;

    impl PixelSink for FailingSink {
        fn deliver(&self, _event: &PixelEvent) -> Result<()> {
            Err(CheckoutError::Pixel("script blocked".into()))
        }
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let mut tracker = ConversionTracker::new(Arc::new(FailingSink));
        tracker.mark_ready(PixelKind::Meta);
        tracker.purchase(dec!(5), "tx_1", &UtmParams::default());
    }
}
