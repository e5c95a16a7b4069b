//! Payment Confirmation
//!
//! After a PIX transaction is created the checkout waits for the payer:
//!
//! ```text
//!   AWAITING_PAYMENT ──status == AUTHORIZED──▶ AUTHORIZED ──3s──▶ redirect
//!         │
//!         └── countdown hits 0: display-only timeout, polling goes on
//! ```
//!
//! Two independent timers run per transaction: a 1 s countdown from 900 s
//! and a 5 s status poll (first poll immediate). Any status other than
//! `AUTHORIZED`, and any lookup failure, leaves the state alone; failures are
//! logged and the next tick runs as scheduled. The purchase effect fires at
//! most once per confirmation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::PaymentGateway;
use crate::model::{Transaction, TransactionStatus};

pub const DEFAULT_COUNTDOWN_SECS: u64 = 15 * 60;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_CONFIRMATION_URL: &str = "https://ultimaschances.netlify.app/obrigado";

/// Local view of the payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationState {
    AwaitingPayment,
    Authorized,
}

/// Display countdown, clamped at zero
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    remaining: u64,
}

impl Countdown {
    pub fn new(seconds: u64) -> Self {
        Self { remaining: seconds }
    }

    /// One second elapsed
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// `MM:SS`
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

/// Transition logic, free of timers and I/O
#[derive(Clone, Debug)]
pub struct PaymentConfirmation {
    transaction_id: String,
    state: ConfirmationState,
    purchase_fired: bool,
}

impl PaymentConfirmation {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            state: ConfirmationState::AwaitingPayment,
            purchase_fired: false,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Apply a polled status; returns `true` when the purchase effect must fire
    ///
    /// `AUTHORIZED` is a fixed point: once reached, nothing moves it and the
    /// effect never fires again.
    pub fn observe(&mut self, status: &TransactionStatus) -> bool {
        match status {
            TransactionStatus::Authorized => {
                self.state = ConfirmationState::Authorized;
                let fire = !self.purchase_fired;
                self.purchase_fired = true;
                fire
            }
            TransactionStatus::Pending => {
                tracing::debug!(transaction_id = %self.transaction_id, "Payment pending");
                false
            }
            other => {
                tracing::info!(
                    transaction_id = %self.transaction_id,
                    status = %other,
                    "Payment status observed, no transition"
                );
                false
            }
        }
    }
}

/// Timings and destination for a confirmation
#[derive(Clone, Debug)]
pub struct ConfirmationConfig {
    pub countdown_secs: u64,
    pub poll_interval: Duration,
    pub redirect_delay: Duration,
    pub confirmation_url: String,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            confirmation_url: DEFAULT_CONFIRMATION_URL.into(),
        }
    }
}

/// What the payment page shows
#[derive(Clone, Debug, Serialize)]
pub struct ConfirmationSnapshot {
    pub transaction_id: String,
    pub state: ConfirmationState,
    pub seconds_remaining: u64,
    /// `MM:SS`
    pub countdown: String,
    pub expired: bool,
    pub last_status: Option<TransactionStatus>,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub polls: u64,
    /// Set once the post-authorization delay has elapsed
    pub redirect_to: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ConfirmationSnapshot {
    fn new(transaction_id: &str, countdown: Countdown) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            state: ConfirmationState::AwaitingPayment,
            seconds_remaining: countdown.remaining(),
            countdown: countdown.display(),
            expired: countdown.is_expired(),
            last_status: None,
            last_error: None,
            last_checked_at: None,
            polls: 0,
            redirect_to: None,
            started_at: Utc::now(),
        }
    }
}

/// Callback run once when the payment is authorized
pub type OnAuthorized = Box<dyn FnOnce(&Transaction) + Send + 'static>;

/// Starts the countdown and poll tasks for a transaction
pub struct PaymentPoller;

impl PaymentPoller {
    /// Spawn both timers on the current tokio runtime
    pub fn spawn(
        gateway: Arc<dyn PaymentGateway>,
        transaction_id: impl Into<String>,
        config: ConfirmationConfig,
        on_authorized: OnAuthorized,
    ) -> PollerHandle {
        let transaction_id = transaction_id.into();
        let countdown = Countdown::new(config.countdown_secs);
        let (sender, receiver) = watch::channel(ConfirmationSnapshot::new(&transaction_id, countdown));
        let sender = Arc::new(sender);

        tracing::info!(
            transaction_id = %transaction_id,
            gateway = gateway.name(),
            countdown_secs = config.countdown_secs,
            "Starting payment confirmation"
        );

        let countdown_task = tokio::spawn(run_countdown(countdown, sender.clone()));
        let poll_task = tokio::spawn(run_polling(gateway, transaction_id, config, sender, on_authorized));

        PollerHandle {
            snapshot: receiver,
            tasks: vec![countdown_task, poll_task],
        }
    }
}

async fn run_countdown(mut countdown: Countdown, sender: Arc<watch::Sender<ConfirmationSnapshot>>) {
    let period = Duration::from_secs(1);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    while !countdown.is_expired() {
        interval.tick().await;
        countdown.tick();
        sender.send_modify(|s| {
            s.seconds_remaining = countdown.remaining();
            s.countdown = countdown.display();
            s.expired = countdown.is_expired();
        });
    }

    tracing::debug!("Payment countdown reached zero");
}

async fn run_polling(
    gateway: Arc<dyn PaymentGateway>,
    transaction_id: String,
    config: ConfirmationConfig,
    sender: Arc<watch::Sender<ConfirmationSnapshot>>,
    on_authorized: OnAuthorized,
) {
    let mut machine = PaymentConfirmation::new(transaction_id.clone());
    let mut on_authorized = Some(on_authorized);

    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let checked_at = Utc::now();

        match gateway.get_transaction(&transaction_id).await {
            Ok(transaction) => {
                let fire = machine.observe(&transaction.status);
                sender.send_modify(|s| {
                    s.state = machine.state();
                    s.last_status = Some(transaction.status.clone());
                    s.last_error = None;
                    s.last_checked_at = Some(checked_at);
                    s.polls += 1;
                });

                if machine.state() == ConfirmationState::Authorized {
                    if fire {
                        if let Some(callback) = on_authorized.take() {
                            callback(&transaction);
                        }
                    }
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "Payment status check failed");
                sender.send_modify(|s| {
                    s.last_error = Some(e.to_string());
                    s.last_checked_at = Some(checked_at);
                    s.polls += 1;
                });
            }
        }
    }

    tracing::info!(transaction_id = %transaction_id, "Payment authorized");

    tokio::time::sleep(config.redirect_delay).await;
    sender.send_modify(|s| s.redirect_to = Some(config.confirmation_url.clone()));
}

/// Owner of a running confirmation; dropping it tears the timers down
pub struct PollerHandle {
    snapshot: watch::Receiver<ConfirmationSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn snapshot(&self) -> ConfirmationSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConfirmationSnapshot> {
        self.snapshot.clone()
    }

    /// Stop both timers; an in-flight lookup is dropped with its task
    pub fn cancel(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::{CheckoutError, Result};
    use crate::gateway::CreateTransactionRequest;
    use crate::model::{PixCode, TransactionCustomer};

    /// Replays a script of lookup results, repeating the last one
    struct ScriptedGateway {
        script: Mutex<VecDeque<Option<TransactionStatus>>>,
        last: Mutex<Option<TransactionStatus>>,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Option<TransactionStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(Some(TransactionStatus::Pending)),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn create_transaction(&self, _request: &CreateTransactionRequest) -> Result<Transaction> {
            unreachable!("not used by the poller")
        }

        async fn get_transaction(&self, id: &str) -> Result<Transaction> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let next = self.script.lock().unwrap().pop_front();
            let step = match next {
                Some(step) => {
                    *self.last.lock().unwrap() = step.clone();
                    step
                }
                None => self.last.lock().unwrap().clone(),
            };

            let status = step.ok_or_else(|| CheckoutError::GatewayUnavailable("timeout".into()))?;
            Ok(Transaction {
                id: id.to_string(),
                external_id: "pampers-1-abc".into(),
                status,
                total: dec!(24.90),
                payment_method: "PIX".into(),
                customer: TransactionCustomer::default(),
                pix: Some(PixCode { payload: "000201".into() }),
                has_error: false,
            })
        }

        async fn account_info(&self) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn counting_callback() -> (Arc<AtomicUsize>, OnAuthorized) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        (fired, Box::new(move |_tx: &Transaction| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_pending_keeps_awaiting() {
        let mut machine = PaymentConfirmation::new("tx_1");
        for _ in 0..5 {
            assert!(!machine.observe(&TransactionStatus::Pending));
        }
        assert_eq!(machine.state(), ConfirmationState::AwaitingPayment);
    }

    #[test]
    fn test_authorized_fires_exactly_once() {
        let mut machine = PaymentConfirmation::new("tx_1");
        assert!(!machine.observe(&TransactionStatus::Pending));
        assert!(machine.observe(&TransactionStatus::Authorized));
        assert!(!machine.observe(&TransactionStatus::Authorized));
        assert!(!machine.observe(&TransactionStatus::Pending));
        assert_eq!(machine.state(), ConfirmationState::Authorized);
    }

    #[test]
    fn test_other_statuses_do_not_transition() {
        let mut machine = PaymentConfirmation::new("tx_1");
        for status in [
            TransactionStatus::Failed,
            TransactionStatus::Chargeback,
            TransactionStatus::InDispute,
            TransactionStatus::Unknown("REFUNDED".into()),
        ] {
            assert!(!machine.observe(&status));
        }
        assert_eq!(machine.state(), ConfirmationState::AwaitingPayment);
    }

    #[test]
    fn test_countdown_clamps_at_zero() {
        let mut countdown = Countdown::new(DEFAULT_COUNTDOWN_SECS);
        assert_eq!(countdown.remaining(), 900);
        assert_eq!(countdown.display(), "15:00");
        assert_eq!(countdown.tick(), 899);
        assert_eq!(countdown.display(), "14:59");

        for _ in 0..2000 {
            countdown.tick();
        }
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.is_expired());
        assert_eq!(countdown.display(), "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_authorizes_then_redirects() {
        use TransactionStatus::{Authorized, Pending};
        let gateway = ScriptedGateway::new(vec![Some(Pending), Some(Pending), Some(Authorized), Some(Authorized)]);
        let (fired, callback) = counting_callback();

        let handle = PaymentPoller::spawn(gateway.clone(), "tx_1", ConfirmationConfig::default(), callback);

        // polls at 0s, 5s, 10s; authorized on the third
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConfirmationState::Authorized);
        assert_eq!(snapshot.polls, 3);
        assert_eq!(snapshot.redirect_to, None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.redirect_to.as_deref(), Some(DEFAULT_CONFIRMATION_URL));
        assert_eq!(gateway.calls(), 3, "polling stops once authorized");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_failures_do_not_stop_polling() {
        use TransactionStatus::Authorized;
        let gateway = ScriptedGateway::new(vec![None, None, Some(Authorized)]);
        let (fired, callback) = counting_callback();

        let handle = PaymentPoller::spawn(gateway.clone(), "tx_2", ConfirmationConfig::default(), callback);

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConfirmationState::AwaitingPayment);
        assert!(snapshot.last_error.is_some());
        assert_eq!(snapshot.polls, 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.snapshot().state, ConfirmationState::Authorized);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_alongside_polling() {
        let gateway = ScriptedGateway::new(vec![]);
        let (_fired, callback) = counting_callback();

        let handle = PaymentPoller::spawn(gateway, "tx_3", ConfirmationConfig::default(), callback);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.snapshot().seconds_remaining, 890);

        tokio::time::sleep(Duration::from_secs(1_000)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.seconds_remaining, 0);
        assert!(snapshot.expired);
        assert_eq!(snapshot.state, ConfirmationState::AwaitingPayment);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let gateway = ScriptedGateway::new(vec![]);
        let (fired, callback) = counting_callback();

        let handle = PaymentPoller::spawn(gateway.clone(), "tx_4", ConfirmationConfig::default(), callback);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(gateway.calls(), 2);

        handle.cancel();
        let frozen = handle.snapshot().seconds_remaining;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(gateway.calls(), 2);
        assert_eq!(handle.snapshot().seconds_remaining, frozen);
        assert!(handle.is_finished());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
