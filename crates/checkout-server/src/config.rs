//! Server Configuration

use std::time::Duration;

use anyhow::Context;
use checkout_core::ConfirmationConfig;

use crate::session::{DEFAULT_SESSION_IDLE_TTL, DEFAULT_SESSION_SWEEP_INTERVAL};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_WEBHOOK_URL: &str = "https://webhook-test.com/pampers-checkout";

/// Settings read from the environment at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Sent to the provider with every transaction
    pub webhook_url: String,
    pub confirmation: ConfirmationConfig,
    pub viacep_base_url: Option<String>,
    /// Idle sessions are dropped after this, stopping any poller they own
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            webhook_url: DEFAULT_WEBHOOK_URL.into(),
            confirmation: ConfirmationConfig::default(),
            viacep_base_url: None,
            session_idle_ttl: DEFAULT_SESSION_IDLE_TTL,
            session_sweep_interval: DEFAULT_SESSION_SWEEP_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("CHECKOUT_WEBHOOK_URL") {
            config.webhook_url = url;
        }
        if let Ok(url) = std::env::var("CHECKOUT_CONFIRMATION_URL") {
            config.confirmation.confirmation_url = url;
        }
        if let Some(secs) = secs_var("CHECKOUT_POLL_INTERVAL_SECS")? {
            anyhow::ensure!(secs > 0, "CHECKOUT_POLL_INTERVAL_SECS must be positive");
            config.confirmation.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = secs_var("CHECKOUT_COUNTDOWN_SECS")? {
            config.confirmation.countdown_secs = secs;
        }
        if let Some(secs) = secs_var("CHECKOUT_REDIRECT_DELAY_SECS")? {
            config.confirmation.redirect_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = secs_var("CHECKOUT_SESSION_TTL_SECS")? {
            config.session_idle_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = secs_var("CHECKOUT_SESSION_SWEEP_SECS")? {
            anyhow::ensure!(secs > 0, "CHECKOUT_SESSION_SWEEP_SECS must be positive");
            config.session_sweep_interval = Duration::from_secs(secs);
        }
        config.viacep_base_url = std::env::var("VIACEP_BASE_URL").ok();

        Ok(config)
    }
}

fn secs_var(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a number of seconds")),
        Err(_) => Ok(None),
    }
}
