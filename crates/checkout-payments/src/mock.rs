//! Mock Payment Gateway
//!
//! For tests and local runs without LiraPay credentials. Created
//! transactions start `PENDING`; each lookup consumes the next scripted
//! status, and the last one sticks.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use checkout_core::gateway::{CreateTransactionRequest, PaymentGateway};
use checkout_core::model::{PixCode, TransactionCustomer};
use checkout_core::{CheckoutError, Result, Transaction, TransactionStatus};

const MOCK_PIX_PREFIX: &str = "00020126580014br.gov.bcb.pix0136";

#[derive(Default)]
struct MockState {
    transactions: HashMap<String, Transaction>,
    script: VecDeque<TransactionStatus>,
    requests: Vec<CreateTransactionRequest>,
    lookups: usize,
    reject_with: Option<(u16, String)>,
}

/// Mock gateway with scripted status progression
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses returned by successive lookups
    pub fn with_statuses(statuses: impl IntoIterator<Item = TransactionStatus>) -> Self {
        let gateway = Self::new();
        if let Ok(mut state) = gateway.state.lock() {
            state.script = statuses.into_iter().collect();
        }
        gateway
    }

    /// Reject every creation with the given provider response
    pub fn rejecting(status: u16, body: impl Into<String>) -> Self {
        let gateway = Self::new();
        if let Ok(mut state) = gateway.state.lock() {
            state.reject_with = Some((status, body.into()));
        }
        gateway
    }

    /// Force the stored status of a transaction
    pub fn set_status(&self, id: &str, status: TransactionStatus) -> Result<()> {
        let mut state = self.lock()?;
        let tx = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| CheckoutError::NotFound(id.to_string()))?;
        tx.status = status;
        Ok(())
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CreateTransactionRequest> {
        self.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Number of status lookups served
    pub fn lookups(&self) -> usize {
        self.lock().map(|s| s.lookups).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|e| CheckoutError::Storage(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_transaction(&self, request: &CreateTransactionRequest) -> Result<Transaction> {
        request.validate()?;

        let mut state = self.lock()?;
        state.requests.push(request.clone());

        if let Some((status, body)) = state.reject_with.clone() {
            return Err(CheckoutError::Gateway { status, body });
        }

        let id = format!("mock_tx_{}", uuid::Uuid::new_v4().simple());
        let transaction = Transaction {
            id: id.clone(),
            external_id: request.external_id.clone(),
            status: TransactionStatus::Pending,
            total: request.total_amount,
            payment_method: request.payment_method.clone(),
            customer: TransactionCustomer {
                email: request.customer.email.clone(),
                name: request.customer.name.clone(),
            },
            pix: Some(PixCode {
                payload: format!("{MOCK_PIX_PREFIX}{id}"),
            }),
            has_error: false,
        };

        state.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(&self, id: &str) -> Result<Transaction> {
        let mut state = self.lock()?;
        state.lookups += 1;
        let next = state.script.pop_front();

        let tx = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| CheckoutError::NotFound(id.to_string()))?;
        if let Some(status) = next {
            tx.status = status;
        }

        Ok(tx.clone())
    }

    async fn account_info(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "name": "Mock Account", "mock": true }))
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}
