//! Payment provider boundary.
//!
//! The ledger only talks to providers through [`PaymentGateway`]. An HTTP
//! implementation lives in the API crate; [`DemoGateway`] is an in-process
//! provider for development and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{Currency, CustomerInfo, PaidPlan, PaymentInfo};

/// Everything a provider needs to open a hosted checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub conversation_id: String,
    pub plan: PaidPlan,
    pub amount_minor: u64,
    pub currency: Currency,
    pub buyer_id: String,
    pub buyer: CustomerInfo,
    pub callback_url: String,
}

/// A provider-hosted checkout the buyer is redirected to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_handle: String,
    pub redirect_url: String,
}

/// What the provider reports for a checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub succeeded: bool,
    pub payment_info: PaymentInfo,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Identifier stored on each subscription, e.g. `"iyzico"` or `"demo"`.
    fn provider(&self) -> &str;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session_result(
        &self,
        session_handle: &str,
    ) -> Result<SessionResult, GatewayError>;
}

/// Scripted result for a [`DemoGateway`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoOutcome {
    Approve,
    Decline,
    Reject,
    TransportFailure,
    Malformed,
}

/// In-process provider that approves everything unless told otherwise.
pub struct DemoGateway {
    redirect_base: String,
    default_outcome: Mutex<DemoOutcome>,
    create_outcome: Mutex<DemoOutcome>,
    overrides: Mutex<HashMap<String, DemoOutcome>>,
    created: AtomicUsize,
    retrieved: AtomicUsize,
}

impl DemoGateway {
    pub fn new(redirect_base: impl Into<String>) -> Self {
        Self {
            redirect_base: redirect_base.into(),
            default_outcome: Mutex::new(DemoOutcome::Approve),
            create_outcome: Mutex::new(DemoOutcome::Approve),
            overrides: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            retrieved: AtomicUsize::new(0),
        }
    }

    /// Outcome for sessions without an override.
    pub fn set_default_outcome(&self, outcome: DemoOutcome) {
        *self
            .default_outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = outcome;
    }

    /// Outcome for one session handle.
    pub fn set_outcome(&self, session_handle: &str, outcome: DemoOutcome) {
        self.overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_handle.to_string(), outcome);
    }

    /// Outcome of the next checkout creations. `Decline` behaves like `Approve`.
    pub fn set_create_outcome(&self, outcome: DemoOutcome) {
        *self
            .create_outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = outcome;
    }

    pub fn sessions_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn results_retrieved(&self) -> usize {
        self.retrieved.load(Ordering::SeqCst)
    }

    fn outcome_for(&self, session_handle: &str) -> DemoOutcome {
        let overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        match overrides.get(session_handle) {
            Some(outcome) => *outcome,
            None => *self
                .default_outcome
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        }
    }
}

impl Default for DemoGateway {
    fn default() -> Self {
        Self::new("http://localhost:3000/payment/demo")
    }
}

#[async_trait]
impl PaymentGateway for DemoGateway {
    fn provider(&self) -> &str {
        "demo"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let outcome = *self
            .create_outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match outcome {
            DemoOutcome::TransportFailure => {
                return Err(GatewayError::Transport("demo provider unreachable".into()));
            }
            DemoOutcome::Malformed => {
                return Err(GatewayError::Malformed("demo provider sent garbage".into()));
            }
            DemoOutcome::Reject => {
                return Err(GatewayError::Rejected("Invalid buyer information".into()));
            }
            DemoOutcome::Approve | DemoOutcome::Decline => {}
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        let session_handle = format!("demo_{}", Uuid::new_v4().simple());
        tracing::debug!(
            conversation_id = %request.conversation_id,
            session_handle = %session_handle,
            "Demo checkout session created"
        );
        Ok(CheckoutSession {
            redirect_url: format!("{}?token={}", self.redirect_base, session_handle),
            session_handle,
        })
    }

    async fn retrieve_session_result(
        &self,
        session_handle: &str,
    ) -> Result<SessionResult, GatewayError> {
        self.retrieved.fetch_add(1, Ordering::SeqCst);
        match self.outcome_for(session_handle) {
            DemoOutcome::Approve => Ok(SessionResult {
                succeeded: true,
                payment_info: PaymentInfo {
                    card_type: Some("CREDIT_CARD".into()),
                    card_association: Some("VISA".into()),
                    card_family: Some("Demo".into()),
                    last_four_digits: Some("4242".into()),
                    payment_status: Some("SUCCESS".into()),
                },
            }),
            DemoOutcome::Decline => Ok(SessionResult {
                succeeded: false,
                payment_info: PaymentInfo {
                    payment_status: Some("FAILURE".into()),
                    ..Default::default()
                },
            }),
            DemoOutcome::Reject => Err(GatewayError::Rejected("Unknown checkout token".into())),
            DemoOutcome::TransportFailure => {
                Err(GatewayError::Transport("demo provider unreachable".into()))
            }
            DemoOutcome::Malformed => Err(GatewayError::Malformed("missing paymentStatus".into())),
        }
    }
}
