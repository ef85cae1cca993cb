use async_trait::async_trait;

use ui_analyzer_core::adapters::DatabaseAdapter;
use ui_analyzer_core::{ApiPlugin, ApiRoute, AppContext, SIGNATURE_HEADER};
use ui_analyzer_core::{AppRequest, AppResponse, AppResult, HttpMethod, validate_request_body};

pub(super) mod handlers;
pub(super) mod types;


use handlers::*;
use types::*;

use super::helpers::{get_authenticated_user, path_param};

const STATUS_PREFIX: &str = "/payments/status/";
const CANCEL_PREFIX: &str = "/payments/cancel/";

/// Hosted checkout, verification and provider webhooks under `/payments`.
pub struct PaymentsPlugin;

impl PaymentsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PaymentsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentsPlugin {
    async fn handle_create_payment<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let body: CreatePaymentRequest = validate_request_body(req)?;
        let response = create_payment_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_verify_payment<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let body: VerifyPaymentRequest = validate_request_body(req)?;
        let response = verify_payment_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_status<DB: DatabaseAdapter>(
        &self,
        subscription_id: &str,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let response = payment_status_core(subscription_id, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    async fn handle_cancel<DB: DatabaseAdapter>(
        &self,
        subscription_id: &str,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let response = cancel_payment_core(subscription_id, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `POST /payments/webhook`. Authenticated by signature, not by token.
    async fn handle_webhook<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let payload = req.body.as_deref().unwrap_or_default();
        let signature = req.header(SIGNATURE_HEADER).map(String::as_str);
        let response = webhook_core(payload, signature, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }
}

#[async_trait]
impl<DB: DatabaseAdapter> ApiPlugin<DB> for PaymentsPlugin {
    fn name(&self) -> &'static str {
        "payments"
    }

    fn routes(&self) -> Vec<ApiRoute> {
        vec![
            ApiRoute::post("/payments/create-payment", "createPayment"),
            ApiRoute::post("/payments/verify-payment", "verifyPayment"),
            ApiRoute::get("/payments/status/{subscriptionId}", "getPaymentStatus"),
            ApiRoute::post("/payments/cancel/{subscriptionId}", "cancelSubscription"),
            ApiRoute::post("/payments/webhook", "paymentWebhook"),
        ]
    }

    async fn on_request(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<Option<AppResponse>> {
        match (req.method(), req.path()) {
            (HttpMethod::Post, "/payments/create-payment") => {
                Ok(Some(self.handle_create_payment(req, ctx).await?))
            }
            (HttpMethod::Post, "/payments/verify-payment") => {
                Ok(Some(self.handle_verify_payment(req, ctx).await?))
            }
            (HttpMethod::Post, "/payments/webhook") => {
                Ok(Some(self.handle_webhook(req, ctx).await?))
            }
            (HttpMethod::Get, path) => match path_param(path, STATUS_PREFIX) {
                Some(id) => Ok(Some(self.handle_status(id, req, ctx).await?)),
                None => Ok(None),
            },
            (HttpMethod::Post, path) => match path_param(path, CANCEL_PREFIX) {
                Some(id) => Ok(Some(self.handle_cancel(id, req, ctx).await?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }
}
