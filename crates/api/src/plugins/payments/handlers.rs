use chrono::Utc;

use ui_analyzer_core::adapters::DatabaseAdapter;
use ui_analyzer_core::{
    AppContext, AppError, AppResult, PurchaseRequest, SIGNATURE_HEADER, User, VerifyOutcome,
    is_currently_active, payload_fingerprint,
};

use super::types::*;
use crate::plugins::helpers::SuccessMessage;

pub(crate) const CHECKOUT_COMPLETED: &str = "checkout.completed";
pub(crate) const SUBSCRIPTION_RENEWED: &str = "subscription.renewed";

pub(crate) async fn create_payment_core<DB: DatabaseAdapter>(
    body: &CreatePaymentRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<CreatePaymentResponse> {
    let started = ctx
        .ledger()
        .start_purchase(
            user,
            PurchaseRequest {
                plan: body.plan,
                currency: body.currency,
                customer: (&body.customer_info).into(),
            },
        )
        .await?;

    tracing::info!(
        user_id = %user.id,
        subscription_id = %started.subscription.id,
        plan = body.plan.as_str(),
        currency = body.currency.code(),
        "Checkout started"
    );

    Ok(CreatePaymentResponse {
        success: true,
        payment_page_url: started.redirect_url,
        token: started.session_handle,
        subscription_id: started.subscription.id,
    })
}

pub(crate) async fn verify_payment_core<DB: DatabaseAdapter>(
    body: &VerifyPaymentRequest,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<VerifyPaymentResponse> {
    let ledger = ctx.ledger();
    let subscription = ledger.find_by_payment_token(&body.token).await?;
    if subscription.user_id != user.id {
        return Err(AppError::not_found("Subscription not found"));
    }

    match ledger.verify_purchase(&body.token).await? {
        VerifyOutcome::Activated(subscription) => Ok(VerifyPaymentResponse {
            success: true,
            subscription: subscription.into(),
        }),
        VerifyOutcome::Declined { payment_status, .. } => {
            Err(AppError::PaymentDeclined { payment_status })
        }
    }
}

pub(crate) async fn payment_status_core<DB: DatabaseAdapter>(
    subscription_id: &str,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<PaymentStatusResponse> {
    let sub = ctx.ledger().get_owned(subscription_id, &user.id).await?;
    Ok(PaymentStatusResponse {
        is_active: is_currently_active(&sub, Utc::now()),
        amount: sub.amount_minor as f64 / 100.0,
        id: sub.id,
        plan: sub.plan,
        status: sub.status,
        currency: sub.currency,
        start_date: sub.start_date,
        end_date: sub.end_date,
    })
}

pub(crate) async fn cancel_payment_core<DB: DatabaseAdapter>(
    subscription_id: &str,
    user: &User,
    ctx: &AppContext<DB>,
) -> AppResult<SuccessMessage> {
    ctx.ledger().cancel(subscription_id, &user.id).await?;
    Ok(SuccessMessage::new("Subscription cancelled successfully"))
}

/// Authenticate a provider callback and apply it.
///
/// Each delivery is applied at most once, keyed by the provider event id or,
/// without one, by a digest of the body. Events for unknown tokens are
/// acknowledged so the provider stops retrying. Gateway faults release the
/// delivery and propagate so a retry is processed again.
pub(crate) async fn webhook_core<DB: DatabaseAdapter>(
    payload: &[u8],
    signature: Option<&str>,
    ctx: &AppContext<DB>,
) -> AppResult<WebhookAck> {
    let Some(verifier) = ctx.webhook_verifier() else {
        tracing::warn!("Webhook received but no webhook secret is configured");
        return Err(AppError::bad_request("Webhook processing failed"));
    };

    let now = Utc::now();
    if let Err(err) = verifier.verify(payload, signature, now) {
        tracing::warn!(error = %err, header = SIGNATURE_HEADER, "Webhook rejected");
        return Err(AppError::bad_request("Invalid webhook signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(payload)
        .map_err(|_| AppError::bad_request("Webhook processing failed"))?;
    tracing::info!(event = %event.kind, "Webhook received");

    let Some(token) = event.data.token.as_deref() else {
        return Ok(WebhookAck { received: true });
    };
    if !matches!(event.kind.as_str(), CHECKOUT_COMPLETED | SUBSCRIPTION_RENEWED) {
        tracing::debug!(event = %event.kind, "Ignoring webhook event");
        return Ok(WebhookAck { received: true });
    }

    let event_id = event
        .id
        .clone()
        .unwrap_or_else(|| payload_fingerprint(payload));
    if !ctx.database.claim_webhook_event(&event_id, now).await? {
        tracing::info!(
            event = %event.kind,
            event_id = %event_id,
            "Duplicate webhook delivery ignored"
        );
        return Ok(WebhookAck { received: true });
    }

    let ledger = ctx.ledger();
    let applied = if event.kind == CHECKOUT_COMPLETED {
        ledger.verify_purchase(token).await.map(|_| ())
    } else {
        match ledger.find_by_payment_token(token).await {
            Ok(sub) => ledger.renew(&sub.id).await.map(|_| ()),
            Err(err) => Err(err),
        }
    };

    match applied {
        Ok(()) => Ok(WebhookAck { received: true }),
        Err(AppError::NotFound(_)) => {
            tracing::warn!(event = %event.kind, "Webhook for unknown payment token");
            Ok(WebhookAck { received: true })
        }
        Err(err) if err.status_code() < 500 => {
            tracing::warn!(event = %event.kind, error = %err, "Webhook event not applied");
            Ok(WebhookAck { received: true })
        }
        Err(err) => {
            ctx.database.release_webhook_event(&event_id).await?;
            Err(err)
        }
    }
}
