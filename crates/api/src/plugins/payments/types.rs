use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use ui_analyzer_core::{Currency, CustomerInfo, PaidPlan, Subscription, SubscriptionStatus};

/// E.164: optional `+`, a non-zero leading digit, at most 15 digits in total.
pub(crate) fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let valid = (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Please provide a valid phone number".into());
        Err(err)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomerInfoRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub(crate) name: String,
    #[validate(custom(function = "validate_phone"))]
    pub(crate) phone: Option<String>,
    pub(crate) vat_number: Option<String>,
}

impl From<&CustomerInfoRequest> for CustomerInfo {
    fn from(info: &CustomerInfoRequest) -> Self {
        Self {
            name: info.name.trim().to_string(),
            email: String::new(),
            phone: info.phone.clone(),
            vat_number: info.vat_number.clone().filter(|v| !v.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePaymentRequest {
    pub(crate) plan: PaidPlan,
    #[serde(default = "default_currency")]
    pub(crate) currency: Currency,
    #[validate(nested)]
    pub(crate) customer_info: CustomerInfoRequest,
}

fn default_currency() -> Currency {
    Currency::Try
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Payment token is required"))]
    pub(crate) token: String,
}

/// Inbound provider event.
#[derive(Debug, Deserialize)]
pub(crate) struct WebhookEvent {
    /// Provider event id, stable across redeliveries.
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) data: WebhookEventData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebhookEventData {
    pub(crate) token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePaymentResponse {
    pub(crate) success: bool,
    pub(crate) payment_page_url: String,
    pub(crate) token: String,
    pub(crate) subscription_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionBrief {
    pub(crate) id: String,
    pub(crate) plan: PaidPlan,
    pub(crate) status: SubscriptionStatus,
    pub(crate) start_date: DateTime<Utc>,
    pub(crate) end_date: Option<DateTime<Utc>>,
}

impl From<Subscription> for SubscriptionBrief {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            plan: sub.plan,
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyPaymentResponse {
    pub(crate) success: bool,
    pub(crate) subscription: SubscriptionBrief,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentStatusResponse {
    pub(crate) id: String,
    pub(crate) plan: PaidPlan,
    pub(crate) status: SubscriptionStatus,
    pub(crate) amount: f64,
    pub(crate) currency: Currency,
    pub(crate) start_date: DateTime<Utc>,
    pub(crate) end_date: Option<DateTime<Utc>>,
    pub(crate) is_active: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WebhookAck {
    pub(crate) received: bool,
}
