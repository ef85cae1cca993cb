//! Billing audit trail.
//!
//! The ledger reports every subscription state change as a [`BillingEvent`]
//! through the [`Logger`] carried on the config. [`TracingLogger`] writes them
//! as structured `tracing` records; embedders that keep an audit table can
//! plug in their own sink.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::types::PaidPlan;

/// A subscription state change, or a plan change it caused.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    PurchaseStarted {
        user_id: String,
        subscription_id: String,
        plan: PaidPlan,
    },
    Activated {
        user_id: String,
        subscription_id: String,
    },
    Declined {
        subscription_id: String,
        payment_status: String,
    },
    Cancelled {
        subscription_id: String,
    },
    Renewed {
        subscription_id: String,
        end_date: DateTime<Utc>,
    },
    Expired {
        subscription_id: String,
    },
    /// The user's plan fell back to free.
    Downgraded {
        user_id: String,
    },
}

/// Sink for billing events and service lifecycle messages.
///
/// ```rust
/// use ui_analyzer_core::logger::{BillingEvent, Logger};
///
/// struct StderrAudit;
///
/// impl Logger for StderrAudit {
///     fn billing(&self, event: &BillingEvent) {
///         eprintln!("[billing] {:?}", event);
///     }
///
///     fn started(&self, service: &str, plugins: &[&str]) {
///         eprintln!("{} up with {}", service, plugins.join(", "));
///     }
/// }
///
/// StderrAudit.billing(&BillingEvent::Cancelled {
///     subscription_id: "sub_1".into(),
/// });
/// ```
pub trait Logger: Send + Sync {
    fn billing(&self, event: &BillingEvent);

    /// The app finished building with these plugins.
    fn started(&self, service: &str, plugins: &[&str]);
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Logger")
    }
}

/// Default sink, backed by `tracing`. Declines are warnings, everything else
/// is info.
#[derive(Debug, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn billing(&self, event: &BillingEvent) {
        match event {
            BillingEvent::PurchaseStarted {
                user_id,
                subscription_id,
                plan,
            } => tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription_id,
                plan = plan.as_str(),
                "Purchase started"
            ),
            BillingEvent::Activated {
                user_id,
                subscription_id,
            } => tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription_id,
                "Subscription activated"
            ),
            BillingEvent::Declined {
                subscription_id,
                payment_status,
            } => tracing::warn!(
                subscription_id = %subscription_id,
                payment_status = %payment_status,
                "Payment declined"
            ),
            BillingEvent::Cancelled { subscription_id } => {
                tracing::info!(subscription_id = %subscription_id, "Subscription cancelled")
            }
            BillingEvent::Renewed {
                subscription_id,
                end_date,
            } => tracing::info!(
                subscription_id = %subscription_id,
                end_date = %end_date,
                "Subscription renewed"
            ),
            BillingEvent::Expired { subscription_id } => {
                tracing::info!(subscription_id = %subscription_id, "Subscription expired")
            }
            BillingEvent::Downgraded { user_id } => {
                tracing::info!(user_id = %user_id, "Plan reconciled to free")
            }
        }
    }

    fn started(&self, service: &str, plugins: &[&str]) {
        tracing::info!(service, plugins = %plugins.join(", "), "Service initialized");
    }
}
