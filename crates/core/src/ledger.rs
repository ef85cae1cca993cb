//! Subscription ledger: purchase, verification, cancellation and renewal.
//!
//! Subscriptions only move forward: `pending` → `active` → `cancelled` or
//! `expired`, or `pending` → `cancelled`. Every write is a compare-and-set on
//! the current status, so repeated or concurrent provider callbacks settle to
//! a single outcome.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::DatabaseAdapter;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult, GatewayError};
use crate::gateway::{CheckoutRequest, PaymentGateway, SessionResult};
use crate::logger::BillingEvent;
use crate::types::{
    CreateSubscription, Currency, CustomerInfo, PaidPlan, PaymentInfo, Plan, Subscription,
    SubscriptionChanges, SubscriptionStatus, UpdateUser, User,
};

/// Length of one yearly billing period.
pub fn yearly_period() -> Duration {
    Duration::days(365)
}

/// A subscription is currently active iff it is `active` and either lifetime
/// or not yet past its end date.
pub fn is_currently_active(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    if subscription.status != SubscriptionStatus::Active {
        return false;
    }
    match subscription.plan {
        PaidPlan::Lifetime => true,
        PaidPlan::Yearly => subscription.end_date.is_some_and(|end| now < end),
    }
}

/// End date after renewing: one period past the later of the current end and `now`.
pub fn renewal_end_date(
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    if subscription.plan == PaidPlan::Lifetime {
        return Err(AppError::bad_request("Cannot renew lifetime subscription"));
    }
    let base = match subscription.end_date {
        Some(end) if end > now => end,
        _ => now,
    };
    Ok(base + yearly_period())
}

/// Input to [`SubscriptionLedger::start_purchase`].
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub plan: PaidPlan,
    pub currency: Currency,
    pub customer: CustomerInfo,
}

/// A pending purchase awaiting provider confirmation.
#[derive(Debug, Clone)]
pub struct PurchaseStarted {
    pub session_handle: String,
    pub redirect_url: String,
    pub subscription: Subscription,
}

/// Settled result of a verification.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Activated(Subscription),
    Declined {
        subscription: Subscription,
        payment_status: String,
    },
}

/// What [`SubscriptionLedger::reconcile`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Ids of subscriptions moved to `expired`.
    pub expired: Vec<String>,
    /// Set when the user's plan was reset to free.
    pub downgraded: bool,
}

pub struct SubscriptionLedger<DB: DatabaseAdapter> {
    config: Arc<AppConfig>,
    database: Arc<DB>,
    gateway: Arc<dyn PaymentGateway>,
}

impl<DB: DatabaseAdapter> SubscriptionLedger<DB> {
    pub fn new(
        config: Arc<AppConfig>,
        database: Arc<DB>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            config,
            database,
            gateway,
        }
    }

    fn audit(&self, event: BillingEvent) {
        self.config.logger.billing(&event);
    }

    /// Open a checkout session and record a `pending` subscription for it.
    ///
    /// Nothing is persisted when the provider call fails.
    pub async fn start_purchase(
        &self,
        user: &User,
        request: PurchaseRequest,
    ) -> AppResult<PurchaseStarted> {
        if user.plan == Plan::from(request.plan) {
            return Err(AppError::bad_request("You already have this plan"));
        }

        let amount_minor = self
            .config
            .pricing
            .amount_for(request.plan, request.currency)
            .ok_or_else(|| {
                AppError::bad_request(format!(
                    "Currency {} is not supported for the {} plan",
                    request.currency.code(),
                    request.plan.as_str()
                ))
            })?;

        let mut buyer = request.customer;
        buyer.email = user.email.clone();
        if request.currency != Currency::Try {
            buyer.vat_number = None;
        }

        let checkout = CheckoutRequest {
            conversation_id: Uuid::new_v4().to_string(),
            plan: request.plan,
            amount_minor,
            currency: request.currency,
            buyer_id: user.id.clone(),
            buyer,
            callback_url: format!(
                "{}/payment-success?plan={}",
                self.config.frontend_url.trim_end_matches('/'),
                request.plan.as_str()
            ),
        };

        let session = self
            .gateway
            .create_checkout_session(&checkout)
            .await
            .map_err(|err| match err {
                GatewayError::Rejected(reason) => {
                    tracing::warn!(
                        user_id = %user.id,
                        reason = %reason,
                        "Checkout initialization rejected"
                    );
                    AppError::bad_request("Payment initialization failed")
                }
                fault => AppError::Gateway(fault),
            })?;

        let now = Utc::now();
        let subscription = self
            .database
            .create_subscription(CreateSubscription {
                user_id: user.id.clone(),
                plan: request.plan,
                amount_minor,
                currency: request.currency,
                provider: self.gateway.provider().to_string(),
                payment_token: session.session_handle.clone(),
                conversation_id: checkout.conversation_id,
                customer_info: checkout.buyer,
                end_date: match request.plan {
                    PaidPlan::Yearly => Some(now + yearly_period()),
                    PaidPlan::Lifetime => None,
                },
            })
            .await?;

        self.audit(BillingEvent::PurchaseStarted {
            user_id: user.id.clone(),
            subscription_id: subscription.id.clone(),
            plan: request.plan,
        });

        Ok(PurchaseStarted {
            session_handle: session.session_handle,
            redirect_url: session.redirect_url,
            subscription,
        })
    }

    pub async fn find_by_payment_token(&self, token: &str) -> AppResult<Subscription> {
        self.database
            .get_subscription_by_payment_token(token)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription not found"))
    }

    /// Fetch a subscription owned by `user_id`. Someone else's subscription
    /// is reported as missing.
    pub async fn get_owned(&self, subscription_id: &str, user_id: &str) -> AppResult<Subscription> {
        match self.database.get_subscription_by_id(subscription_id).await? {
            Some(subscription) if subscription.user_id == user_id => Ok(subscription),
            _ => Err(AppError::not_found("Subscription not found")),
        }
    }

    /// Ask the provider how a checkout ended and settle the subscription.
    ///
    /// A legitimate decline is an `Ok(Declined)`. Transport and malformed
    /// responses are errors and leave the subscription `pending`. Verifying a
    /// settled subscription returns the stored outcome without calling the
    /// provider.
    pub async fn verify_purchase(&self, token: &str) -> AppResult<VerifyOutcome> {
        let subscription = self.find_by_payment_token(token).await?;

        if subscription.status != SubscriptionStatus::Pending {
            return self.settled_outcome(subscription).await;
        }

        let result = match self.gateway.retrieve_session_result(token).await {
            Ok(result) => result,
            Err(GatewayError::Rejected(reason)) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    reason = %reason,
                    "Provider rejected verification"
                );
                SessionResult {
                    succeeded: false,
                    payment_info: PaymentInfo {
                        payment_status: Some("FAILURE".into()),
                        ..Default::default()
                    },
                }
            }
            Err(fault) => {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %fault,
                    "Payment verification fault"
                );
                return Err(AppError::Gateway(fault));
            }
        };

        let now = Utc::now();
        if result.succeeded {
            let changes = SubscriptionChanges {
                payment_info: Some(result.payment_info),
                start_date: Some(now),
                end_date: match subscription.plan {
                    PaidPlan::Yearly => Some(now + yearly_period()),
                    PaidPlan::Lifetime => None,
                },
            };
            let activated = self
                .database
                .transition_subscription(
                    &subscription.id,
                    SubscriptionStatus::Pending,
                    SubscriptionStatus::Active,
                    changes,
                )
                .await?;

            match activated {
                Some(activated) => {
                    self.adopt_if_latest(&activated).await?;
                    self.audit(BillingEvent::Activated {
                        user_id: activated.user_id.clone(),
                        subscription_id: activated.id.clone(),
                    });
                    Ok(VerifyOutcome::Activated(activated))
                }
                None => self.reread_outcome(&subscription.id).await,
            }
        } else {
            let mut payment_info = result.payment_info;
            let payment_status = payment_info
                .payment_status
                .get_or_insert_with(|| "FAILURE".to_string())
                .clone();
            let declined = self
                .database
                .transition_subscription(
                    &subscription.id,
                    SubscriptionStatus::Pending,
                    SubscriptionStatus::Cancelled,
                    SubscriptionChanges {
                        payment_info: Some(payment_info),
                        ..Default::default()
                    },
                )
                .await?;

            match declined {
                Some(declined) => {
                    self.audit(BillingEvent::Declined {
                        subscription_id: declined.id.clone(),
                        payment_status: payment_status.clone(),
                    });
                    Ok(VerifyOutcome::Declined {
                        subscription: declined,
                        payment_status,
                    })
                }
                None => self.reread_outcome(&subscription.id).await,
            }
        }
    }

    async fn reread_outcome(&self, subscription_id: &str) -> AppResult<VerifyOutcome> {
        let subscription = self
            .database
            .get_subscription_by_id(subscription_id)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription not found"))?;
        self.settled_outcome(subscription).await
    }

    async fn settled_outcome(&self, subscription: Subscription) -> AppResult<VerifyOutcome> {
        match subscription.status {
            SubscriptionStatus::Active => {
                self.link_if_unlinked(&subscription).await?;
                Ok(VerifyOutcome::Activated(subscription))
            }
            SubscriptionStatus::Pending => Err(AppError::conflict(
                "Payment verification already in progress",
            )),
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                let payment_status = subscription
                    .payment_info
                    .as_ref()
                    .and_then(|info| info.payment_status.clone())
                    .unwrap_or_else(|| subscription.status.as_str().to_uppercase());
                Ok(VerifyOutcome::Declined {
                    subscription,
                    payment_status,
                })
            }
        }
    }

    /// Repair an owner left without a subscription reference by an
    /// interrupted activation. An owner already linked to any subscription
    /// is left alone.
    async fn link_if_unlinked(&self, subscription: &Subscription) -> AppResult<()> {
        let user = self
            .database
            .get_user_by_id(&subscription.user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;
        if user.subscription_id.is_some() {
            return Ok(());
        }

        self.database
            .update_user(
                &user.id,
                UpdateUser {
                    plan: Some(subscription.plan.into()),
                    subscription_id: Some(subscription.id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Point the owner at `subscription` unless a later activation already owns the plan.
    async fn adopt_if_latest(&self, subscription: &Subscription) -> AppResult<()> {
        let user = self
            .database
            .get_user_by_id(&subscription.user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if user.subscription_id.as_deref() == Some(subscription.id.as_str()) {
            return Ok(());
        }

        if let Some(current_id) = user.subscription_id.as_deref()
            && let Some(current) = self.database.get_subscription_by_id(current_id).await?
            && current.status == SubscriptionStatus::Active
            && current.start_date > subscription.start_date
        {
            return Ok(());
        }

        self.database
            .update_user(
                &user.id,
                UpdateUser {
                    plan: Some(subscription.plan.into()),
                    subscription_id: Some(subscription.id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Cancel a subscription on its owner's request.
    ///
    /// The owner keeps their plan. Running [`reconcile`](Self::reconcile)
    /// later is what downgrades them.
    pub async fn cancel(
        &self,
        subscription_id: &str,
        requesting_user_id: &str,
    ) -> AppResult<Subscription> {
        loop {
            let subscription = self.get_owned(subscription_id, requesting_user_id).await?;

            if subscription.plan == PaidPlan::Lifetime {
                return Err(AppError::bad_request("Cannot cancel lifetime subscription"));
            }

            let expected = match subscription.status {
                SubscriptionStatus::Cancelled => return Ok(subscription),
                SubscriptionStatus::Expired => {
                    return Err(AppError::bad_request("Subscription has already expired"));
                }
                status => status,
            };

            if let Some(cancelled) = self
                .database
                .transition_subscription(
                    subscription_id,
                    expected,
                    SubscriptionStatus::Cancelled,
                    SubscriptionChanges::default(),
                )
                .await?
            {
                self.audit(BillingEvent::Cancelled {
                    subscription_id: cancelled.id.clone(),
                });
                return Ok(cancelled);
            }
        }
    }

    /// Extend an active yearly subscription by one period.
    pub async fn renew(&self, subscription_id: &str) -> AppResult<Subscription> {
        loop {
            let subscription = self
                .database
                .get_subscription_by_id(subscription_id)
                .await?
                .ok_or_else(|| AppError::not_found("Subscription not found"))?;

            let end_date = renewal_end_date(&subscription, Utc::now())?;
            if subscription.status != SubscriptionStatus::Active {
                return Err(AppError::bad_request(format!(
                    "Cannot renew a {} subscription",
                    subscription.status.as_str()
                )));
            }

            if let Some(renewed) = self
                .database
                .transition_subscription(
                    subscription_id,
                    SubscriptionStatus::Active,
                    SubscriptionStatus::Active,
                    SubscriptionChanges {
                        end_date: Some(end_date),
                        ..Default::default()
                    },
                )
                .await?
            {
                self.audit(BillingEvent::Renewed {
                    subscription_id: renewed.id.clone(),
                    end_date,
                });
                return Ok(renewed);
            }
        }
    }

    /// A user's subscriptions, newest first.
    pub async fn history(&self, user_id: &str) -> AppResult<Vec<Subscription>> {
        self.database.list_user_subscriptions(user_id).await
    }

    /// Expire lapsed yearly subscriptions and drop the user to free when
    /// the subscription behind their plan is no longer active.
    pub async fn reconcile(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for subscription in self.database.list_user_subscriptions(user_id).await? {
            let lapsed = subscription.status == SubscriptionStatus::Active
                && subscription.plan == PaidPlan::Yearly
                && subscription.end_date.is_some_and(|end| end <= now);
            if lapsed
                && self
                    .database
                    .transition_subscription(
                        &subscription.id,
                        SubscriptionStatus::Active,
                        SubscriptionStatus::Expired,
                        SubscriptionChanges::default(),
                    )
                    .await?
                    .is_some()
            {
                self.audit(BillingEvent::Expired {
                    subscription_id: subscription.id.clone(),
                });
                report.expired.push(subscription.id);
            }
        }

        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if user.plan.is_paid() {
            let backing = match user.subscription_id.as_deref() {
                Some(id) => self.database.get_subscription_by_id(id).await?,
                None => None,
            };
            if !backing.is_some_and(|sub| is_currently_active(&sub, now)) {
                self.database
                    .update_user(
                        user_id,
                        UpdateUser {
                            plan: Some(Plan::Free),
                            ..Default::default()
                        },
                    )
                    .await?;
                report.downgraded = true;
                self.audit(BillingEvent::Downgraded {
                    user_id: user_id.to_string(),
                });
            }
        }

        Ok(report)
    }
}
