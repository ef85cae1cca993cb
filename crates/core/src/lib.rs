//! # UI Analyzer Core
//!
//! Domain model and services behind the UI Analyzer backend: configuration,
//! errors, storage adapters, token handling, the entitlement engine, the
//! subscription ledger and the payment gateway boundary.

pub mod adapters;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logger;
pub mod middleware;
pub mod password;
pub mod plugin;
pub mod token;
pub mod types;
pub mod webhook;

pub use adapters::{
    DatabaseAdapter, MemoryDatabaseAdapter, SubscriptionOps, UsageChange, UsageOutcome,
    UserFetch, UserOps, UserRecord, fetch_user,
};
#[cfg(feature = "postgres")]
pub use adapters::{PoolConfig, SqlxAdapter};
pub use config::{
    AppConfig, Argon2Config, EntitlementConfig, PasswordConfig, PricingConfig, TokenConfig,
    WebhookConfig,
};
pub use entitlement::{Entitlement, EntitlementEngine, RecordedUsage};
pub use error::{
    AppError, AppResult, DatabaseError, FieldError, GatewayError, validate_request_body,
};
pub use gateway::{
    CheckoutRequest, CheckoutSession, DemoGateway, DemoOutcome, PaymentGateway, SessionResult,
};
pub use ledger::{
    PurchaseRequest, PurchaseStarted, ReconcileReport, SubscriptionLedger, VerifyOutcome,
    is_currently_active,
};
pub use logger::{BillingEvent, Logger, TracingLogger};
pub use middleware::{
    BodyLimitConfig, BodyLimitMiddleware, EndpointRateLimit, Middleware, RateLimitConfig,
    RateLimitMiddleware,
};
pub use plugin::{ApiPlugin, ApiRoute, AppContext};
pub use token::{Claims, TokenManager};
pub use types::{
    AppRequest, AppResponse, CreateSubscription, CreateUser, Currency, CustomerInfo,
    HealthCheckResponse, HttpMethod, Language, PaidPlan, PaymentInfo, Plan, Subscription,
    SubscriptionChanges, SubscriptionStatus, SubscriptionSummary, Theme, UpdateUser, Usage,
    UsageKind, User, UserSettings,
};
pub use webhook::{SIGNATURE_HEADER, WebhookError, WebhookVerifier, payload_fingerprint};
