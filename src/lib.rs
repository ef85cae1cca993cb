//! # UI Analyzer Backend
//!
//! Accounts, usage entitlements and paid subscriptions for the UI Analyzer
//! screenshot tool, served as a JSON API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ui_analyzer::{AppBuilder, AppConfig};
//! use ui_analyzer::adapters::MemoryDatabaseAdapter;
//! use ui_analyzer::plugins::{AuthPlugin, PaymentsPlugin, SubscriptionsPlugin, UsersPlugin};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::new("your-secret-key-that-is-at-least-32-chars");
//!
//!     let app = AppBuilder::new(config)
//!         .database(MemoryDatabaseAdapter::new())
//!         .plugin(AuthPlugin::new())
//!         .plugin(SubscriptionsPlugin::new())
//!         .plugin(PaymentsPlugin::new())
//!         .plugin(UsersPlugin::new())
//!         .build()
//!         .await?;
//!
//!     println!("{:?}", app.plugin_names());
//!     Ok(())
//! }
//! ```

// The app struct lives in the root crate because it wires the plugins
// (ui-analyzer-api) onto the core services (ui-analyzer-core).
pub mod core;
pub mod handlers;

pub use ui_analyzer_core::{
    ApiPlugin, ApiRoute, AppConfig, AppContext, AppError, AppRequest, AppResponse, AppResult,
    Argon2Config, BillingEvent, BodyLimitConfig, Claims, Currency, CustomerInfo, DatabaseAdapter,
    DemoGateway, DemoOutcome, Entitlement, EntitlementConfig, GatewayError, HttpMethod, Logger,
    MemoryDatabaseAdapter, Middleware, PaidPlan, PaymentGateway, Plan, PricingConfig,
    RateLimitConfig, ReconcileReport, Subscription, SubscriptionLedger, SubscriptionStatus,
    TokenManager, Usage, UsageKind, User, WebhookVerifier,
};
pub use ui_analyzer_api::{HttpCheckoutGateway, HttpGatewayConfig};

pub mod types {
    pub use ui_analyzer_core::types::*;
}

pub mod adapters {
    pub use ui_analyzer_core::adapters::{
        DatabaseAdapter, MemoryDatabaseAdapter, SubscriptionOps, UsageChange, UsageOutcome,
        UserOps,
    };

    #[cfg(feature = "postgres")]
    pub use ui_analyzer_core::adapters::{PoolConfig, SqlxAdapter};
}

pub mod plugins {
    pub use ui_analyzer_api::plugins::{
        AuthPlugin, PaymentsPlugin, SubscriptionsPlugin, UsersPlugin,
    };
}

pub use core::{AppBuilder, TypedAppBuilder, UiAnalyzer};

#[cfg(feature = "axum")]
pub use handlers::axum::AxumIntegration;
