use crate::error::AppError;
use crate::logger::{Logger, TracingLogger};
use crate::types::{Currency, PaidPlan};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

/// Main configuration for the UI Analyzer backend.
#[derive(Clone)]
pub struct AppConfig {
    /// Secret key used to sign bearer tokens.
    pub secret: String,

    /// Service name reported by the health endpoint.
    ///
    /// Defaults to `"ui-analyzer-backend"`.
    pub service_name: String,

    /// Public URL of the frontend. Checkout callbacks point here.
    pub frontend_url: String,

    /// Base path the API routes are mounted under.
    ///
    /// Plugin routes are matched relative to this path, so with the default
    /// `"/api"` the login route is served at `"/api/auth/login"`.
    pub base_path: String,

    /// Exposes `POST /subscriptions/reset-usage`. Meant for development only.
    pub enable_usage_reset: bool,

    /// Logger implementation for application logging.
    ///
    /// Defaults to a [`TracingLogger`](crate::logger::TracingLogger).
    pub logger: Arc<dyn Logger>,

    /// Bearer token configuration
    pub token: TokenConfig,

    /// Password policy
    pub password: PasswordConfig,

    /// Usage limits
    pub entitlement: EntitlementConfig,

    /// Plan price table
    pub pricing: PricingConfig,

    /// Inbound payment webhook verification
    pub webhook: WebhookConfig,
}

/// Bearer token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Validity window of an issued token.
    pub expires_in: Duration,

    /// Issuer claim. Checked on verification when set.
    pub issuer: Option<String>,

    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

/// Password policy
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,

    /// Argon2 configuration
    pub argon2_config: Argon2Config,
}

/// Argon2 hashing configuration
#[derive(Debug, Clone)]
pub struct Argon2Config {
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// Free-tier limits and paid-plan enforcement.
#[derive(Debug, Clone)]
pub struct EntitlementConfig {
    /// Analyses a free user may run per calendar month.
    pub free_monthly_analyses: u32,

    /// When set, a paid plan grants unlimited analyses only while the
    /// subscription it references is currently active.
    pub enforce_subscription_activity: bool,
}

/// Plan prices in minor currency units.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    prices: HashMap<(PaidPlan, Currency), u64>,
}

/// Inbound webhook verification
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for `x-webhook-signature`. Webhooks are rejected when unset.
    pub secret: Option<String>,

    /// Maximum age of a signed timestamp.
    pub tolerance: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            service_name: "ui-analyzer-backend".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            base_path: "/api".to_string(),
            enable_usage_reset: false,
            logger: Arc::new(TracingLogger),
            token: TokenConfig::default(),
            password: PasswordConfig::default(),
            entitlement: EntitlementConfig::default(),
            pricing: PricingConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expires_in: Duration::days(7),
            issuer: None,
            leeway_secs: 0,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 128,
            argon2_config: Argon2Config::default(),
        }
    }
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost: 19_456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            free_monthly_analyses: 3,
            enforce_subscription_activity: false,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self::empty()
            .price(PaidPlan::Yearly, Currency::Usd, 1_000)
            .price(PaidPlan::Yearly, Currency::Try, 30_000)
            .price(PaidPlan::Lifetime, Currency::Usd, 2_000)
            .price(PaidPlan::Lifetime, Currency::Try, 60_000)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance: Duration::seconds(300),
        }
    }
}

impl PricingConfig {
    /// A table with no prices. Every currency is unsupported until priced.
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Set the price of `plan` in `currency`, in minor units (cents, kuruş).
    pub fn price(mut self, plan: PaidPlan, currency: Currency, amount_minor: u64) -> Self {
        self.prices.insert((plan, currency), amount_minor);
        self
    }

    /// Price in minor units, or `None` when the currency is not offered for this plan.
    pub fn amount_for(&self, plan: PaidPlan, currency: Currency) -> Option<u64> {
        self.prices.get(&(plan, currency)).copied()
    }
}

impl AppConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// `JWT_SECRET` is required. `FRONTEND_URL`, `WEBHOOK_SECRET`,
    /// `FREE_MONTHLY_ANALYSES`, `TOKEN_TTL_DAYS` and `ENABLE_USAGE_RESET`
    /// override the defaults when present.
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::config("JWT_SECRET must be set"))?;
        let mut config = Self::new(secret);

        if let Ok(url) = std::env::var("FRONTEND_URL") {
            config = config.frontend_url(url);
        }
        if let Ok(secret) = std::env::var("WEBHOOK_SECRET") {
            config = config.webhook_secret(secret);
        }
        if let Ok(raw) = std::env::var("FREE_MONTHLY_ANALYSES") {
            let limit = raw
                .parse()
                .map_err(|_| AppError::config(format!("Invalid FREE_MONTHLY_ANALYSES: {raw}")))?;
            config = config.free_monthly_analyses(limit);
        }
        if let Ok(raw) = std::env::var("TOKEN_TTL_DAYS") {
            let days: i64 = raw
                .parse()
                .map_err(|_| AppError::config(format!("Invalid TOKEN_TTL_DAYS: {raw}")))?;
            config = config.token_expires_in(Duration::days(days));
        }
        if let Ok(raw) = std::env::var("ENABLE_USAGE_RESET") {
            config = config.enable_usage_reset(matches!(raw.as_str(), "1" | "true" | "yes"));
        }

        Ok(config)
    }

    /// Set the service name reported by `/health`.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the frontend URL (e.g. `"https://uianalyzer.app"`).
    pub fn frontend_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_url = url.into();
        self
    }

    /// Set the base path where API routes are mounted.
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    pub fn enable_usage_reset(mut self, enabled: bool) -> Self {
        self.enable_usage_reset = enabled;
        self
    }

    /// Set a custom logger implementation.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the token validity window.
    pub fn token_expires_in(mut self, duration: Duration) -> Self {
        self.token.expires_in = duration;
        self
    }

    pub fn token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token.issuer = Some(issuer.into());
        self
    }

    /// Set the minimum password length.
    pub fn password_min_length(mut self, length: usize) -> Self {
        self.password.min_length = length;
        self
    }

    /// Set the free plan's monthly analysis allowance.
    pub fn free_monthly_analyses(mut self, limit: u32) -> Self {
        self.entitlement.free_monthly_analyses = limit;
        self
    }

    pub fn enforce_subscription_activity(mut self, enforce: bool) -> Self {
        self.entitlement.enforce_subscription_activity = enforce;
        self
    }

    /// Replace the price table.
    pub fn pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    /// Set the shared secret for payment webhooks.
    pub fn webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook.secret = Some(secret.into());
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.secret.is_empty() {
            return Err(AppError::config("Secret key cannot be empty"));
        }

        if self.secret.len() < 32 {
            return Err(AppError::config(
                "Secret key must be at least 32 characters",
            ));
        }

        if self.password.min_length > self.password.max_length {
            return Err(AppError::config(
                "Password minimum length exceeds maximum length",
            ));
        }

        if self.token.expires_in <= Duration::zero() {
            return Err(AppError::config("Token lifetime must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prices() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.amount_for(PaidPlan::Yearly, Currency::Usd), Some(1_000));
        assert_eq!(pricing.amount_for(PaidPlan::Yearly, Currency::Try), Some(30_000));
        assert_eq!(pricing.amount_for(PaidPlan::Lifetime, Currency::Usd), Some(2_000));
        assert_eq!(pricing.amount_for(PaidPlan::Lifetime, Currency::Try), Some(60_000));
        assert_eq!(pricing.amount_for(PaidPlan::Yearly, Currency::Eur), None);
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        assert!(AppConfig::new("short").validate().is_err());
        assert!(AppConfig::new("").validate().is_err());
        assert!(
            AppConfig::new("a-secret-key-that-is-at-least-32-chars")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_inverted_password_bounds() {
        let config =
            AppConfig::new("a-secret-key-that-is-at-least-32-chars").password_min_length(200);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let config = AppConfig::new("a-secret-key-that-is-at-least-32-chars");
        assert_eq!(config.token.expires_in, Duration::days(7));
        assert_eq!(config.password.min_length, 6);
        assert_eq!(config.entitlement.free_monthly_analyses, 3);
        assert!(!config.entitlement.enforce_subscription_activity);
        assert!(!config.enable_usage_reset);
        assert_eq!(config.base_path, "/api");
        assert_eq!(config.webhook.tolerance, Duration::seconds(300));
    }
}
