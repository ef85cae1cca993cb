use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Entitlement tier attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Yearly,
    Lifetime,
}

/// The purchasable subset of [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaidPlan {
    Yearly,
    Lifetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "TRY")]
    Try,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Tr,
}

/// Metered action recorded against a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Analysis,
    Images,
    Download,
    /// Any other kind. Recording it changes nothing.
    #[serde(other)]
    Unknown,
}

/// Usage counters kept on every user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub total_analyses: u64,
    pub monthly_analyses: u64,
    pub images_analyzed: u64,
    pub reports_downloaded: u64,
    pub last_reset_date: DateTime<Utc>,
}

/// Per-user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Personal model API key. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub email_notifications: bool,
    pub theme: Theme,
    pub language: Language,
}

/// Core user type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub plan: Plan,
    /// Subscription that granted the current plan.
    #[serde(rename = "subscription")]
    pub subscription_id: Option<String>,
    pub usage: Usage,
    pub settings: UserSettings,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub vat_number: Option<String>,
}

/// Payment details reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub card_type: Option<String>,
    pub card_association: Option<String>,
    pub card_family: Option<String>,
    pub last_four_digits: Option<String>,
    pub payment_status: Option<String>,
}

/// A purchase record tracking one plan grant attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    pub plan: PaidPlan,
    pub status: SubscriptionStatus,
    /// Price in minor units; serialized in major units.
    #[serde(rename = "amount", serialize_with = "serialize_major_units")]
    pub amount_minor: u64,
    pub currency: Currency,
    #[serde(rename = "paymentProvider")]
    pub provider: String,
    /// Provider checkout handle. Unique across all subscriptions.
    #[serde(rename = "paymentId")]
    pub payment_token: String,
    pub conversation_id: String,
    pub customer_info: CustomerInfo,
    pub payment_info: Option<PaymentInfo>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plan/status/end-date triple shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub end_date: Option<DateTime<Utc>>,
}

/// User creation data
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// User update data. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub plan: Option<Plan>,
    pub subscription_id: Option<String>,
    /// `Some(None)` clears the stored key.
    pub api_key: Option<Option<String>>,
    pub email_notifications: Option<bool>,
    pub theme: Option<Theme>,
    pub language: Option<Language>,
    pub is_active: Option<bool>,
}

/// Subscription creation data. New subscriptions always start `pending`.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: String,
    pub plan: PaidPlan,
    pub amount_minor: u64,
    pub currency: Currency,
    pub provider: String,
    pub payment_token: String,
    pub conversation_id: String,
    pub customer_info: CustomerInfo,
    pub end_date: Option<DateTime<Utc>>,
}

/// Fields written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub payment_info: Option<PaymentInfo>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// HTTP method enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

/// Framework-independent request
#[derive(Debug, Clone)]
pub struct AppRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub query: HashMap<String, String>,
}

/// Framework-independent response
#[derive(Debug, Clone)]
pub struct AppResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

fn serialize_major_units<S: Serializer>(
    amount_minor: &u64,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(*amount_minor as f64 / 100.0)
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Yearly => "yearly",
            Plan::Lifetime => "lifetime",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PaidPlan> for Plan {
    fn from(plan: PaidPlan) -> Self {
        match plan {
            PaidPlan::Yearly => Plan::Yearly,
            PaidPlan::Lifetime => Plan::Lifetime,
        }
    }
}

impl PaidPlan {
    pub fn as_str(&self) -> &'static str {
        Plan::from(*self).as_str()
    }
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Try => "TRY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "TRY" => Some(Self::Try),
            "USD" => Some(Self::Usd),
            "EUR" => Some(Self::Eur),
            _ => None,
        }
    }
}

impl Usage {
    /// Fresh counters with the reset clock started at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_analyses: 0,
            monthly_analyses: 0,
            images_analyzed: 0,
            reports_downloaded: 0,
            last_reset_date: now,
        }
    }
}

impl Default for Usage {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            email_notifications: true,
            theme: Theme::default(),
            language: Language::default(),
        }
    }
}

impl User {
    /// Build a new free-plan user from creation data.
    pub fn from_create(id: String, create: &CreateUser, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: create.email.clone(),
            name: create.name.clone(),
            password_hash: create.password_hash.clone(),
            plan: Plan::Free,
            subscription_id: None,
            usage: Usage::new(now),
            settings: UserSettings::default(),
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update in place.
    pub fn apply_update(&mut self, update: &UpdateUser, now: DateTime<Utc>) {
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(password_hash) = &update.password_hash {
            self.password_hash = password_hash.clone();
        }
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        if let Some(subscription_id) = &update.subscription_id {
            self.subscription_id = Some(subscription_id.clone());
        }
        if let Some(api_key) = &update.api_key {
            self.settings.api_key = api_key.clone();
        }
        if let Some(email_notifications) = update.email_notifications {
            self.settings.email_notifications = email_notifications;
        }
        if let Some(theme) = update.theme {
            self.settings.theme = theme;
        }
        if let Some(language) = update.language {
            self.settings.language = language;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }

    pub fn has_api_key(&self) -> bool {
        self.settings
            .api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }

    /// Plan summary as shown to the user.
    ///
    /// `subscription` is the record referenced by `subscription_id`, when the
    /// caller fetched it.
    pub fn subscription_summary(&self, subscription: Option<&Subscription>) -> SubscriptionSummary {
        let end_date = match self.plan {
            Plan::Yearly => subscription.and_then(|s| s.end_date),
            _ => None,
        };
        SubscriptionSummary {
            plan: self.plan,
            status: SubscriptionStatus::Active,
            end_date,
        }
    }
}

impl Subscription {
    pub fn from_create(
        id: String,
        create: &CreateSubscription,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: create.user_id.clone(),
            plan: create.plan,
            status: SubscriptionStatus::Pending,
            amount_minor: create.amount_minor,
            currency: create.currency,
            provider: create.provider.clone(),
            payment_token: create.payment_token.clone(),
            conversation_id: create.conversation_id.clone(),
            customer_info: create.customer_info.clone(),
            payment_info: None,
            start_date: now,
            end_date: create.end_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status` and write the accompanying changes.
    pub fn apply_transition(
        &mut self,
        status: SubscriptionStatus,
        changes: &SubscriptionChanges,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        if let Some(info) = &changes.payment_info {
            self.payment_info = Some(info.clone());
        }
        if let Some(start) = changes.start_date {
            self.start_date = start;
        }
        if let Some(end) = changes.end_date {
            self.end_date = Some(end);
        }
        self.updated_at = now;
    }
}

impl AppRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            query: HashMap::new(),
        }
    }

    pub fn from_parts(
        method: HttpMethod,
        path: String,
        headers: HashMap<String, String>,
        body: Option<Vec<u8>>,
        query: HashMap<String, String>,
    ) -> Self {
        Self {
            method,
            path,
            headers,
            body,
            query,
        }
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn body_as_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        if let Some(body) = &self.body {
            serde_json::from_slice(body)
        } else {
            serde_json::from_str("{}")
        }
    }
}

impl AppResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(data)?;
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        let body = text.into().into_bytes();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());

        Self {
            status,
            headers,
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
