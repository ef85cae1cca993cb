use serde::Serialize;
use thiserror::Error;

use crate::types::{AppRequest, AppResponse, Plan, Usage};

/// Application error types.
///
/// Each variant maps to an HTTP status code via [`AppError::status_code`].
/// Use [`AppError::into_response`] to produce the JSON error body clients
/// expect: `{ "error": "..." }` plus variant-specific fields.
#[derive(Error, Debug)]
pub enum AppError {
    // --- 400 Bad Request ---
    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Payment failed")]
    PaymentDeclined { payment_status: String },

    // --- 401 Unauthorized ---
    #[error("Access token required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token - user not found or inactive")]
    InactiveAccount,

    #[error("Invalid email or password")]
    InvalidCredentials,

    // --- 403 Forbidden ---
    #[error("{0}")]
    Forbidden(String),

    #[error("Usage limit reached")]
    UsageLimitReached { usage: Usage, plan: Plan },

    // --- 404 Not Found ---
    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    NotFound(String),

    // --- 409 Conflict ---
    #[error("{0}")]
    Conflict(String),

    // --- 413 Payload Too Large ---
    #[error("Request body exceeds maximum size of {0} bytes")]
    PayloadTooLarge(usize),

    // --- 429 Too Many Requests ---
    #[error("Too many requests, please try again later")]
    RateLimited { retry_after: u64 },

    // --- 502 Bad Gateway ---
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- 500 Internal Server Error ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Token signing error: {0}")]
    TokenSigning(String),
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            // 400
            Self::BadRequest(_) | Self::Validation(_) | Self::PaymentDeclined { .. } => 400,
            // 401
            Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InactiveAccount
            | Self::InvalidCredentials => 401,
            // 403
            Self::Forbidden(_) | Self::UsageLimitReached { .. } => 403,
            // 404
            Self::UserNotFound | Self::NotFound(_) => 404,
            // 409
            Self::Conflict(_) => 409,
            // 413
            Self::PayloadTooLarge(_) => 413,
            // 429
            Self::RateLimited { .. } => 429,
            // 502
            Self::Gateway(_) => 502,
            // 500
            Self::Config(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Internal(_)
            | Self::PasswordHash(_)
            | Self::TokenSigning(_) => 500,
        }
    }

    /// Convert this error into a JSON [`AppResponse`].
    ///
    /// Server-side failures are logged with full detail and answered with a
    /// generic message.
    pub fn into_response(self) -> AppResponse {
        let status = self.status_code();
        let body = match &self {
            Self::Gateway(_) => {
                tracing::error!(error = %self, "Payment gateway fault");
                serde_json::json!({ "error": "Payment provider unavailable" })
            }
            _ if status >= 500 => {
                tracing::error!(error = %self, "Request failed");
                serde_json::json!({ "error": "Internal server error" })
            }
            Self::Validation(details) => serde_json::json!({
                "error": self.to_string(),
                "details": details,
            }),
            Self::PaymentDeclined { payment_status } => serde_json::json!({
                "error": self.to_string(),
                "paymentStatus": payment_status,
            }),
            Self::RateLimited { retry_after } => serde_json::json!({
                "error": self.to_string(),
                "retryAfter": retry_after,
            }),
            Self::UsageLimitReached { usage, plan } => serde_json::json!({
                "error": self.to_string(),
                "usage": usage,
                "plan": plan,
                "upgradeRequired": true,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        let response = AppResponse::json(status, &body)
            .unwrap_or_else(|_| AppResponse::text(status, "Internal server error"));

        match self {
            Self::RateLimited { retry_after } => {
                response.with_header("Retry-After", retry_after.to_string())
            }
            _ => response,
        }
    }

    // --- Constructors ---

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// A single-field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Failures at the payment provider boundary.
///
/// `Transport` and `Malformed` are infrastructure faults. `Rejected` means the
/// provider refused the request and is handled as a payment failure.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider rejected request: {0}")]
    Rejected(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DatabaseError::Constraint(db_err.to_string())
                } else {
                    DatabaseError::Query(db_err.to_string())
                }
            }
            sqlx::Error::PoolClosed => DatabaseError::Connection("Pool closed".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::Connection("Pool timed out".to_string()),
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Flatten `validator::ValidationErrors` into field-level details.
///
/// Nested structs are reported with dotted paths such as `customerInfo.name`.
pub fn field_errors(errors: &validator::ValidationErrors) -> Vec<FieldError> {
    let mut details = Vec::new();
    collect_field_errors(errors, None, &mut details);
    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}

fn collect_field_errors(
    errors: &validator::ValidationErrors,
    prefix: Option<&str>,
    out: &mut Vec<FieldError>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| FieldError {
                    field: path.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", path)),
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(nested, Some(&path), out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(nested, Some(&format!("{}[{}]", path, index)), out);
                }
            }
        }
    }
}

/// Parse and validate a JSON request body.
///
/// Malformed JSON and failed validation rules both surface as
/// [`AppError::Validation`].
pub fn validate_request_body<T>(req: &AppRequest) -> AppResult<T>
where
    T: serde::de::DeserializeOwned + validator::Validate,
{
    let value: T = req
        .body_as_json()
        .map_err(|e| AppError::validation("body", format!("Invalid JSON: {}", e)))?;

    value
        .validate()
        .map_err(|e| AppError::Validation(field_errors(&e)))?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(err: AppError) -> (u16, serde_json::Value) {
        let response = err.into_response();
        (
            response.status,
            serde_json::from_slice(&response.body).unwrap(),
        )
    }

    #[test]
    fn test_auth_errors_carry_exact_messages() {
        assert_eq!(body_of(AppError::MissingToken).1["error"], "Access token required");
        assert_eq!(body_of(AppError::InvalidToken).1["error"], "Invalid token");
        assert_eq!(body_of(AppError::TokenExpired).1["error"], "Token expired");
        assert_eq!(
            body_of(AppError::InactiveAccount).1["error"],
            "Invalid token - user not found or inactive"
        );
        for err in [AppError::MissingToken, AppError::TokenExpired, AppError::InactiveAccount] {
            assert_eq!(err.status_code(), 401);
        }
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let (status, body) = body_of(AppError::Database(DatabaseError::Query(
            "relation \"users\" does not exist".into(),
        )));
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("relation"));

        let (status, body) = body_of(AppError::Gateway(GatewayError::Transport(
            "connect timeout to 10.0.0.3".into(),
        )));
        assert_eq!(status, 502);
        assert_eq!(body["error"], "Payment provider unavailable");
    }

    #[test]
    fn test_usage_limit_body() {
        let usage = Usage::default();
        let (status, body) = body_of(AppError::UsageLimitReached {
            usage,
            plan: Plan::Free,
        });
        assert_eq!(status, 403);
        assert_eq!(body["plan"], "free");
        assert_eq!(body["upgradeRequired"], true);
        assert_eq!(body["usage"]["monthlyAnalyses"], 0);
    }

    #[test]
    fn test_declined_payment_body() {
        let (status, body) = body_of(AppError::PaymentDeclined {
            payment_status: "FAILURE".into(),
        });
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Payment failed");
        assert_eq!(body["paymentStatus"], "FAILURE");
    }

    #[test]
    fn test_validation_details() {
        let (status, body) = body_of(AppError::validation("email", "Please provide a valid email"));
        assert_eq!(status, 400);
        assert_eq!(body["details"][0]["field"], "email");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status, 429);
        assert_eq!(response.headers.get("Retry-After").map(String::as_str), Some("42"));
    }
}
