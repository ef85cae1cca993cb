//! Bearer token issuance and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Claims carried by every issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Signs and verifies HS256 tokens with the application secret.
pub struct TokenManager {
    config: Arc<AppConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenManager {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issue a token valid from now for the configured lifetime.
    pub fn issue(&self, user_id: &str, email: &str) -> AppResult<String> {
        self.issue_at(user_id, email, Utc::now())
    }

    pub fn issue_at(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            id: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.token.expires_in).timestamp(),
            iss: self.config.token.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::TokenSigning(e.to_string()))
    }

    /// Decode and check a token.
    ///
    /// Fails with [`AppError::TokenExpired`] past the validity window and
    /// [`AppError::InvalidToken`] for any signature or structure problem. This
    /// does not check that the user still exists.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.token.leeway_secs;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.config.token.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::InvalidToken,
            })
    }

    /// Issue a fresh token for an already-authenticated identity.
    pub fn refresh(&self, claims: &Claims) -> AppResult<String> {
        self.issue(&claims.id, &claims.email)
    }
}
