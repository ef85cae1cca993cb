use super::Middleware;
use crate::error::{AppError, AppResult};
use crate::types::{AppRequest, AppResponse};
use async_trait::async_trait;

/// Configuration for body size limit middleware.
#[derive(Debug, Clone)]
pub struct BodyLimitConfig {
    /// Maximum body size in bytes. Defaults to 10 MB.
    pub max_bytes: usize,

    pub enabled: bool,
}

impl Default for BodyLimitConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            enabled: true,
        }
    }
}

impl BodyLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Rejects requests whose body exceeds the configured maximum with 413.
pub struct BodyLimitMiddleware {
    config: BodyLimitConfig,
}

impl BodyLimitMiddleware {
    pub fn new(config: BodyLimitConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for BodyLimitMiddleware {
    fn name(&self) -> &'static str {
        "body-limit"
    }

    async fn before_request(&self, req: &AppRequest) -> AppResult<Option<AppResponse>> {
        if !self.config.enabled {
            return Ok(None);
        }

        if let Some(body) = &req.body
            && body.len() > self.config.max_bytes
        {
            tracing::warn!(path = %req.path, size = body.len(), "Request body too large");
            return Ok(Some(
                AppError::PayloadTooLarge(self.config.max_bytes).into_response(),
            ));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;

    fn make_request_with_body(body_size: usize) -> AppRequest {
        let mut req = AppRequest::new(HttpMethod::Post, "/users/save-analysis");
        req.body = Some(vec![b' '; body_size]);
        req
    }

    #[tokio::test]
    async fn test_body_limit_allows_exact_limit() {
        let mw = BodyLimitMiddleware::new(BodyLimitConfig::new().max_bytes(1024));
        assert!(mw.before_request(&make_request_with_body(512)).await.unwrap().is_none());
        assert!(mw.before_request(&make_request_with_body(1024)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_limit_rejects_over_limit() {
        let mw = BodyLimitMiddleware::new(BodyLimitConfig::new().max_bytes(1024));
        let resp = mw
            .before_request(&make_request_with_body(2048))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.status, 413);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Request body exceeds maximum size of 1024 bytes");
    }

    #[tokio::test]
    async fn test_body_limit_allows_no_body() {
        let mw = BodyLimitMiddleware::new(BodyLimitConfig::new().max_bytes(1024));
        let req = AppRequest::new(HttpMethod::Get, "/subscriptions/me");
        assert!(mw.before_request(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_limit_disabled() {
        let mw = BodyLimitMiddleware::new(BodyLimitConfig::new().max_bytes(10).enabled(false));
        assert!(mw.before_request(&make_request_with_body(1000)).await.unwrap().is_none());
    }
}
