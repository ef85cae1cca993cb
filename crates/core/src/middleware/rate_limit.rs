use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Middleware;
use crate::error::{AppError, AppResult};
use crate::types::{AppRequest, AppResponse};

/// Configuration for the rate limiting middleware.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Limit applied to every path without an override.
    pub default: EndpointRateLimit,

    /// Per-path overrides, keyed by the path below the base path
    /// (e.g. "/auth/login").
    pub per_endpoint: HashMap<String, EndpointRateLimit>,

    pub enabled: bool,
}

/// Rate limit parameters for a single endpoint.
#[derive(Debug, Clone)]
pub struct EndpointRateLimit {
    /// Sliding window duration.
    pub window: Duration,

    /// Maximum number of requests allowed within the window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut per_endpoint = HashMap::new();
        per_endpoint.insert(
            "/auth/login".to_string(),
            EndpointRateLimit {
                window: Duration::from_secs(15 * 60),
                max_requests: 10,
            },
        );
        per_endpoint.insert(
            "/auth/register".to_string(),
            EndpointRateLimit {
                window: Duration::from_secs(60 * 60),
                max_requests: 5,
            },
        );

        Self {
            default: EndpointRateLimit {
                window: Duration::from_secs(15 * 60),
                max_requests: 100,
            },
            per_endpoint,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_limit(mut self, window: Duration, max_requests: u32) -> Self {
        self.default = EndpointRateLimit {
            window,
            max_requests,
        };
        self
    }

    pub fn endpoint(
        mut self,
        path: impl Into<String>,
        window: Duration,
        max_requests: u32,
    ) -> Self {
        self.per_endpoint.insert(
            path.into(),
            EndpointRateLimit {
                window,
                max_requests,
            },
        );
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// In-memory sliding-window rate limiter for single-process deployments.
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    /// `"<client>:<path>"` → request instants inside the window.
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// First hop of `X-Forwarded-For`, then `X-Real-IP`, else one shared bucket.
    fn client_key(req: &AppRequest) -> String {
        req.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .or_else(|| req.header("x-real-ip").map(String::as_str))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn limit_for_path(&self, path: &str) -> &EndpointRateLimit {
        self.config
            .per_endpoint
            .get(path)
            .unwrap_or(&self.config.default)
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn before_request(&self, req: &AppRequest) -> AppResult<Option<AppResponse>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let limit = self.limit_for_path(&req.path);
        let client = Self::client_key(req);
        let key = format!("{}:{}", client, req.path);
        let now = Instant::now();
        let window = limit.window;

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = buckets.entry(key).or_default();

        timestamps.retain(|&t| now.duration_since(t) < window);

        if timestamps.len() as u32 >= limit.max_requests {
            let retry_after = timestamps
                .first()
                .map(|&t| {
                    window
                        .as_secs()
                        .saturating_sub(now.duration_since(t).as_secs())
                })
                .unwrap_or(window.as_secs());

            tracing::warn!(client = %client, path = %req.path, "Rate limit exceeded");
            return Ok(Some(AppError::RateLimited { retry_after }.into_response()));
        }

        timestamps.push(now);
        Ok(None)
    }
}
