pub mod body_limit;
pub mod rate_limit;

use crate::error::AppResult;
use crate::types::{AppRequest, AppResponse};
use async_trait::async_trait;

/// Request/response hook run around plugin dispatch.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called before the request reaches any plugin.
    ///
    /// `Ok(Some(response))` short-circuits the request.
    async fn before_request(&self, req: &AppRequest) -> AppResult<Option<AppResponse>>;

    /// Called with the produced response. Pass-through by default.
    async fn after_request(
        &self,
        _req: &AppRequest,
        response: AppResponse,
    ) -> AppResult<AppResponse> {
        Ok(response)
    }
}

/// Run `before_request` in order, stopping at the first short-circuit.
pub async fn run_before(
    middlewares: &[Box<dyn Middleware>],
    req: &AppRequest,
) -> AppResult<Option<AppResponse>> {
    for mw in middlewares {
        if let Some(response) = mw.before_request(req).await? {
            tracing::debug!(middleware = mw.name(), path = %req.path, "Request short-circuited");
            return Ok(Some(response));
        }
    }
    Ok(None)
}

/// Run `after_request` in reverse order.
pub async fn run_after(
    middlewares: &[Box<dyn Middleware>],
    req: &AppRequest,
    mut response: AppResponse,
) -> AppResult<AppResponse> {
    for mw in middlewares.iter().rev() {
        response = mw.after_request(req, response).await?;
    }
    Ok(response)
}

pub use body_limit::{BodyLimitConfig, BodyLimitMiddleware};
pub use rate_limit::{EndpointRateLimit, RateLimitConfig, RateLimitMiddleware};
