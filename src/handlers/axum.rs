use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, patch, post, put},
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::UiAnalyzer;
use ui_analyzer_core::{AppError, AppRequest, AppResponse, DatabaseAdapter, HttpMethod};

/// Integration trait for the Axum web framework.
pub trait AxumIntegration<DB: DatabaseAdapter> {
    /// A router serving every mounted route plus `/health`. Unmatched paths
    /// answer with a JSON 404.
    fn axum_router(self) -> Router;
}

impl<DB: DatabaseAdapter> AxumIntegration<DB> for Arc<UiAnalyzer<DB>> {
    fn axum_router(self) -> Router {
        let mut router = Router::new();

        for (method, path) in self.routes() {
            let handler_fn = create_handler::<DB>();
            router = match method {
                HttpMethod::Get => router.route(&path, get(handler_fn)),
                HttpMethod::Post => router.route(&path, post(handler_fn)),
                HttpMethod::Put => router.route(&path, put(handler_fn)),
                HttpMethod::Delete => router.route(&path, delete(handler_fn)),
                HttpMethod::Patch => router.route(&path, patch(handler_fn)),
                _ => router,
            };
        }

        router.fallback(create_handler::<DB>()).with_state(self)
    }
}

type BoxedResponse = std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>;

fn create_handler<DB: DatabaseAdapter>()
-> impl Fn(State<Arc<UiAnalyzer<DB>>>, Request) -> BoxedResponse + Clone + Send + Sync + 'static {
    |State(app): State<Arc<UiAnalyzer<DB>>>, req: Request| {
        Box::pin(async move {
            let response = match convert_axum_request(req).await {
                Ok(app_req) => match app.handle_request(app_req).await {
                    Ok(response) => response,
                    Err(err) => err.into_response(),
                },
                Err(err) => err.into_response(),
            };
            convert_app_response(response)
        })
    }
}

async fn convert_axum_request(req: Request) -> Result<AppRequest, AppError> {
    let (parts, body) = req.into_parts();

    let method = match parts.method {
        axum::http::Method::GET => HttpMethod::Get,
        axum::http::Method::POST => HttpMethod::Post,
        axum::http::Method::PUT => HttpMethod::Put,
        axum::http::Method::DELETE => HttpMethod::Delete,
        axum::http::Method::PATCH => HttpMethod::Patch,
        axum::http::Method::OPTIONS => HttpMethod::Options,
        axum::http::Method::HEAD => HttpMethod::Head,
        _ => return Err(AppError::bad_request("Unsupported HTTP method")),
    };

    // Header names arrive lower-cased from `http`.
    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value_str) = value.to_str() {
            headers.insert(name.to_string(), value_str.to_string());
        }
    }

    let path = percent_decode(parts.uri.path());

    let mut query = HashMap::new();
    if let Some(query_str) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query_str.as_bytes()) {
            query.insert(key.to_string(), value.to_string());
        }
    }

    // Size is enforced by the body limit middleware.
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read request body: {}", e)))?;

    Ok(AppRequest::from_parts(
        method,
        path,
        headers,
        (!body.is_empty()).then(|| body.to_vec()),
        query,
    ))
}

/// Decode `%40` style escapes so path parameters such as emails match.
fn percent_decode(path: &str) -> String {
    let escaped = path.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("p={}", escaped).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn convert_app_response(app_response: AppResponse) -> Response {
    let mut response = Response::builder().status(
        StatusCode::from_u16(app_response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );

    for (name, value) in app_response.headers {
        if let (Ok(header_name), Ok(header_value)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            axum::http::HeaderValue::from_str(&value),
        ) {
            response = response.header(header_name, header_value);
        }
    }

    response
        .body(axum::body::Body::from(app_response.body))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(axum::body::Body::from("Internal server error"));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decode() {
        assert_eq!(
            percent_decode("/api/users/check-email/a%40example.com"),
            "/api/users/check-email/a@example.com"
        );
        assert_eq!(
            percent_decode("/api/users/check-email/a+b@x.io"),
            "/api/users/check-email/a+b@x.io"
        );
        assert_eq!(percent_decode("/api/health"), "/api/health");
    }
}
