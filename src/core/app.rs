use std::sync::Arc;

use chrono::Utc;

use ui_analyzer_core::{
    ApiPlugin, AppConfig, AppContext, AppError, AppRequest, AppResponse, AppResult,
    DatabaseAdapter, DemoGateway, HealthCheckResponse, HttpMethod, PaymentGateway,
    middleware::{
        self, BodyLimitConfig, BodyLimitMiddleware, Middleware, RateLimitConfig,
        RateLimitMiddleware,
    },
};

/// The assembled backend, generic over the storage adapter.
pub struct UiAnalyzer<DB: DatabaseAdapter> {
    config: Arc<AppConfig>,
    plugins: Vec<Box<dyn ApiPlugin<DB>>>,
    middlewares: Vec<Box<dyn Middleware>>,
    context: AppContext<DB>,
}

/// Initial builder. Call `.database(adapter)` to obtain a [`TypedAppBuilder`].
pub struct AppBuilder {
    config: AppConfig,
    gateway: Option<Arc<dyn PaymentGateway>>,
    rate_limit_config: Option<RateLimitConfig>,
    body_limit_config: Option<BodyLimitConfig>,
}

/// Typed builder returned by [`AppBuilder::database`].
///
/// Accepts plugins, a payment gateway and middleware before `.build()`.
pub struct TypedAppBuilder<DB: DatabaseAdapter> {
    config: AppConfig,
    database: Arc<DB>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    plugins: Vec<Box<dyn ApiPlugin<DB>>>,
    rate_limit_config: Option<RateLimitConfig>,
    body_limit_config: Option<BodyLimitConfig>,
    custom_middlewares: Vec<Box<dyn Middleware>>,
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            gateway: None,
            rate_limit_config: None,
            body_limit_config: None,
        }
    }

    /// Set the storage adapter, returning a [`TypedAppBuilder`].
    pub fn database<DB: DatabaseAdapter>(self, database: DB) -> TypedAppBuilder<DB> {
        TypedAppBuilder {
            config: self.config,
            database: Arc::new(database),
            gateway: self.gateway,
            plugins: Vec::new(),
            rate_limit_config: self.rate_limit_config,
            body_limit_config: self.body_limit_config,
            custom_middlewares: Vec::new(),
        }
    }

    /// Set the payment provider. Defaults to a [`DemoGateway`].
    pub fn gateway<G: PaymentGateway + 'static>(mut self, gateway: G) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }

    /// Configure rate limiting.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = Some(config);
        self
    }

    /// Configure body size limit.
    pub fn body_limit(mut self, config: BodyLimitConfig) -> Self {
        self.body_limit_config = Some(config);
        self
    }
}

impl<DB: DatabaseAdapter> TypedAppBuilder<DB> {
    /// Mount a group of endpoints.
    pub fn plugin<P: ApiPlugin<DB> + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Set the payment provider. Defaults to a [`DemoGateway`].
    pub fn gateway<G: PaymentGateway + 'static>(self, gateway: G) -> Self {
        self.shared_gateway(Arc::new(gateway))
    }

    /// Set a payment provider the caller keeps a handle to.
    pub fn shared_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Configure rate limiting.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = Some(config);
        self
    }

    /// Configure body size limit.
    pub fn body_limit(mut self, config: BodyLimitConfig) -> Self {
        self.body_limit_config = Some(config);
        self
    }

    /// Add a custom middleware, run after the built-in ones.
    pub fn middleware<M: Middleware + 'static>(mut self, mw: M) -> Self {
        self.custom_middlewares.push(Box::new(mw));
        self
    }

    pub async fn build(self) -> AppResult<UiAnalyzer<DB>> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => {
                tracing::warn!("No payment gateway configured, using the demo gateway");
                Arc::new(DemoGateway::new(format!(
                    "{}/payment/demo",
                    config.frontend_url.trim_end_matches('/')
                )))
            }
        };
        tracing::info!(provider = gateway.provider(), "Payment gateway ready");

        let mut context = AppContext::new(config.clone(), self.database, gateway);
        for plugin in &self.plugins {
            plugin.on_init(&mut context).await?;
        }
        let names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        config.logger.started(&config.service_name, &names);

        // Order matters: body limit → rate limit → custom
        let mut middlewares: Vec<Box<dyn Middleware>> = vec![
            Box::new(BodyLimitMiddleware::new(
                self.body_limit_config.unwrap_or_default(),
            )),
            Box::new(RateLimitMiddleware::new(
                self.rate_limit_config.unwrap_or_default(),
            )),
        ];
        middlewares.extend(self.custom_middlewares);

        Ok(UiAnalyzer {
            config,
            plugins: self.plugins,
            middlewares,
            context,
        })
    }
}

impl<DB: DatabaseAdapter> UiAnalyzer<DB> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(config: AppConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Handle a request addressed to `{base_path}/...` or `/health`.
    ///
    /// Errors are converted into JSON responses via [`AppError::into_response`].
    pub async fn handle_request(&self, mut req: AppRequest) -> AppResult<AppResponse> {
        if !self.strip_base_path(&mut req) {
            let response = AppError::not_found("Route not found").into_response();
            return Ok(response);
        }

        match self.handle_request_inner(&req).await {
            Ok(response) => middleware::run_after(&self.middlewares, &req, response).await,
            Err(err) => {
                let response = err.into_response();
                middleware::run_after(&self.middlewares, &req, response).await
            }
        }
    }

    /// Rewrite `req.path` relative to the base path. `/health` is served at
    /// the root as well. Returns `false` for paths outside both.
    fn strip_base_path(&self, req: &mut AppRequest) -> bool {
        if req.path == "/health" {
            return true;
        }
        let base = self.config.base_path.trim_end_matches('/');
        if base.is_empty() {
            return true;
        }
        match req.path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                req.path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
                true
            }
            _ => false,
        }
    }

    async fn handle_request_inner(&self, req: &AppRequest) -> AppResult<AppResponse> {
        if let Some(response) = middleware::run_before(&self.middlewares, req).await? {
            return Ok(response);
        }

        if let (HttpMethod::Get, "/health") = (req.method(), req.path()) {
            let health = HealthCheckResponse {
                status: "healthy",
                timestamp: Utc::now(),
                service: self.config.service_name.clone(),
            };
            return Ok(AppResponse::json(200, &health)?);
        }

        for plugin in &self.plugins {
            if let Some(response) = plugin.on_request(req, &self.context).await? {
                return Ok(response);
            }
        }

        Err(AppError::not_found("Route not found"))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<DB> {
        &self.context.database
    }

    /// Shared services, e.g. for running `ctx.ledger().reconcile(..)` from a job.
    pub fn context(&self) -> &AppContext<DB> {
        &self.context
    }

    /// `(method, full path)` of every mounted route.
    pub fn routes(&self) -> Vec<(HttpMethod, String)> {
        let base = self.config.base_path.trim_end_matches('/');
        let mut routes = vec![(HttpMethod::Get, "/health".to_string())];
        for plugin in &self.plugins {
            for route in plugin.routes() {
                routes.push((route.method, format!("{}{}", base, route.path)));
            }
        }
        routes
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}
