use async_trait::async_trait;
use std::sync::Arc;

use crate::adapters::DatabaseAdapter;
use crate::config::AppConfig;
use crate::entitlement::EntitlementEngine;
use crate::error::AppResult;
use crate::gateway::PaymentGateway;
use crate::ledger::SubscriptionLedger;
use crate::token::TokenManager;
use crate::types::{AppRequest, AppResponse, HttpMethod};
use crate::webhook::WebhookVerifier;

/// A group of endpoints mounted on the application.
#[async_trait]
pub trait ApiPlugin<DB: DatabaseAdapter>: Send + Sync {
    /// Plugin name - should be unique
    fn name(&self) -> &'static str;

    /// Routes that this plugin handles
    fn routes(&self) -> Vec<ApiRoute>;

    /// Called once while the application is built.
    async fn on_init(&self, ctx: &mut AppContext<DB>) -> AppResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Return `Some(response)` to handle the request, `None` to pass it on.
    async fn on_request(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<Option<AppResponse>>;
}

/// Route definition for plugins
#[derive(Debug, Clone)]
pub struct ApiRoute {
    /// Path below the base path. `{name}` marks a path parameter.
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: String,
}

impl ApiRoute {
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            operation_id: operation_id.into(),
        }
    }

    pub fn get(path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, operation_id)
    }

    pub fn post(path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path, operation_id)
    }

    pub fn put(path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path, operation_id)
    }

    pub fn delete(path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path, operation_id)
    }
}

/// Shared services handed to every plugin call.
pub struct AppContext<DB: DatabaseAdapter> {
    pub config: Arc<AppConfig>,
    pub database: Arc<DB>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tokens: Arc<TokenManager>,
}

impl<DB: DatabaseAdapter> AppContext<DB> {
    pub fn new(
        config: Arc<AppConfig>,
        database: Arc<DB>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(config.clone()));
        Self {
            config,
            database,
            gateway,
            tokens,
        }
    }

    pub fn entitlement(&self) -> EntitlementEngine<DB> {
        EntitlementEngine::new(self.config.clone(), self.database.clone())
    }

    pub fn ledger(&self) -> SubscriptionLedger<DB> {
        SubscriptionLedger::new(
            self.config.clone(),
            self.database.clone(),
            self.gateway.clone(),
        )
    }

    /// `None` when no webhook secret is configured.
    pub fn webhook_verifier(&self) -> Option<WebhookVerifier> {
        WebhookVerifier::from_config(&self.config.webhook)
    }
}

impl<DB: DatabaseAdapter> Clone for AppContext<DB> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            gateway: self.gateway.clone(),
            tokens: self.tokens.clone(),
        }
    }
}
