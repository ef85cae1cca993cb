use async_trait::async_trait;

use ui_analyzer_core::adapters::DatabaseAdapter;
use ui_analyzer_core::{ApiPlugin, ApiRoute, AppContext};
use ui_analyzer_core::{AppRequest, AppResponse, AppResult, HttpMethod, validate_request_body};

pub(super) mod handlers;
pub(super) mod types;

#[cfg(test)]
mod tests;

use handlers::*;
use types::*;

use super::helpers::get_authenticated_user;

/// Registration, login and account self-service under `/auth`.
pub struct AuthPlugin;

impl AuthPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AuthPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthPlugin {
    /// `POST /auth/register`
    async fn handle_register<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let body: RegisterRequest = validate_request_body(req)?;
        let response = register_core(&body, ctx).await?;
        Ok(AppResponse::json(201, &response)?)
    }

    /// `POST /auth/login`
    async fn handle_login<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let body: LoginRequest = validate_request_body(req)?;
        let response = login_core(&body, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `GET /auth/me`
    async fn handle_me<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let response = me_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `PUT /auth/profile`
    async fn handle_update_profile<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let body: UpdateProfileRequest = validate_request_body(req)?;
        let response = update_profile_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `PUT /auth/settings`
    async fn handle_update_settings<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let body: UpdateSettingsRequest = validate_request_body(req)?;
        let response = update_settings_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `PUT /auth/password`
    async fn handle_change_password<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let body: ChangePasswordRequest = validate_request_body(req)?;
        let response = change_password_core(&body, &user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `DELETE /auth/account`
    async fn handle_delete_account<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (user, _claims) = get_authenticated_user(req, ctx).await?;
        let response = delete_account_core(&user, ctx).await?;
        Ok(AppResponse::json(200, &response)?)
    }

    /// `POST /auth/refresh`
    async fn handle_refresh<DB: DatabaseAdapter>(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<AppResponse> {
        let (_user, claims) = get_authenticated_user(req, ctx).await?;
        let response = refresh_core(&claims, ctx)?;
        Ok(AppResponse::json(200, &response)?)
    }
}

#[async_trait]
impl<DB: DatabaseAdapter> ApiPlugin<DB> for AuthPlugin {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn routes(&self) -> Vec<ApiRoute> {
        vec![
            ApiRoute::post("/auth/register", "register"),
            ApiRoute::post("/auth/login", "login"),
            ApiRoute::get("/auth/me", "getCurrentUser"),
            ApiRoute::put("/auth/profile", "updateProfile"),
            ApiRoute::put("/auth/settings", "updateSettings"),
            ApiRoute::put("/auth/password", "changePassword"),
            ApiRoute::delete("/auth/account", "deleteAccount"),
            ApiRoute::post("/auth/refresh", "refreshToken"),
        ]
    }

    async fn on_request(
        &self,
        req: &AppRequest,
        ctx: &AppContext<DB>,
    ) -> AppResult<Option<AppResponse>> {
        match (req.method(), req.path()) {
            (HttpMethod::Post, "/auth/register") => Ok(Some(self.handle_register(req, ctx).await?)),
            (HttpMethod::Post, "/auth/login") => Ok(Some(self.handle_login(req, ctx).await?)),
            (HttpMethod::Get, "/auth/me") => Ok(Some(self.handle_me(req, ctx).await?)),
            (HttpMethod::Put, "/auth/profile") => {
                Ok(Some(self.handle_update_profile(req, ctx).await?))
            }
            (HttpMethod::Put, "/auth/settings") => {
                Ok(Some(self.handle_update_settings(req, ctx).await?))
            }
            (HttpMethod::Put, "/auth/password") => {
                Ok(Some(self.handle_change_password(req, ctx).await?))
            }
            (HttpMethod::Delete, "/auth/account") => {
                Ok(Some(self.handle_delete_account(req, ctx).await?))
            }
            (HttpMethod::Post, "/auth/refresh") => Ok(Some(self.handle_refresh(req, ctx).await?)),
            _ => Ok(None),
        }
    }
}
