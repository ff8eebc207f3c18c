//! HTTP API for connecting, inspecting and disconnecting providers.
//!
//! ```text
//! GET    /api/providers                      status of every configured provider
//! GET    /api/providers/:name                status of one provider
//! DELETE /api/providers/:name                disconnect (delete stored credentials)
//! GET    /api/providers/:name/token          usable access token (refreshes if needed)
//! GET    /api/providers/:name/oauth/start    redirect to the provider's consent page
//! GET    /api/providers/:name/oauth/callback code exchange, stores credentials
//! ```

mod oauth;
mod providers;

use crate::auth::authorize_request;
use crate::oauth::{ProviderConfig, StateManager};
use crate::token::TokenAccessor;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use oauth::OAuthSuccessResponse;
pub use providers::{ProviderStatus, ProvidersResponse, TokenResponse};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub accessor: Arc<TokenAccessor>,
    /// Configured providers keyed by name
    pub providers: Arc<BTreeMap<String, ProviderConfig>>,
    pub state_manager: StateManager,
    /// Base URL the provider redirects back to
    pub callback_base_url: String,
    /// Required bearer token for non-OAuth routes, if any
    pub api_token: Option<String>,
}

impl AppState {
    pub fn new(
        accessor: Arc<TokenAccessor>,
        providers: Vec<ProviderConfig>,
        state_manager: StateManager,
        callback_base_url: String,
        api_token: Option<String>,
    ) -> Self {
        Self {
            accessor,
            providers: Arc::new(providers.into_iter().map(|p| (p.name.clone(), p)).collect()),
            state_manager,
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn provider(&self, name: &str) -> Result<&ProviderConfig, AppError> {
        self.providers
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Provider '{}' not configured", name)))
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), AppError> {
        authorize_request(headers, self.api_token.as_deref())
            .map_err(|e| AppError::Unauthorized(e.to_string()))
    }

    /// Redirect URI registered with the provider (must match in start and callback)
    fn redirect_uri(&self, provider: &str) -> String {
        format!(
            "{}/api/providers/{}/oauth/callback",
            self.callback_base_url, provider
        )
    }
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/providers", get(providers::list_providers))
        .route(
            "/api/providers/:name",
            get(providers::get_provider).delete(providers::disconnect_provider),
        )
        .route("/api/providers/:name/token", get(providers::get_token))
        .route("/api/providers/:name/oauth/start", get(oauth::oauth_start))
        .route("/api/providers/:name/oauth/callback", get(oauth::oauth_callback))
        .with_state(Arc::new(state))
}
