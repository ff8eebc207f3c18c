//! Provider status, token hand-out and disconnect endpoints.

use super::{AppError, AppState};
use crate::oauth::ProviderConfig;
use crate::token::{AccessError, TokenAccessor, TokenState};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Connection status of one provider
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub slot: String,
    pub state: TokenState,
    /// Credentials are stored (even if expired)
    pub connected: bool,
    /// The user has to go through the OAuth flow to use this provider
    pub needs_authorization: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Last refresh failure, until the next successful refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ProviderStatus {
    fn for_provider(accessor: &TokenAccessor, provider: &ProviderConfig) -> Self {
        let (state, record) = accessor.inspect(&provider.slot);

        Self {
            name: provider.name.clone(),
            slot: provider.slot.clone(),
            state,
            connected: state != TokenState::NoCredential,
            needs_authorization: state.needs_authorization(),
            expires_at: record.as_ref().and_then(|r| r.expires_at),
            scopes: record.map(|r| r.scopes).unwrap_or_default(),
            last_error: accessor.last_refresh_error(&provider.slot),
        }
    }
}

/// Response for GET /api/providers
#[derive(Debug, Serialize, Deserialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderStatus>,
}

/// Response for GET /api/providers/:name/token
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// GET /api/providers
pub(super) async fn list_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProvidersResponse>, AppError> {
    state.authorize(&headers)?;

    let providers = state
        .providers
        .values()
        .map(|p| ProviderStatus::for_provider(&state.accessor, p))
        .collect();

    Ok(Json(ProvidersResponse { providers }))
}

/// GET /api/providers/:name
pub(super) async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProviderStatus>, AppError> {
    state.authorize(&headers)?;
    let provider = state.provider(&name)?;

    Ok(Json(ProviderStatus::for_provider(&state.accessor, provider)))
}

/// GET /api/providers/:name/token
///
/// Returns a usable access token, refreshing the stored one first if it
/// is expired or about to expire.
pub(super) async fn get_token(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    state.authorize(&headers)?;
    let provider = state.provider(&name)?;

    match state.accessor.resolve(provider, &provider.slot).await {
        Ok(record) => Ok(Json(TokenResponse {
            access_token: record.access_token,
            token_type: record.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: record.expires_at,
        })),
        Err(AccessError::NoCredential) => Err(AppError::NotFound(format!(
            "Provider '{}' is not connected",
            provider.name
        ))),
        Err(AccessError::RefreshFailed(e)) => {
            warn!(provider = %provider.name, error = %e, "Token unavailable, refresh failed");
            Err(AppError::BadGateway(format!("Token refresh failed: {}", e)))
        }
    }
}

/// DELETE /api/providers/:name
///
/// Deletes stored credentials. Returns 204 even if nothing was stored.
pub(super) async fn disconnect_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    state.authorize(&headers)?;
    let provider = state.provider(&name)?;

    let removed = state
        .accessor
        .disconnect(&provider.slot)
        .await
        .map_err(|e| {
            error!(provider = %provider.name, error = %e, "Failed to delete credentials");
            AppError::ServerError(format!("Failed to delete credentials: {}", e))
        })?;

    info!(provider = %provider.name, slot = %provider.slot, removed, "Provider disconnected");

    Ok(StatusCode::NO_CONTENT)
}
