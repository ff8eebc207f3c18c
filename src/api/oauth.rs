//! OAuth 2.0 authorization code flow for connecting a provider.
//!
//! 1. Dashboard links to GET /api/providers/:name/oauth/start
//! 2. Redirect to the provider's consent page
//! 3. Provider redirects to /api/providers/:name/oauth/callback
//! 4. Exchange code for tokens and store them in the provider's slot

use super::{AppError, AppState};
use crate::oauth::exchange_code_for_token;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// OAuth callback query parameters
#[derive(Deserialize)]
pub(super) struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth success response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthSuccessResponse {
    pub success: bool,
    pub message: String,
    pub provider: String,
}

/// GET /api/providers/:name/oauth/start
///
/// Redirects the browser to the provider's authorization page with a fresh
/// single-use CSRF state.
pub(super) async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
) -> Result<Redirect, AppError> {
    debug!(provider = %provider_name, "OAuth start requested");

    let provider = state.provider(&provider_name)?;

    let csrf_state = state.state_manager.create_state(&provider.name);
    let redirect_uri = state.redirect_uri(&provider.name);
    let auth_url = provider.build_auth_url(&csrf_state, &redirect_uri);

    info!(provider = %provider.name, "Redirecting to OAuth provider");

    Ok(Redirect::temporary(&auth_url))
}

/// GET /api/providers/:name/oauth/callback
///
/// Validates the CSRF state, exchanges the authorization code and stores
/// the resulting credentials, replacing whatever the slot held.
pub(super) async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    debug!(provider = %provider_name, "OAuth callback received");

    let provider = state.provider(&provider_name)?;

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            provider = %provider_name,
            error = %error,
            description = %description,
            "OAuth authorization failed"
        );
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let state_entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!(provider = %provider_name, "Invalid or expired OAuth state");
            AppError::Unauthorized("Invalid or expired OAuth state".to_string())
        })?;

    if state_entry.provider != provider_name {
        error!(
            expected = %state_entry.provider,
            actual = %provider_name,
            "Provider name mismatch"
        );
        return Err(AppError::BadRequest("Provider name mismatch".to_string()));
    }

    let redirect_uri = state.redirect_uri(&provider.name);

    let record = exchange_code_for_token(state.accessor.http_client(), provider, &code, &redirect_uri)
        .await
        .map_err(|e| {
            error!(provider = %provider.name, error = %e, "Token exchange failed");
            AppError::BadGateway(format!("Failed to exchange authorization code: {}", e))
        })?;

    state
        .accessor
        .connect(&provider.slot, &record)
        .await
        .map_err(|e| {
            error!(
                provider = %provider.name,
                slot = %provider.slot,
                error = %e,
                "Failed to store credentials"
            );
            AppError::ServerError(format!("Failed to store credentials: {}", e))
        })?;

    info!(
        provider = %provider.name,
        slot = %provider.slot,
        expires_at = ?record.expires_at,
        "OAuth flow completed successfully"
    );

    Ok(Json(OAuthSuccessResponse {
        success: true,
        message: format!("Successfully connected {}", provider.name),
        provider: provider.name.clone(),
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_callback_deserialization() {
        let query = "code=auth_code_123&state=csrf_state_456&scope=read,activity:read_all";
        let callback: OAuthCallback = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.code, Some("auth_code_123".to_string()));
        assert_eq!(callback.state, Some("csrf_state_456".to_string()));
        assert_eq!(callback.error, None);

        let query = "error=access_denied&error_description=User+cancelled";
        let callback: OAuthCallback = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(callback.error, Some("access_denied".to_string()));
        assert_eq!(callback.error_description, Some("User cancelled".to_string()));
        assert_eq!(callback.code, None);
    }

    #[test]
    fn test_oauth_success_response_serialization() {
        let response = OAuthSuccessResponse {
            success: true,
            message: "Successfully connected strava".to_string(),
            provider: "strava".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"provider\":\"strava\""));
    }
}
