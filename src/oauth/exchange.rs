//! OAuth token endpoint client.
//!
//! Both grants (authorization code and refresh token) are a form-encoded POST
//! answered by the same JSON shape, so they share one request path here.

use crate::credentials::{timestamp_from_secs, CredentialRecord};
use crate::oauth::ProviderConfig;
use crate::token::RefreshError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// OAuth token response (standard OAuth 2.0, plus Strava's `expires_at`)
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry, seconds since the epoch
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Relative expiry, seconds from now
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Granted scopes, comma or space separated
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry: the provider's `expires_at` when sent, else
    /// `now + expires_in`.
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(timestamp_from_secs)
            .or_else(|| {
                self.expires_in
                    .and_then(|secs| timestamp_from_secs(now.timestamp().saturating_add(secs)))
            })
    }

    pub fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope.as_ref().map(|s| {
            s.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(|part| part.to_string())
                .collect()
        })
    }
}

/// POSTs `form` to `token_url` and parses the token response.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, RefreshError> {
    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(RefreshError::ProviderRejection { status, body });
    }

    let token_response: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

    if token_response.access_token.is_empty() {
        return Err(RefreshError::InvalidResponse(
            "empty access_token".to_string(),
        ));
    }

    Ok(token_response)
}

/// Exchange authorization code for a new credential record
///
/// # Arguments
/// * `client` - HTTP client (carries the configured timeout)
/// * `provider` - Provider whose token endpoint and client credentials to use
/// * `code` - Authorization code from callback
/// * `redirect_uri` - Redirect URI used in authorization request
///
/// # Returns
/// * `Ok(CredentialRecord)` - Fully populated record ready to save
/// * `Err` - Endpoint failure, or a response without a refresh token
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<CredentialRecord, RefreshError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
    ];

    tracing::debug!(
        provider = %provider.name,
        token_url = %provider.token_url,
        "Exchanging authorization code for token"
    );

    let token_response = request_token(client, &provider.token_url, &form).await?;
    let now = Utc::now();

    tracing::debug!(
        provider = %provider.name,
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token exchange successful"
    );

    let expires_at = token_response.expiry(now);
    let scopes = token_response
        .granted_scopes()
        .unwrap_or_else(|| provider.scopes.clone());

    let refresh_token = token_response
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            RefreshError::InvalidResponse(
                "no refresh_token issued (offline access not granted?)".to_string(),
            )
        })?;

    Ok(CredentialRecord {
        access_token: token_response.access_token,
        refresh_token,
        expires_at,
        token_type: token_response.token_type,
        client_id: Some(provider.client_id.clone()),
        token_endpoint: Some(provider.token_url.clone()),
        scopes,
    })
}
