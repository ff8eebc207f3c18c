//! Refresh-token grant.

use super::RefreshError;
use crate::credentials::CredentialRecord;
use crate::oauth::exchange::request_token;
use crate::oauth::ProviderConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

/// Exchanges refresh tokens for new access tokens.
///
/// Each call is a single POST to the provider's token endpoint. There is no
/// retry or backoff, and nothing is persisted here.
#[derive(Clone)]
pub struct Refresher {
    http_client: reqwest::Client,
}

impl Refresher {
    /// Builds a refresher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Obtains a new access token for `record`.
    ///
    /// The returned record keeps the stored refresh token unless the provider
    /// rotates refresh tokens and issued a new one. `record` itself is never
    /// modified.
    pub async fn refresh(
        &self,
        record: &CredentialRecord,
        provider: &ProviderConfig,
    ) -> Result<CredentialRecord, RefreshError> {
        let form = [
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", record.refresh_token.as_str()),
        ];

        info!(provider = %provider.name, "Refreshing OAuth token");

        let token_response = request_token(&self.http_client, &provider.token_url, &form).await?;
        let expires_at = token_response.expiry(Utc::now());
        let scopes = token_response
            .granted_scopes()
            .unwrap_or_else(|| record.scopes.clone());

        let refresh_token = match token_response.refresh_token.filter(|t| !t.is_empty()) {
            Some(issued) if provider.refresh_token_rotates => issued,
            Some(_) => record.refresh_token.clone(),
            None => {
                if provider.refresh_token_rotates {
                    warn!(
                        provider = %provider.name,
                        "Provider rotates refresh tokens but issued none, keeping the stored one"
                    );
                }
                record.refresh_token.clone()
            }
        };

        if expires_at.is_none() {
            warn!(provider = %provider.name, "Token response carried no expiry");
        }

        Ok(CredentialRecord {
            access_token: token_response.access_token,
            refresh_token,
            expires_at,
            token_type: token_response.token_type.or_else(|| record.token_type.clone()),
            client_id: Some(provider.client_id.clone()),
            token_endpoint: Some(provider.token_url.clone()),
            scopes,
        })
    }
}
