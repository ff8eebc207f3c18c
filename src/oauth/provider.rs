//! OAuth provider configurations.
//!
//! Built-in definitions for the fitness providers, merged with user settings
//! and client credentials from the environment.

use crate::config::{ProviderSettings, VitalsConfig};
use serde::Serialize;

/// Provider names with built-in endpoint definitions
pub const BUILTIN_PROVIDERS: &[&str] = &["strava", "google_fit"];

/// Static endpoint definition for a built-in provider.
struct ProviderDefaults {
    auth_url: &'static str,
    token_url: &'static str,
    scopes: &'static [&'static str],
    scope_separator: &'static str,
    refresh_token_rotates: bool,
    extra_auth_params: &'static [(&'static str, &'static str)],
}

fn builtin(name: &str) -> Option<ProviderDefaults> {
    match name {
        // Activity data; issues absolute `expires_at` and rotates refresh tokens
        "strava" => Some(ProviderDefaults {
            auth_url: "https://www.strava.com/oauth/authorize",
            token_url: "https://www.strava.com/oauth/token",
            scopes: &["read", "activity:read_all", "profile:read_all"],
            scope_separator: ",",
            refresh_token_rotates: true,
            extra_auth_params: &[("approval_prompt", "force")],
        }),
        // Steps, heart rate, sleep, body metrics; relative `expires_in`
        "google_fit" => Some(ProviderDefaults {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            scopes: &[
                "https://www.googleapis.com/auth/fitness.activity.read",
                "https://www.googleapis.com/auth/fitness.body.read",
                "https://www.googleapis.com/auth/fitness.heart_rate.read",
                "https://www.googleapis.com/auth/fitness.sleep.read",
            ],
            scope_separator: " ",
            refresh_token_rotates: false,
            extra_auth_params: &[
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
            ],
        }),
        _ => None,
    }
}

/// Everything needed to authorize against and refresh tokens with one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderConfig {
    /// Provider name (e.g., "strava")
    pub name: String,

    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token endpoint URL (code exchange and refresh)
    pub token_url: String,

    /// Scopes requested at authorization time
    pub scopes: Vec<String>,

    /// Joins `scopes` in the authorization URL
    pub scope_separator: String,

    pub client_id: String,

    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Whether a refresh response's new refresh token replaces the stored one
    pub refresh_token_rotates: bool,

    /// Additional query parameters for the authorization URL
    pub extra_auth_params: Vec<(String, String)>,

    /// Token slot holding this provider's credentials
    pub slot: String,
}

impl ProviderConfig {
    /// Resolves a provider from settings and the process environment.
    ///
    /// Returns `None` if the client id or secret is missing, or if the
    /// provider is not built in and the settings lack endpoint URLs.
    pub fn resolve(name: &str, settings: &ProviderSettings) -> Option<Self> {
        Self::resolve_with(name, settings, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit environment lookup.
    pub fn resolve_with<F>(name: &str, settings: &ProviderSettings, env: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_prefix = name.to_uppercase();
        let client_id = env(&format!("VITALS_OAUTH_{}_CLIENT_ID", env_prefix))
            .or_else(|| settings.client_id.clone())
            .filter(|v| !v.is_empty())?;
        let client_secret = env(&format!("VITALS_OAUTH_{}_CLIENT_SECRET", env_prefix))
            .or_else(|| settings.client_secret.clone())
            .filter(|v| !v.is_empty())?;

        let defaults = builtin(name);

        let auth_url = settings
            .auth_url
            .clone()
            .or_else(|| defaults.as_ref().map(|d| d.auth_url.to_string()))?;
        let token_url = settings
            .token_url
            .clone()
            .or_else(|| defaults.as_ref().map(|d| d.token_url.to_string()))?;

        let scopes = settings.scopes.clone().unwrap_or_else(|| {
            defaults
                .as_ref()
                .map(|d| d.scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        });

        Some(Self {
            name: name.to_string(),
            auth_url,
            token_url,
            scopes,
            scope_separator: defaults
                .as_ref()
                .map(|d| d.scope_separator)
                .unwrap_or(" ")
                .to_string(),
            client_id,
            client_secret,
            refresh_token_rotates: settings
                .refresh_token_rotates
                .or_else(|| defaults.as_ref().map(|d| d.refresh_token_rotates))
                .unwrap_or(false),
            extra_auth_params: defaults
                .as_ref()
                .map(|d| {
                    d.extra_auth_params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default(),
            slot: settings
                .slot
                .clone()
                .unwrap_or_else(|| format!("{}_tokens", name)),
        })
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(&self.scope_separator);
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        );
        for (key, value) in &self.extra_auth_params {
            url.push('&');
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}

/// All provider names to consider: built-ins plus any configured extras.
pub fn provider_names(config: &VitalsConfig) -> Vec<String> {
    let mut names: Vec<String> = BUILTIN_PROVIDERS.iter().map(|s| s.to_string()).collect();
    for name in config.providers.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Resolves every provider that has usable credentials.
pub fn configured_providers(config: &VitalsConfig) -> Vec<ProviderConfig> {
    provider_names(config)
        .iter()
        .filter_map(|name| {
            let settings = config.providers.get(name).cloned().unwrap_or_default();
            ProviderConfig::resolve(name, &settings)
        })
        .collect()
}
