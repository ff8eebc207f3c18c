//! The persisted credential record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// OAuth credentials for one provider, as held in a token slot.
///
/// Expiry is kept at whole-second precision, matching the
/// seconds-since-epoch representation used on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Short-lived bearer token for API requests
    pub access_token: String,

    /// Long-lived token used only to mint new access tokens
    pub refresh_token: String,

    /// When `access_token` stops being accepted (UTC)
    #[serde(default, with = "epoch_seconds")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Client the tokens were issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Endpoint the tokens were obtained from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Scopes granted at authorization time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl CredentialRecord {
    /// A record is usable only when both tokens are present.
    ///
    /// Partially written slots are reported as absent by `TokenStore::load`.
    pub fn is_complete(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.refresh_token.trim().is_empty()
    }

    /// Value for an `Authorization` header on downstream provider calls.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Converts seconds since the epoch into a whole-second UTC timestamp.
pub(crate) fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// `expires_at` as integer seconds since the epoch.
///
/// Fractional values are accepted on read (older slot files wrote
/// `time() + expires_in`) and truncated.
mod epoch_seconds {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_some(&dt.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        match secs {
            None => Ok(None),
            Some(s) if !s.is_finite() => Err(serde::de::Error::custom("expires_at is not finite")),
            Some(s) => timestamp_from_secs(s.trunc() as i64)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("expires_at out of range")),
        }
    }
}
