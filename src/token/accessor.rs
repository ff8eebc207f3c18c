//! The single entry point for obtaining a usable access token.

use super::{is_expired_within, AccessError, Refresher, TokenState};
use crate::credentials::{CredentialRecord, TokenStore};
use crate::oauth::ProviderConfig;
use anyhow::Result;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Loads, validates and (when needed) refreshes credentials for a slot.
///
/// Refreshes are serialized per slot: a caller that finds an expired token
/// takes the slot's lock, re-reads the slot and only refreshes if it is still
/// expired. Concurrent callers in one process therefore share a single
/// refresh. Separate processes sharing a store are not coordinated.
pub struct TokenAccessor {
    store: Arc<dyn TokenStore>,
    refresher: Refresher,
    expiry_margin: Duration,
    slot_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Last refresh failure per slot, cleared on success
    refresh_failures: DashMap<String, String>,
}

impl TokenAccessor {
    pub fn new(store: Arc<dyn TokenStore>, refresher: Refresher, expiry_margin: Duration) -> Self {
        Self {
            store,
            refresher,
            expiry_margin,
            slot_locks: DashMap::new(),
            refresh_failures: DashMap::new(),
        }
    }

    /// HTTP client used for token endpoint calls.
    pub fn http_client(&self) -> &reqwest::Client {
        self.refresher.http_client()
    }

    fn slot_lock(&self, slot: &str) -> Arc<Mutex<()>> {
        self.slot_locks
            .entry(slot.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn is_expired(&self, record: &CredentialRecord) -> bool {
        is_expired_within(Some(record), Utc::now(), self.expiry_margin)
    }

    /// Current lifecycle state of `slot`, without any network call.
    pub fn state(&self, slot: &str) -> TokenState {
        self.inspect(slot).0
    }

    /// State of `slot` together with the record it was derived from, read
    /// from the store once.
    pub fn inspect(&self, slot: &str) -> (TokenState, Option<CredentialRecord>) {
        let record = self.store.load(slot);
        let state = match &record {
            None => TokenState::NoCredential,
            Some(record) if !self.is_expired(record) => TokenState::Valid,
            Some(_) if self.refresh_failures.contains_key(slot) => TokenState::RefreshFailed,
            Some(_) => TokenState::Expired,
        };
        (state, record)
    }

    /// Message of the last failed refresh for `slot`, if the slot has not
    /// been refreshed successfully since.
    pub fn last_refresh_error(&self, slot: &str) -> Option<String> {
        self.refresh_failures.get(slot).map(|e| e.value().clone())
    }

    /// Returns a usable credential for `provider`, refreshing it if needed.
    ///
    /// # Returns
    /// * `Ok(record)` - Unexpired credentials (possibly just refreshed and saved)
    /// * `Err(AccessError::NoCredential)` - Nothing usable stored; authorize first
    /// * `Err(AccessError::RefreshFailed)` - Refresh failed; stored record untouched
    pub async fn resolve(
        &self,
        provider: &ProviderConfig,
        slot: &str,
    ) -> Result<CredentialRecord, AccessError> {
        let record = self.store.load(slot).ok_or(AccessError::NoCredential)?;
        if !self.is_expired(&record) {
            return Ok(record);
        }

        let lock = self.slot_lock(slot);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        let record = self.store.load(slot).ok_or(AccessError::NoCredential)?;
        if !self.is_expired(&record) {
            debug!(provider = %provider.name, slot = %slot, "Token refreshed by concurrent caller");
            return Ok(record);
        }

        match self.refresher.refresh(&record, provider).await {
            Ok(fresh) => {
                if let Err(e) = self.store.save(slot, &fresh) {
                    // A rotating provider has already invalidated the stored
                    // refresh token, so the fresh record is still returned.
                    error!(
                        provider = %provider.name,
                        slot = %slot,
                        error = %e,
                        "Failed to persist refreshed credentials"
                    );
                }
                self.refresh_failures.remove(slot);
                info!(
                    provider = %provider.name,
                    slot = %slot,
                    expires_at = ?fresh.expires_at,
                    "OAuth token refreshed successfully"
                );
                Ok(fresh)
            }
            Err(e) => {
                warn!(
                    provider = %provider.name,
                    slot = %slot,
                    error = %e,
                    "Token refresh failed, stored credentials left unchanged"
                );
                self.refresh_failures.insert(slot.to_string(), e.to_string());
                Err(AccessError::RefreshFailed(e))
            }
        }
    }

    /// Returns a usable credential, or `None` if the user must re-authorize.
    pub async fn get_valid_token(
        &self,
        provider: &ProviderConfig,
        slot: &str,
    ) -> Option<CredentialRecord> {
        match self.resolve(provider, slot).await {
            Ok(record) => Some(record),
            Err(AccessError::NoCredential) => {
                debug!(provider = %provider.name, slot = %slot, "No stored credentials");
                None
            }
            Err(AccessError::RefreshFailed(_)) => None,
        }
    }

    /// Stores credentials from a completed authorization.
    pub async fn connect(&self, slot: &str, record: &CredentialRecord) -> Result<()> {
        let lock = self.slot_lock(slot);
        let _guard = lock.lock().await;

        self.store.save(slot, record)?;
        self.refresh_failures.remove(slot);
        Ok(())
    }

    /// Deletes the credentials in `slot`. Returns `false` if none were stored.
    pub async fn disconnect(&self, slot: &str) -> Result<bool> {
        let lock = self.slot_lock(slot);
        let _guard = lock.lock().await;

        let removed = self.store.remove(slot)?;
        self.refresh_failures.remove(slot);
        Ok(removed)
    }
}
