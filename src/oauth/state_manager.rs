//! OAuth state management for CSRF protection.
//!
//! Each authorization redirect carries a random single-use `state` that the
//! callback must present back before its code is exchanged.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Pending authorization for one provider
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth state manager with automatic expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes)
    pub fn new(expiry_seconds: i64) -> Self {
        Self::with_expiry(Duration::seconds(expiry_seconds))
    }

    pub fn with_expiry(expiry_duration: Duration) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration,
        }
    }

    /// Generate a new state token for `provider` and remember it
    pub fn create_state(&self, provider: &str) -> String {
        let state = Uuid::new_v4().to_string();
        let entry = StateEntry {
            provider: provider.to_string(),
            created_at: Utc::now(),
        };

        self.states.lock().unwrap().insert(state.clone(), entry);

        state
    }

    /// Validate and consume a state token
    ///
    /// Returns the entry if known and not expired. The state is removed
    /// either way (single-use).
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        let entry = self.states.lock().unwrap().remove(state)?;

        if Utc::now() - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Drops expired states
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.states
            .lock()
            .unwrap()
            .retain(|_, entry| now - entry.created_at <= self.expiry_duration);
    }

    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    let mut interval =
        tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        manager.cleanup_expired();
        tracing::debug!(remaining = manager.count(), "OAuth state cleanup complete");
    }
}
