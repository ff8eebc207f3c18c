//! Durable storage for OAuth credential records.
//!
//! Every provider keeps exactly one [`CredentialRecord`] in a named slot.
//! Slots live behind the [`TokenStore`] trait so the token accessor does not
//! care whether they are JSON files, encrypted SQLite rows, or a map in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenAccessor                      │
//! │  - load / save / remove by slot          │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌──────────────┬──────────────┬──────────────┐
//! │ JsonFileStore│EncryptedStore│ MemoryStore  │
//! │ <slot>.json  │ AES-256-GCM  │ tests        │
//! │              │ + SQLite     │              │
//! └──────────────┴──────────────┴──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use vitals::credentials::{CredentialRecord, JsonFileStore, TokenStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = JsonFileStore::new("tokens")?;
//!
//! if let Some(record) = store.load("strava_tokens") {
//!     println!("Authorization: {}", record.bearer_header());
//! }
//!
//! // Disconnect
//! store.remove("strava_tokens")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};
use tracing::warn;

mod encryption;
mod file;
mod memory;
mod record;
mod storage;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use record::CredentialRecord;
pub use storage::EncryptedStore;

pub(crate) use record::timestamp_from_secs;

// Re-export encryption helpers for key generation/validation utilities
pub use encryption::{generate_key, validate_key};

/// A durable key-value store holding one credential record per slot.
pub trait TokenStore: Send + Sync {
    /// Reads the record in `slot`.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - Slot holds a parseable record
    /// * `Ok(None)` - Slot is empty
    /// * `Err` - I/O, decryption or parse failure
    fn read(&self, slot: &str) -> Result<Option<CredentialRecord>>;

    /// Replaces the contents of `slot` with `record`.
    fn save(&self, slot: &str, record: &CredentialRecord) -> Result<()>;

    /// Deletes `slot`. Returns `false` if it was already empty.
    fn remove(&self, slot: &str) -> Result<bool>;

    /// Reads `slot`, treating anything unusable as absent.
    ///
    /// Missing, malformed, undecryptable and partially populated records all
    /// yield `None`; the cause is logged, never returned.
    fn load(&self, slot: &str) -> Option<CredentialRecord> {
        match self.read(slot) {
            Ok(Some(record)) if record.is_complete() => Some(record),
            Ok(Some(_)) => {
                warn!(slot = %slot, "Stored credentials are incomplete, treating as absent");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(slot = %slot, error = %e, "Failed to read stored credentials, treating as absent");
                None
            }
        }
    }
}

/// Slot names become file names and primary keys.
pub fn validate_slot(slot: &str) -> Result<()> {
    if slot.is_empty() {
        bail!("Slot name must not be empty");
    }
    if !slot
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!(
            "Invalid slot name '{}': only ASCII letters, digits, '-' and '_' are allowed",
            slot
        );
    }
    Ok(())
}
