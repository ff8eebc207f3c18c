//! Encrypted credential slots in SQLite.
//!
//! Each slot is one row holding the whole record as sealed JSON.

use super::encryption::{self, Sealed};
use super::{validate_slot, CredentialRecord, TokenStore};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted token store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE token_slots (
///     slot TEXT PRIMARY KEY,
///     record TEXT NOT NULL,       -- AES-256-GCM sealed JSON, base64
///     nonce TEXT NOT NULL,        -- base64
///     updated_at TEXT NOT NULL    -- RFC 3339
/// );
/// ```
///
/// A row that fails to decrypt (wrong master key, tampering) surfaces as an
/// error from `read` and as an absent record from `load`.
pub struct EncryptedStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl EncryptedStore {
    /// Creates or opens an encrypted store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS token_slots (
                slot TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                nonce TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create token_slots table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Lists all occupied slots.
    pub fn list_slots(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT slot FROM token_slots ORDER BY slot")
            .context("Failed to prepare query")?;

        let slots = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(slots)
    }
}

impl TokenStore for EncryptedStore {
    fn read(&self, slot: &str) -> Result<Option<CredentialRecord>> {
        validate_slot(slot)?;

        let sealed = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT record, nonce FROM token_slots WHERE slot = ?1",
                params![slot],
                |row| {
                    Ok(Sealed {
                        ciphertext: row.get(0)?,
                        nonce: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to query token slot")?;

        let Some(sealed) = sealed else {
            return Ok(None);
        };

        let plaintext = encryption::open(&sealed, &self.encryption_key)
            .context("Failed to decrypt stored credentials")?;
        let record =
            serde_json::from_slice(&plaintext).context("Malformed stored credentials")?;
        Ok(Some(record))
    }

    fn save(&self, slot: &str, record: &CredentialRecord) -> Result<()> {
        validate_slot(slot)?;

        let plaintext = serde_json::to_vec(record).context("Failed to serialize credentials")?;
        let sealed = encryption::seal(&plaintext, &self.encryption_key)
            .context("Failed to encrypt credentials")?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO token_slots (slot, record, nonce, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(slot) DO UPDATE SET
                    record = excluded.record,
                    nonce = excluded.nonce,
                    updated_at = excluded.updated_at
                "#,
                params![slot, sealed.ciphertext, sealed.nonce, now],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<bool> {
        validate_slot(slot)?;

        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM token_slots WHERE slot = ?1", params![slot])
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }
}
