//! One JSON file per slot.

use super::{validate_slot, CredentialRecord, TokenStore};
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

static TMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Credential slots stored as `<directory>/<slot>.json`.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the slot, so a crash mid-write leaves the previous record intact.
/// Each write gets its own temp name (PID + counter); overlapping writers,
/// in this process or another, never share one.
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    /// Opens a store rooted at `directory`, creating it if needed.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).with_context(|| {
            format!("Failed to create token directory {}", directory.display())
        })?;
        Ok(Self { directory })
    }

    /// Path of the file backing `slot`.
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.directory.join(format!("{}.json", slot))
    }
}

impl TokenStore for JsonFileStore {
    fn read(&self, slot: &str) -> Result<Option<CredentialRecord>> {
        validate_slot(slot)?;
        let path = self.slot_path(slot);

        let contents = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let record = serde_json::from_slice(&contents)
            .with_context(|| format!("Malformed credentials in {}", path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, slot: &str, record: &CredentialRecord) -> Result<()> {
        validate_slot(slot)?;
        let path = self.slot_path(slot);
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .directory
            .join(format!(".{}.json.{}.{}.tmp", slot, std::process::id(), seq));

        let contents =
            serde_json::to_vec_pretty(record).context("Failed to serialize credentials")?;
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }

        debug!(slot = %slot, path = %path.display(), "Credentials saved");
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<bool> {
        validate_slot(slot)?;
        let path = self.slot_path(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}
