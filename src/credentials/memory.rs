use super::{validate_slot, CredentialRecord, TokenStore};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory token store. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn read(&self, slot: &str) -> Result<Option<CredentialRecord>> {
        validate_slot(slot)?;
        Ok(self.slots.lock().unwrap().get(slot).cloned())
    }

    fn save(&self, slot: &str, record: &CredentialRecord) -> Result<()> {
        validate_slot(slot)?;
        self.slots
            .lock()
            .unwrap()
            .insert(slot.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<bool> {
        validate_slot(slot)?;
        Ok(self.slots.lock().unwrap().remove(slot).is_some())
    }
}
