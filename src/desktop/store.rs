use crate::error::{Result, SessionError};
use crate::storage::IntentStore;
use std::sync::Arc;
use tauri::{AppHandle, Wry};
use tauri_plugin_store::{Store, StoreExt};

const INTENT_STORE_PATH: &str = "intents.json";

/// Intent store backed by the Tauri store plugin, so intents live next to
/// the rest of the app data and survive restarts.
pub struct TauriIntentStore {
    store: Arc<Store<Wry>>,
}

impl TauriIntentStore {
    pub fn open(app: &AppHandle) -> Result<Self> {
        let store = app
            .store(INTENT_STORE_PATH)
            .map_err(|e| SessionError::Storage(format!("Failed to open intent store: {}", e)))?;
        Ok(Self { store })
    }

    fn save(&self) -> Result<()> {
        self.store
            .save()
            .map_err(|e| SessionError::Storage(format!("Failed to save intent store: {}", e)))
    }
}

impl IntentStore for TauriIntentStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get(key)
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value);
        self.save()
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.store.delete(key) {
            self.save()?;
        }
        Ok(())
    }
}
