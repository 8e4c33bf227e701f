use crate::error::Result;
use crate::meeting::SessionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which storage path family an intent key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntentScope {
    /// `meeting/<code>/started`
    Meeting,
    /// `class/<class_id>/session/<code>/started`
    ClassSession { class_id: String },
}

impl IntentScope {
    fn path(&self) -> String {
        match self {
            IntentScope::Meeting => "meeting".to_string(),
            IntentScope::ClassSession { class_id } => format!("class/{}/session", class_id),
        }
    }
}

impl Default for IntentScope {
    fn default() -> Self {
        IntentScope::Meeting
    }
}

/// Durable key for the "recognition requested" flag of one session.
///
/// This is the only place storage keys are built, so both scope families
/// share one layout: `<scope>/<sessionCode>/started`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentKey(String);

impl IntentKey {
    pub fn new(scope: &IntentScope, key: &SessionKey) -> Self {
        IntentKey(format!("{}/{}/started", scope.path(), key.compound()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key/value persistence that survives process restarts.
pub trait IntentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store, for tests and for views that must not persist.
#[derive(Default)]
pub struct MemoryIntentStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntentStore for MemoryIntentStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Entries are cached in memory and the whole file is rewritten on every
/// change (write to a sibling temp file, then rename).
pub struct JsonFileIntentStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileIntentStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A corrupt file is logged and treated as empty; it is overwritten on
    /// the next write.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_private_dir(parent)?;
            }
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "Intent store {} is unreadable, starting empty: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        log::debug!(
            "Opened intent store {} ({} entries)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// `<data_dir>/ferdash/intents.json`
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            crate::error::SessionError::Storage("Could not determine data directory".to_string())
        })?;
        Ok(data_dir.join("ferdash").join("intents.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl IntentStore for JsonFileIntentStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .mode(0o700) // User-only access
            .recursive(true)
            .create(path)?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> crate::error::SessionError {
    crate::error::SessionError::Storage("intent store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_layout_per_scope() {
        let key = SessionKey::meeting("M1");
        assert_eq!(
            IntentKey::new(&IntentScope::Meeting, &key).as_str(),
            "meeting/M1/started"
        );

        let scope = IntentScope::ClassSession {
            class_id: "C9".to_string(),
        };
        assert_eq!(
            IntentKey::new(&scope, &key).as_str(),
            "class/C9/session/M1/started"
        );

        let drill = SessionKey::participant("M1", "u2");
        assert_eq!(
            IntentKey::new(&IntentScope::Meeting, &drill).as_str(),
            "meeting/M1-u2/started"
        );
    }

    #[test]
    fn test_scopes_never_collide() {
        let key = SessionKey::meeting("M1");
        let a = IntentKey::new(&IntentScope::Meeting, &key);
        let b = IntentKey::new(
            &IntentScope::ClassSession {
                class_id: "meeting".to_string(),
            },
            &key,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_memory_store_remove_missing_is_ok() {
        let store = MemoryIntentStore::new();
        store.remove("meeting/x/started").unwrap();
        assert_eq!(store.get("meeting/x/started").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("intents.json");

        {
            let store = JsonFileIntentStore::open(path.clone()).unwrap();
            store.set("meeting/M1/started", "true").unwrap();
            store.set("meeting/M2/started", "true").unwrap();
            store.remove("meeting/M2/started").unwrap();
        }

        let reopened = JsonFileIntentStore::open(path).unwrap();
        assert_eq!(
            reopened.get("meeting/M1/started").unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(reopened.get("meeting/M2/started").unwrap(), None);
    }

    #[test]
    fn test_file_store_recovers_from_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("intents.json");
        fs::write(&path, "{not json").unwrap();

        let store = JsonFileIntentStore::open(path.clone()).unwrap();
        assert_eq!(store.get("meeting/M1/started").unwrap(), None);

        store.set("meeting/M1/started", "true").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("meeting/M1/started"));
    }
}
