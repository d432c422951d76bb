//! User preference persistence.
//!
//! Preferences live as one JSON document under [`PREFERENCES_STORAGE_KEY`]
//! in a flat key → string store, the same shape a browser's local storage
//! has. Loading never fails: missing or corrupt data yields defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use shared_types::{Preferences, PREFERENCES_STORAGE_KEY};

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("preference store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("preference store lock poisoned")]
    Poisoned,
}

/// Flat key → string storage.
pub trait PreferenceStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let items = self.items.lock().map_err(|_| PreferenceError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut items = self.items.lock().map_err(|_| PreferenceError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object file. A missing file is an empty store.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, PreferenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut items = self.read_all().unwrap_or_else(|err| {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Preference file unreadable; rewriting"
            );
            HashMap::new()
        });
        items.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&items)?)?;
        Ok(())
    }
}

/// Load preferences, falling back to defaults on any problem.
pub fn load_preferences(store: &dyn PreferenceStore) -> Preferences {
    let raw = match store.get_item(PREFERENCES_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Preferences::default(),
        Err(err) => {
            tracing::warn!(error = %err, "Could not read preferences; using defaults");
            return Preferences::default();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Stored preferences are corrupt; using defaults");
        Preferences::default()
    })
}

pub fn save_preferences(
    store: &dyn PreferenceStore,
    preferences: &Preferences,
) -> Result<(), PreferenceError> {
    let raw = serde_json::to_string(preferences)?;
    store.set_item(PREFERENCES_STORAGE_KEY, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ViewTab;

    #[test]
    fn test_missing_preferences_are_defaults() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(load_preferences(&store), Preferences::default());
    }

    #[test]
    fn test_corrupt_preferences_are_defaults() {
        let store = MemoryPreferenceStore::new();
        store
            .set_item(PREFERENCES_STORAGE_KEY, "{not json")
            .unwrap();
        assert_eq!(load_preferences(&store), Preferences::default());
    }

    #[test]
    fn test_file_store_round_trip_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");
        let store = FilePreferenceStore::new(&path);
        store.set_item("theme", "dark").unwrap();

        let prefs = Preferences {
            default_tab: ViewTab::Console,
            show_debug_info: true,
            max_console_lines: 50,
            ..Preferences::default()
        };
        save_preferences(&store, &prefs).unwrap();

        let reopened = FilePreferenceStore::new(&path);
        assert_eq!(load_preferences(&reopened), prefs);
        assert_eq!(reopened.get_item("theme").unwrap().as_deref(), Some("dark"));

        let raw = reopened.get_item(PREFERENCES_STORAGE_KEY).unwrap().unwrap();
        assert!(raw.contains("\"maxConsoleLines\":50"));
    }

    #[test]
    fn test_corrupt_file_is_defaults_and_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = FilePreferenceStore::new(&path);
        assert!(store.get_item(PREFERENCES_STORAGE_KEY).is_err());
        assert_eq!(load_preferences(&store), Preferences::default());

        save_preferences(&store, &Preferences::default()).unwrap();
        assert_eq!(load_preferences(&store), Preferences::default());
    }
}
