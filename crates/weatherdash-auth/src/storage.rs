//! Per-user refresh interval preference.
//!
//! The interval is the only persisted field. A store that cannot answer
//! (missing user, unreadable file, unknown value) yields `Interval::Manual`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use weatherdash_core::{AuthError, Interval};

use crate::session::UserId;

const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("Failed to access preferences file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<PreferenceError> for AuthError {
    fn from(e: PreferenceError) -> Self {
        AuthError::StorageError(e.to_string())
    }
}

/// Key-value store holding one interval per user.
pub trait PreferenceStore: Send + Sync {
    /// Stored interval, `Manual` when absent or unreadable.
    fn get_interval(&self, user: &UserId) -> Interval;

    fn set_interval(&self, user: &UserId, interval: Interval) -> Result<(), PreferenceError>;
}

/// Preferences kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<UserId, Interval>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_interval(&self, user: &UserId) -> Interval {
        self.values.lock().get(user).copied().unwrap_or_default()
    }

    fn set_interval(&self, user: &UserId, interval: Interval) -> Result<(), PreferenceError> {
        self.values.lock().insert(user.clone(), interval);
        Ok(())
    }
}

/// Preferences persisted as a JSON object `{ "<user id>": "<interval>" }`.
///
/// Values are stored as preference strings so a hand-edited or outdated
/// entry degrades to `Manual` instead of failing the whole file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store inside `config_dir` (normally `~/.config/weatherdash`).
    pub fn in_config_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, PreferenceError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get_interval(&self, user: &UserId) -> Interval {
        let _guard = self.lock.lock();
        match self.read_all() {
            Ok(values) => values
                .get(user.as_str())
                .map(|v| Interval::from_preference(v))
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to read preferences from {:?}: {}", self.path, e);
                Interval::Manual
            }
        }
    }

    fn set_interval(&self, user: &UserId, interval: Interval) -> Result<(), PreferenceError> {
        let _guard = self.lock.lock();

        let mut values = self.read_all().unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable preferences file {:?}: {}", self.path, e);
            HashMap::new()
        });
        values.insert(user.as_str().to_string(), interval.to_preference());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;

        tracing::info!("Stored refresh interval {} for user {}", interval, user);
        Ok(())
    }
}
