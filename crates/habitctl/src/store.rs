//! Per-user memory persistence.
//!
//! `JsonFileStore` keeps one pretty-printed JSON file per user and replaces
//! it atomically (write temp, then rename). `InMemoryStore` backs tests and
//! one-off sessions.

use habit_shared::memory::UserMemory;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest accepted user id
pub const MAX_USER_ID_LEN: usize = 128;

/// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt memory file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reject ids that are empty, too long or unsafe as a file name.
///
/// Allowed: ASCII letters, digits, `_`, `-` and `.`, but not `.` or `..`
/// on their own and no leading dot.
pub fn validate_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.is_empty() {
        return Err(StoreError::InvalidUserId("user id is empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(StoreError::InvalidUserId(format!(
            "user id longer than {} characters",
            MAX_USER_ID_LEN
        )));
    }
    if user_id.starts_with('.') || user_id.contains("..") {
        return Err(StoreError::InvalidUserId(format!("'{}' is not a safe name", user_id)));
    }
    if let Some(bad) = user_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(StoreError::InvalidUserId(format!(
            "'{}' contains unsupported character {:?}",
            user_id, bad
        )));
    }
    Ok(())
}

/// Load/save boundary for user memory
pub trait MemoryStore: Send + Sync {
    /// Memory for `user_id`, fresh if none is stored yet
    fn load(&self, user_id: &str) -> Result<UserMemory, StoreError>;

    fn save(&self, user_id: &str, memory: &UserMemory) -> Result<(), StoreError>;
}

/// One JSON file per user under a data directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `user_id`'s memory (id must already be validated)
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", user_id))
    }
}

impl MemoryStore for JsonFileStore {
    fn load(&self, user_id: &str) -> Result<UserMemory, StoreError> {
        validate_user_id(user_id)?;
        let path = self.path_for(user_id);

        if !path.exists() {
            info!("No memory for {} yet, starting fresh", user_id);
            return Ok(UserMemory::new(user_id));
        }

        let content = fs::read_to_string(&path)?;
        let mut memory: UserMemory =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;

        if memory.user_id != user_id {
            warn!(
                "Memory file {} names user '{}', using '{}'",
                path.display(),
                memory.user_id,
                user_id
            );
            memory.user_id = user_id.to_string();
        }
        debug!("Loaded memory for {} ({} turns)", user_id, memory.conversation_history.len());
        Ok(memory)
    }

    fn save(&self, user_id: &str, memory: &UserMemory) -> Result<(), StoreError> {
        validate_user_id(user_id)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(user_id);
        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)?;
            let json = serde_json::to_string_pretty(memory)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        debug!("Saved memory for {} to {}", user_id, path.display());
        Ok(())
    }
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<HashMap<String, UserMemory>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStore for InMemoryStore {
    fn load(&self, user_id: &str) -> Result<UserMemory, StoreError> {
        validate_user_id(user_id)?;
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserMemory::new(user_id)))
    }

    fn save(&self, user_id: &str, memory: &UserMemory) -> Result<(), StoreError> {
        validate_user_id(user_id)?;
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), memory.clone());
        Ok(())
    }
}
