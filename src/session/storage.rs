//! Durable storage backends for the persisted session record.
//!
//! Provides the [`SessionStorage`] trait and several implementations:
//! - [`FileSessionStorage`] - One file per key in a configurable directory
//! - [`MemorySessionStorage`] - In-memory storage for testing
//! - [`KeyringSessionStorage`] - System keyring storage (requires `system-keyring` feature)
//!
//! The store writes exactly two keys: the serialized identity record and the
//! raw token string. All operations are synchronous relative to the caller so
//! a crash immediately after a write leaves storage consistent with memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// Storage key holding the serialized [`crate::session::identity::Identity`].
pub const SESSION_KEY: &str = "session";
/// Storage key holding the raw access token string.
pub const TOKEN_KEY: &str = "token";

/// Errors from a storage backend. These never cross the session API: the
/// store logs them and degrades to "no session" on read, so corruption is
/// indistinguishable from absence for callers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Trait for session persistence backends.
///
/// All implementations must be thread-safe (`Send + Sync`). Values are
/// opaque strings; serialization happens in the session store.
pub trait SessionStorage: Send + Sync {
    /// Load the stored value for a key, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Save a value for a key.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the stored value for a key. Removing an absent key is not an
    /// error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Check whether a value exists for a key.
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.load(key)?.is_some())
    }

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).load(key)
    }
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).save(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: SessionStorage + ?Sized> SessionStorage for Box<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).load(key)
    }
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).save(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// =============================================================================
// FileSessionStorage
// =============================================================================

/// File permissions for session files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based session storage.
///
/// Stores each key as an individual file in a configurable directory. File
/// path: `{dir}/{key}.json`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                StorageError::Io(format!(
                    "Failed to create session directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                std::fs::set_permissions(&self.dir, perms).map_err(|e| {
                    StorageError::Io(format!(
                        "Failed to set directory permissions on '{}': {}",
                        self.dir.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key);
        match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read session file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let path = self.key_path(key);
        // Write to temp file first, then rename for atomicity. On Unix, set
        // 0600 permissions at creation time to avoid a window where the
        // session record is readable by other users.
        let temp_path = path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .map_err(|e| {
                    StorageError::Io(format!(
                        "Failed to create temp file '{}': {}",
                        temp_path.display(),
                        e
                    ))
                })?;
            file.write_all(value.as_bytes()).map_err(|e| {
                StorageError::Io(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().map_err(|e| {
                StorageError::Io(format!(
                    "Failed to sync temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, value).map_err(|e| {
                StorageError::Io(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StorageError::Io(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to remove session file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.key_path(key).exists())
    }

    fn name(&self) -> &str {
        "file"
    }
}

// =============================================================================
// KeyringSessionStorage
// =============================================================================

/// Keyring-based session storage.
///
/// Uses the system's native credential store. Feature-gated behind
/// `system-keyring`.
#[cfg(feature = "system-keyring")]
#[derive(Debug, Clone)]
pub struct KeyringSessionStorage {
    service: String,
}

#[cfg(feature = "system-keyring")]
impl Default for KeyringSessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-keyring")]
impl KeyringSessionStorage {
    const SERVICE_NAME: &str = "portico-session";

    pub fn new() -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
        }
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| StorageError::Backend(format!("Failed to create keyring entry: {}", e)))
    }
}

#[cfg(feature = "system-keyring")]
impl SessionStorage for KeyringSessionStorage {
    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Backend(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| StorageError::Backend(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Backend(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

// =============================================================================
// MemorySessionStorage
// =============================================================================

/// In-memory session storage.
///
/// Uses `Arc<RwLock<HashMap>>` for thread-safe access. Useful for testing and
/// ephemeral runs. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-populated with a single key.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let storage = Self::new();
        storage
            .inner
            .write()
            .expect("lock poisoned")
            .insert(key.into(), value.into());
        storage
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read().expect("lock poisoned").get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.inner.read().expect("lock poisoned").contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
