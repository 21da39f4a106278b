//! Raw string key-value storage used underneath the typed cache store

use directories::ProjectDirs;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Durable string storage keyed by name
///
/// Implementations must treat removing an absent key as success.
pub trait StorageBackend: Send + Sync {
    /// Returns the stored string, or `None` if the key is absent
    fn get_item(&self, key: &str) -> io::Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> io::Result<()>;

    /// Removes `key`
    fn remove_item(&self, key: &str) -> io::Result<()>;

    /// Removes every key
    fn clear(&self) -> io::Result<()>;
}

/// Stores each key as a JSON file in one directory
///
/// The directory is created lazily on first write, so a missing directory
/// simply reads as an empty store.
#[derive(Debug, Clone)]
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    /// Creates a backend in the XDG cache directory (`~/.cache/bookings/` on Linux)
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "bookings")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a backend rooted at `cache_dir`
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::write(self.path_for(key), value)
    }

    fn remove_item(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let path = entry?.path();
            // Only our own entries; the log file and anything else stay
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Process-local storage that forgets everything on exit
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> io::Result<()> {
        self.items().remove(key);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.items().clear();
        Ok(())
    }
}
