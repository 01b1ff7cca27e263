//! Single-file JSON document with atomic replace.
//!
//! Writes go to a sibling `*.tmp` file which is synced and then renamed
//! over the target, so a crash mid-write leaves either the previous or
//! the new document on disk, never a truncated one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PersistenceError, PersistenceResult};

/// Durable JSON document holding a value of type `T`.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a handle for the document at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. Returns `Ok(None)` if the file does not exist.
    pub fn load(&self) -> PersistenceResult<Option<T>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value = serde_json::from_str(&content).map_err(|source| PersistenceError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Read the document, falling back to `T::default()` when it is
    /// absent or unreadable. Never fails.
    pub fn load_or_default(&self) -> T
    where
        T: Default,
    {
        match self.load() {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(path = %self.path.display(), "Document not found, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(error = %e, "Document unreadable, starting empty");
                T::default()
            }
        }
    }

    /// Replace the document with `value`.
    pub fn save(&self, value: &T) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
        }

        let json = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp).map_err(|source| self.io_err(source))?;
            file.write_all(&json).map_err(|source| self.io_err(source))?;
            file.sync_all().map_err(|source| self.io_err(source))?;
        }
        fs::rename(&tmp, &self.path).map_err(|source| self.io_err(source))?;

        debug!(path = %self.path.display(), bytes = json.len(), "Document saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
