//! Single-record file store with atomic replacement.
//!
//! Writes go to a temporary file in the destination directory, are flushed
//! and synced, then renamed over the destination. A reader sees either the
//! previous record or the new one, never a torn file.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Records that carry a schema version the reader must recognise.
pub trait Versioned {
    /// Version written by, and the only version accepted by, this build.
    const SCHEMA_VERSION: u32;

    fn schema_version(&self) -> u32;
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cache record at {0}")]
    NotFound(PathBuf),
    #[error("cache record is corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported cache schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize cache record: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CacheStore<R> {
    path: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R> CacheStore<R>
where
    R: Serialize + DeserializeOwned + Versioned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<R, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        let record: R = serde_json::from_str(&content).map_err(|e| {
            // A record from another layout usually fails to decode; report
            // its version rather than calling it corrupt.
            match version_tag(&content) {
                Some(found) if found != R::SCHEMA_VERSION => CacheError::UnsupportedSchema {
                    found,
                    expected: R::SCHEMA_VERSION,
                },
                _ => CacheError::Corrupt(e.to_string()),
            }
        })?;

        let found = record.schema_version();
        if found != R::SCHEMA_VERSION {
            return Err(CacheError::UnsupportedSchema {
                found,
                expected: R::SCHEMA_VERSION,
            });
        }
        debug!(path = %self.path.display(), "Loaded cache record");
        Ok(record)
    }

    pub fn write(&self, record: &R) -> Result<(), CacheError> {
        self.stage(record)?.commit()
    }

    /// First half of [`write`](Self::write): the record is fully on disk in a
    /// temporary sibling file, the destination is untouched. Dropping the
    /// returned value removes the temporary file.
    pub fn stage(&self, record: &R) -> Result<StagedWrite, CacheError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let json = serde_json::to_vec_pretty(record).map_err(CacheError::Serialize)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".cache-")
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        temp.write_all(&json)?;
        temp.flush()?;
        temp.as_file().sync_all()?;

        Ok(StagedWrite {
            temp,
            destination: self.path.clone(),
        })
    }

    /// Remove the record. Missing files are not an error.
    pub fn purge(&self) -> Result<bool, CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Purged cache record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}

#[derive(Deserialize)]
struct VersionTag {
    schema_version: u64,
}

fn version_tag(content: &str) -> Option<u32> {
    let tag: VersionTag = serde_json::from_str(content).ok()?;
    Some(u32::try_from(tag.schema_version).unwrap_or(u32::MAX))
}

/// A serialized record waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedWrite {
    temp: tempfile::NamedTempFile,
    destination: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically rename over the destination. On failure the temporary
    /// file is deleted and the previous record is left as it was.
    pub fn commit(self) -> Result<(), CacheError> {
        let destination = self.destination;
        self.temp.persist(&destination).map_err(|e| {
            // `e.file` is dropped here, which unlinks the temporary file.
            CacheError::Io(e.error)
        })?;

        if let Some(parent) = destination.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        debug!(path = %destination.display(), "Cache record written");
        Ok(())
    }
}
