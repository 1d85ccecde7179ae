//! Persisted API key management.
//!
//! The credential file (default `~/.usgs`) holds a single JSON object:
//!
//! ```json
//! { "apiKey": "eyJjaWQiOjEyMzQ1Njc4...", "created": "2024-03-01T13:00:00Z" }
//! ```
//!
//! Its presence means a login succeeded and has not been logged out yet.
//! Separate processes writing the same file race with last-write-wins
//! semantics; there is no cross-process locking.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, UsgsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(with = "iso_timestamp")]
    pub created: DateTime<Utc>,
}

impl CredentialRecord {
    /// A record for `api_key` issued now.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            created: Utc::now(),
        }
    }
}

/// Storage for the single persisted credential record.
///
/// [`resolve`](CredentialStore::resolve) is what operations call; the other
/// methods are the login/logout lifecycle.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored record, `None` when nothing is stored.
    fn load(&self) -> Result<Option<CredentialRecord>>;

    /// Stores `record`, replacing any previous one.
    fn persist(&self, record: &CredentialRecord) -> Result<()>;

    /// Removes the stored record. Absent records are not an error.
    fn clear(&self) -> Result<()>;

    /// The effective API key for a call: a non-empty `explicit` key wins,
    /// then the stored key, else `None`.
    fn resolve(&self, explicit: Option<&str>) -> Result<Option<String>> {
        if let Some(key) = explicit.filter(|k| !k.is_empty()) {
            return Ok(Some(key.to_string()));
        }
        Ok(self.load()?.map(|r| r.api_key))
    }
}

/// File-backed store, the default for [`Client`](crate::Client).
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        let _guard = self.guard();
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_str(&text).map_err(|source| UsgsError::CredentialStore {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(record))
    }

    fn persist(&self, record: &CredentialRecord) -> Result<()> {
        let _guard = self.guard();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_string(record)?;
        write_private(&self.path, data.as_bytes())?;
        debug!(path = %self.path.display(), "stored API key");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.guard();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed stored API key");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Store that never touches the filesystem.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `api_key`.
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(CredentialRecord::new(api_key))),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<CredentialRecord>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        Ok(self.guard().clone())
    }

    fn persist(&self, record: &CredentialRecord) -> Result<()> {
        *self.guard() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.guard() = None;
        Ok(())
    }
}

/// RFC 3339 on write. Older clients wrote naive local timestamps
/// (`2024-03-01T13:00:00.123456`), which are accepted on read.
mod iso_timestamp {
    use super::*;
    use serde::{Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {s}")))
    }

    pub(super) fn parse(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Some(
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc()),
        )
    }
}
