//! Durable, time-limited cache of the last-known identity snapshot.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::snapshot::IdentitySnapshot;

const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "identity-cache.v1.json";

/// How long a cached snapshot stays trustworthy.
pub const SESSION_CACHE_TTL_MS: i64 = 15 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SessionCacheDocument {
    version: u32,
    user: IdentitySnapshot,
    /// Write time, unix epoch milliseconds.
    timestamp: i64,
}

/// Best-effort persistence of the snapshot the identity context last
/// resolved.
///
/// The cache never invents data, and readers treat it as advisory: other
/// processes may read the same file, and a provider-driven resolution
/// always supersedes it.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Cache at the platform-default location.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(default_cache_path())
    }

    /// Reads the persisted snapshot.
    ///
    /// Absent, unparseable, wrong-version, and expired entries all read as
    /// `None`; anything untrustworthy is deleted on the way out.
    #[must_use]
    pub fn load(&self) -> Option<IdentitySnapshot> {
        self.load_at(Utc::now().timestamp_millis())
    }

    fn load_at(&self, now_ms: i64) -> Option<IdentitySnapshot> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let Ok(document) = serde_json::from_str::<SessionCacheDocument>(raw.as_str()) else {
            tracing::debug!(path = %self.path.display(), "identity cache unparseable, purging");
            self.clear();
            return None;
        };
        if document.version != CACHE_SCHEMA_VERSION {
            tracing::debug!(
                version = document.version,
                "identity cache version mismatch, purging"
            );
            self.clear();
            return None;
        }
        if now_ms.saturating_sub(document.timestamp) >= SESSION_CACHE_TTL_MS {
            tracing::debug!(user = %document.user.id, "identity cache expired, purging");
            self.clear();
            return None;
        }
        Some(document.user)
    }

    /// Writes `snapshot`, or deletes the entry when `snapshot` is `None`.
    ///
    /// Storage failures are swallowed: a cache write is never worth
    /// failing the reconciliation that produced it.
    pub fn save(&self, snapshot: Option<&IdentitySnapshot>) {
        match snapshot {
            Some(user) => {
                let document = SessionCacheDocument {
                    version: CACHE_SCHEMA_VERSION,
                    user: user.clone(),
                    timestamp: Utc::now().timestamp_millis(),
                };
                if let Err(error) = self.write_document(&document) {
                    tracing::warn!(error = %error, path = %self.path.display(), "identity cache write failed");
                }
            }
            None => self.clear(),
        }
    }

    /// Unconditionally deletes the persisted entry.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(error = %error, path = %self.path.display(), "identity cache delete failed");
            }
        }
    }

    fn write_document(&self, document: &SessionCacheDocument) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| format!("cache mkdir failed: {error}"))?;
        }
        let encoded = serde_json::to_string_pretty(document)
            .map_err(|error| format!("cache encode failed: {error}"))?;
        fs::write(&self.path, encoded).map_err(|error| format!("cache write failed: {error}"))
    }
}

fn default_cache_path() -> PathBuf {
    if let Some(mut data_dir) = dirs::data_local_dir() {
        data_dir.push("sitedesk");
        data_dir.push(CACHE_FILE_NAME);
        return data_dir;
    }

    if let Some(mut home_dir) = dirs::home_dir() {
        home_dir.push(".sitedesk");
        home_dir.push(CACHE_FILE_NAME);
        return home_dir;
    }

    PathBuf::from(CACHE_FILE_NAME)
}
