//! Durable per-slug publish state
//!
//! Each slug has one `publish-log.json` under the log root, mapping platform
//! name to its last known state. It is the only state that survives a run and
//! is what idempotent re-runs consult.
//!
//! Writers for the same slug are serialized through a per-slug async mutex,
//! and each write goes to a temporary file that is renamed over the log, so a
//! crash never leaves a half-written file and concurrent platforms never drop
//! each other's entries.
//!
//! A log that no longer parses is renamed to `publish-log.json.corrupt-<uuid>`
//! by the next write rather than overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::LogError;
use crate::types::{Platform, PublishResult};

pub const LOG_FILE_NAME: &str = "publish-log.json";

/// State of one platform for one slug
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishLogEntry {
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Last error; cleared by the next success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Platform name to entry, as stored on disk
pub type PublishLog = BTreeMap<String, PublishLogEntry>;

pub struct PublishLogStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PublishLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<slug>/publish-log.json`
    pub fn log_path(&self, slug: &str) -> Result<PathBuf, LogError> {
        validate_slug(slug)?;
        Ok(self.root.join(slug).join(LOG_FILE_NAME))
    }

    /// Read a slug's log; a missing file is an empty log
    pub async fn read(&self, slug: &str) -> Result<PublishLog, LogError> {
        let path = self.log_path(slug)?;
        read_log(&path).await
    }

    pub async fn entry(
        &self,
        slug: &str,
        platform: Platform,
    ) -> Result<Option<PublishLogEntry>, LogError> {
        Ok(self.read(slug).await?.remove(platform.as_str()))
    }

    /// Whether the platform has a successful publish on record
    ///
    /// Missing, unreadable or malformed logs count as "not published".
    pub async fn is_published(&self, slug: &str, platform: Platform) -> bool {
        match self.entry(slug, platform).await {
            Ok(entry) => entry.is_some_and(|e| e.published),
            Err(e) => {
                warn!(slug, platform = %platform, "Treating unreadable publish log as unpublished: {}", e);
                false
            }
        }
    }

    /// URL of the recorded publish, if any; same fail-open reading as `is_published`
    pub async fn published_url(&self, slug: &str, platform: Platform) -> Option<String> {
        match self.entry(slug, platform).await {
            Ok(entry) => entry.filter(|e| e.published).and_then(|e| e.url),
            Err(e) => {
                warn!(slug, platform = %platform, "Treating unreadable publish log as unpublished: {}", e);
                None
            }
        }
    }

    /// Merge one result into the slug's log
    ///
    /// Success replaces the platform's entry. Failure only sets `error`, so an
    /// earlier successful publish stays on record. Other platforms' entries
    /// are never touched.
    pub async fn record(&self, slug: &str, result: &PublishResult) -> Result<(), LogError> {
        let path = self.log_path(slug)?;
        let lock = self.slug_lock(slug);
        let outcome = {
            let _guard = lock.lock().await;
            merge_into_log(&path, slug, result).await
        };
        self.release_slug_lock(slug, lock);
        outcome
    }

    fn slug_lock(&self, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(slug.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the slug's lock from the map once no writer holds or waits on it
    fn release_slug_lock(&self, slug: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        // Handles are only cloned under the map lock, so a count of one is stable here
        if locks.get(slug).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(slug);
        }
    }
}

async fn merge_into_log(path: &Path, slug: &str, result: &PublishResult) -> Result<(), LogError> {
    // A corrupt log would otherwise block every future write for the slug
    let mut log = match read_log(path).await {
        Ok(log) => log,
        Err(LogError::Malformed { source, .. }) => {
            let aside = move_aside(path).await?;
            warn!(
                slug,
                "Moved malformed publish log {} to {}: {}",
                path.display(),
                aside.display(),
                source
            );
            PublishLog::new()
        }
        Err(e) => return Err(e),
    };

    let key = result.platform.as_str().to_string();
    let now = Utc::now();
    if result.success {
        log.insert(
            key,
            PublishLogEntry {
                published: true,
                url: result.url.clone(),
                published_at: result.published_at.or(Some(now)),
                error: None,
                metadata: result.metadata.clone(),
                updated_at: Some(now),
            },
        );
    } else {
        let entry = log.entry(key).or_default();
        entry.error = result.error.clone();
        entry.updated_at = Some(now);
    }

    write_log(path, &log).await?;
    debug!(slug, platform = %result.platform, path = %path.display(), "Publish log updated");
    Ok(())
}

/// Rename an unreadable log to `publish-log.json.corrupt-<uuid>` next to it
async fn move_aside(path: &Path) -> Result<PathBuf, LogError> {
    let aside = path.with_file_name(format!("{}.corrupt-{}", LOG_FILE_NAME, uuid::Uuid::new_v4()));
    tokio::fs::rename(path, &aside)
        .await
        .map_err(|source| LogError::Io {
            path: path.display().to_string(),
            source,
        })?;
    Ok(aside)
}

/// Slugs become directory names, so anything that could escape the root is refused
fn validate_slug(slug: &str) -> Result<(), LogError> {
    let bad = slug.trim().is_empty()
        || slug == "."
        || slug == ".."
        || slug.contains(['/', '\\', '\0']);
    if bad {
        return Err(LogError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

async fn read_log(path: &Path) -> Result<PublishLog, LogError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PublishLog::new()),
        Err(source) => {
            return Err(LogError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|source| LogError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

async fn write_log(path: &Path, log: &PublishLog) -> Result<(), LogError> {
    let io_err = |source: std::io::Error| LogError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let json = serde_json::to_vec_pretty(log).map_err(|source| LogError::Malformed {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}
