//! Session key to last context, persisted as JSON next to the config.
//!
//! Every read-modify-write holds an exclusive lock on `<store>.lock`, so two
//! `chatctx` processes never interleave writes to the same file. Expired
//! entries are invisible to readers and dropped on the next write.

use crate::chatctx::util::content_hash;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub context: String,
    pub source: String,
    pub message_count: usize,
    pub created_at_epoch_secs: u64,
    pub expires_at_epoch_secs: u64,
    pub content_hash: String,
}

impl SessionEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at_epoch_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SessionFile {
    schema_version: u32,
    entries: BTreeMap<String, SessionEntry>,
}

impl Default for SessionFile {
    fn default() -> Self {
        Self {
            schema_version: 1,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    file: PathBuf,
    ttl_secs: u64,
}

impl SessionStore {
    pub fn new(file: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            file: file.into(),
            ttl_secs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.file.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.file.with_file_name(name)
    }

    fn with_lock<T>(&self, f: impl FnOnce(&mut SessionFile) -> Result<(T, bool)>) -> Result<T> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let lock_path = self.lock_path();
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("failed to lock {}", lock_path.display()))?;

        let outcome = self.load().and_then(|mut data| {
            let (value, dirty) = f(&mut data)?;
            if dirty {
                self.save(&data)?;
            }
            Ok(value)
        });
        let _ = FileExt::unlock(&lock);
        outcome
    }

    fn load(&self) -> Result<SessionFile> {
        if !self.file.exists() {
            return Ok(SessionFile::default());
        }
        let raw = fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.file.display()))
    }

    fn save(&self, data: &SessionFile) -> Result<()> {
        let tmp = self.file.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(data)?;
        fs::write(&tmp, format!("{body}\n"))
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.file)
            .with_context(|| format!("failed to replace {}", self.file.display()))?;
        Ok(())
    }

    pub fn put(
        &self,
        key: &str,
        context: &str,
        source: &str,
        message_count: usize,
        now: u64,
    ) -> Result<SessionEntry> {
        let entry = SessionEntry {
            context: context.to_string(),
            source: source.to_string(),
            message_count,
            created_at_epoch_secs: now,
            expires_at_epoch_secs: now.saturating_add(self.ttl_secs),
            content_hash: content_hash(context),
        };
        let stored = entry.clone();
        self.with_lock(|data| {
            data.entries.retain(|_, e| !e.is_expired(now));
            data.entries.insert(key.to_string(), stored);
            Ok(((), true))
        })?;
        tracing::debug!(key, message_count, "stored session context");
        Ok(entry)
    }

    pub fn get(&self, key: &str, now: u64) -> Result<Option<SessionEntry>> {
        self.with_lock(|data| {
            let found = data
                .entries
                .get(key)
                .filter(|e| !e.is_expired(now))
                .cloned();
            Ok((found, false))
        })
    }

    /// Live entries, ordered by key.
    pub fn list(&self, now: u64) -> Result<Vec<(String, SessionEntry)>> {
        self.with_lock(|data| {
            let live = data
                .entries
                .iter()
                .filter(|(_, e)| !e.is_expired(now))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect();
            Ok((live, false))
        })
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_lock(|data| {
            let removed = data.entries.remove(key).is_some();
            Ok((removed, removed))
        })
    }

    pub fn clear(&self) -> Result<usize> {
        self.with_lock(|data| {
            let n = data.entries.len();
            data.entries.clear();
            Ok((n, n > 0))
        })
    }

    pub fn purge_expired(&self, now: u64) -> Result<usize> {
        self.with_lock(|data| {
            let before = data.entries.len();
            data.entries.retain(|_, e| !e.is_expired(now));
            let purged = before - data.entries.len();
            Ok((purged, purged > 0))
        })
    }
}
