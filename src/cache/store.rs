//! Disk-backed page cache with time-based expiry.
//!
//! One JSON file per entry, named by the MD5 digest of the exact target
//! URL. There is no index and no eviction: stale files are ignored by
//! `lookup` and overwritten by the next `store` for the same URL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;

/// One cached upstream fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fully resolved target URL the entry was fetched from.
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// Decoded response text.
    pub body: String,
}

impl CacheEntry {
    /// True when `now - fetched_at < max_age`.
    pub fn is_fresh_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(self.fetched_at) < max_age,
            // Larger than chrono can represent: never expires.
            Err(_) => true,
        }
    }
}

/// Errors from cache I/O. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Content-addressed cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `dir`. The directory is created on the
    /// first `store`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for a URL: lowercase hex MD5 of the exact URL string.
    pub fn key_for(url: &str) -> String {
        format!("{:x}", md5::compute(url.as_bytes()))
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key_for(url)))
    }

    /// Fresh entry for `url`, or `None` on miss, expiry or any read failure.
    pub async fn lookup(&self, url: &str, max_age: Duration) -> Option<CacheEntry> {
        self.lookup_at(url, max_age, Utc::now()).await
    }

    /// `lookup` against an explicit clock.
    pub async fn lookup_at(
        &self,
        url: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        let entry = match self.try_lookup_at(url, max_age, now).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Cache read failed, treating as miss");
                None
            }
        };
        metrics::record_cache_lookup(entry.is_some());
        entry
    }

    /// Fallible lookup: `Ok(None)` for a missing or stale entry, `Err` for
    /// unreadable or corrupt files.
    pub async fn try_lookup_at(
        &self,
        url: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let raw = match tokio::fs::read(self.path_for(url)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&raw)?;

        // Digest collision: the slot belongs to another URL.
        if entry.url != url {
            return Ok(None);
        }
        if !entry.is_fresh_at(max_age, now) {
            tracing::debug!(url = %url, fetched_at = %entry.fetched_at, "Cache entry expired");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Write an entry, replacing whatever the slot held.
    ///
    /// The file is written under a unique temporary name and renamed into
    /// place, so concurrent readers see either the old or the new entry.
    /// Concurrent writers race; the last rename wins.
    pub async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&entry.url);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", Self::key_for(&entry.url), uuid::Uuid::new_v4()));
        let data = serde_json::to_vec(entry)?;

        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(url = %entry.url, key = %Self::key_for(&entry.url), "Cached entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, fetched_at: DateTime<Utc>) -> CacheEntry {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html; charset=utf-8".to_string());
        CacheEntry {
            url: url.to_string(),
            fetched_at,
            status_code: 200,
            headers,
            body: "<html>通知</html>".to_string(),
        }
    }

    #[test]
    fn test_key_is_stable_md5() {
        assert_eq!(CacheStore::key_for(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            CacheStore::key_for("http://h/app/x.do"),
            CacheStore::key_for("http://h/app/x.do")
        );
        assert_ne!(
            CacheStore::key_for("http://h/app/x.do"),
            CacheStore::key_for("http://h/app/y.do")
        );
    }

    #[tokio::test]
    async fn test_round_trip_then_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("nested"));
        let now = Utc::now();
        let stored = entry("http://h/app/x.do", now);

        store.store(&stored).await.unwrap();

        let max_age = Duration::from_secs(60);
        let hit = store.lookup_at(&stored.url, max_age, now).await;
        assert_eq!(hit, Some(stored.clone()));

        let later = now + chrono::Duration::seconds(59);
        assert!(store.lookup_at(&stored.url, max_age, later).await.is_some());

        let expired = now + chrono::Duration::seconds(60);
        assert!(store.lookup_at(&stored.url, max_age, expired).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        let result = store
            .try_lookup_at("http://h/none", Duration::from_secs(60), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let url = "http://h/app/broken.do";
        std::fs::write(store.path_for(url), b"{not json").unwrap();

        let err = store
            .try_lookup_at(url, Duration::from_secs(60), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Corrupt(_)));

        assert!(store.lookup(url, Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_stale_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let url = "http://h/app/news.do";
        let old = entry(url, Utc::now() - chrono::Duration::hours(2));
        store.store(&old).await.unwrap();
        assert!(store.lookup(url, Duration::from_secs(3600)).await.is_none());

        let mut fresh = entry(url, Utc::now());
        fresh.body = "updated".to_string();
        store.store(&fresh).await.unwrap();

        let hit = store.lookup(url, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(hit.body, "updated");
        // Only the final file remains; temporaries are renamed away.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_slot_owned_by_other_url_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let url = "http://h/app/a.do";
        let foreign = entry("http://h/app/b.do", Utc::now());
        std::fs::write(store.path_for(url), serde_json::to_vec(&foreign).unwrap()).unwrap();

        assert!(store.lookup(url, Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_store_into_unwritable_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = CacheStore::new(blocker.join("cache"));

        let result = store.store(&entry("http://h/", Utc::now())).await;
        assert!(matches!(result, Err(CacheError::Io(_))));
    }
}
