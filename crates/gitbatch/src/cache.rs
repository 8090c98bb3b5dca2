//! Optional on-disk inventory cache.
//!
//! The cache sits outside the core: [`CachedInventoryClient`] consults it
//! before delegating to the real client and stores the result afterwards.
//! Any cache problem (missing file, corrupt JSON, stale entry) is a miss.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::{
    Clock, EntityType, InventoryBatch, InventoryClient, InventoryRequest, RemoteError,
    SystemClock, Visibility,
};
use crate::sync::{ProgressCallback, SyncProgress, emit};

/// Default time-to-live for cached inventories.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key/value store for inventories, keyed by entity type, name and visibility.
///
/// Names match exactly: descriptors carry local paths built from the name
/// as it was requested, so `Octo` and `octo` never share an entry.
#[async_trait]
pub trait InventoryCache: Send + Sync {
    /// A fresh entry, `Ok(None)` when absent or expired.
    async fn get(&self, key: &InventoryRequest) -> Result<Option<InventoryBatch>, CacheError>;
    async fn put(&self, key: &InventoryRequest, batch: &InventoryBatch) -> Result<(), CacheError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    entity_type: EntityType,
    entity_name: String,
    visibility: Visibility,
    batch: InventoryBatch,
}

/// One JSON file per key under a cache directory.
pub struct FileInventoryCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FileInventoryCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_clock(dir, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for a key. The entity name is reduced to a lowercase file-name
    /// alphabet, so differently cased names share a file.
    #[must_use]
    pub fn entry_path(&self, key: &InventoryRequest) -> PathBuf {
        let name: String = key
            .entity_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        self.dir
            .join(format!("{}-{}-{}.json", key.entity_type, name, key.visibility))
    }
}

#[async_trait]
impl InventoryCache for FileInventoryCache {
    async fn get(&self, key: &InventoryRequest) -> Result<Option<InventoryBatch>, CacheError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let entry: CacheEntry = serde_json::from_slice(&raw).map_err(|e| CacheError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Two names can share a file after sanitizing.
        if entry.entity_type != key.entity_type
            || entry.entity_name != key.entity_name
            || entry.visibility != key.visibility
        {
            return Ok(None);
        }

        let age = (self.clock.now() - entry.stored_at).to_std().unwrap_or_default();
        if age > self.ttl {
            tracing::debug!(
                path = %path.display(),
                age_secs = age.as_secs(),
                "Cache entry expired"
            );
            return Ok(None);
        }
        Ok(Some(entry.batch))
    }

    async fn put(&self, key: &InventoryRequest, batch: &InventoryBatch) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let entry = CacheEntry {
            stored_at: self.clock.now(),
            entity_type: key.entity_type,
            entity_name: key.entity_name.clone(),
            visibility: key.visibility,
            batch: batch.clone(),
        };
        let json = serde_json::to_vec_pretty(&entry)?;

        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CacheError::Io { path, source })
    }
}

/// Inventory client decorator that reads through an [`InventoryCache`].
///
/// # Example
///
/// ```ignore
/// let cache = Arc::new(FileInventoryCache::new(cache_dir, DEFAULT_CACHE_TTL));
/// let client = CachedInventoryClient::new(github, cache, "/home/me/src");
/// ```
pub struct CachedInventoryClient<C> {
    inner: C,
    cache: Arc<dyn InventoryCache>,
    workspace_root: PathBuf,
    refresh: bool,
}

impl<C> CachedInventoryClient<C> {
    pub fn new(
        inner: C,
        cache: Arc<dyn InventoryCache>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            cache,
            workspace_root: workspace_root.into(),
            refresh: false,
        }
    }

    /// Skip the read and always fetch (the result is still stored).
    #[must_use]
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn cached(&self, request: &InventoryRequest) -> Option<InventoryBatch> {
        match self.cache.get(request).await {
            Ok(Some(batch)) => {
                let rooted = batch
                    .repositories
                    .iter()
                    .all(|r| r.local_path.starts_with(&self.workspace_root));
                if rooted {
                    Some(batch)
                } else {
                    tracing::debug!(
                        entity = %request.entity_name,
                        "Cached inventory belongs to another workspace, ignoring"
                    );
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable inventory cache: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl<C: InventoryClient> InventoryClient for CachedInventoryClient<C> {
    async fn fetch_inventory(
        &self,
        request: &InventoryRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<InventoryBatch, RemoteError> {
        if !self.refresh
            && let Some(batch) = self.cached(request).await
        {
            tracing::info!(
                entity = %request.entity_name,
                cached_count = batch.total_count(),
                "Using cached inventory"
            );
            emit(
                on_progress,
                SyncProgress::CacheHit {
                    entity: request.entity_name.clone(),
                    cached_count: batch.total_count(),
                },
            );
            return Ok(batch);
        }

        let batch = self.inner.fetch_inventory(request, on_progress).await?;
        if let Err(e) = self.cache.put(request, &batch).await {
            tracing::warn!("Failed to store inventory cache: {}", e);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use tempfile::TempDir;

    use crate::remote::{AnchoredClock, descriptor};

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn key() -> InventoryRequest {
        InventoryRequest::new(EntityType::Org, "Acme", Visibility::Public)
    }

    fn batch(root: &Path, names: &[&str]) -> InventoryBatch {
        InventoryBatch::new(
            EntityType::Org,
            "Acme",
            anchor(),
            names.iter().map(|n| descriptor(n, root)).collect(),
        )
    }

    struct CountingClient {
        calls: AtomicUsize,
        batch: InventoryBatch,
    }

    #[async_trait]
    impl InventoryClient for CountingClient {
        async fn fetch_inventory(
            &self,
            _request: &InventoryRequest,
            _on_progress: Option<&ProgressCallback>,
        ) -> Result<InventoryBatch, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.batch.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn put_then_get_within_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = FileInventoryCache::with_clock(
            dir.path(),
            Duration::from_secs(60),
            Arc::new(AnchoredClock::new(anchor())),
        );
        let stored = batch(Path::new("/work"), &["api", "web"]);
        cache.put(&key(), &stored).await.unwrap();

        assert_eq!(cache.get(&key()).await.unwrap(), Some(stored));
        assert!(cache.entry_path(&key()).ends_with("org-acme-public.json"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = FileInventoryCache::with_clock(
            dir.path(),
            Duration::from_secs(60),
            Arc::new(AnchoredClock::new(anchor())),
        );
        cache.put(&key(), &batch(Path::new("/work"), &["api"])).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(&key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_entry_is_a_miss_and_corrupt_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL);
        assert_eq!(cache.get(&key()).await.unwrap(), None);

        std::fs::write(cache.entry_path(&key()), b"{ not json").unwrap();
        assert!(matches!(cache.get(&key()).await, Err(CacheError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn different_visibility_uses_a_different_entry() {
        let dir = TempDir::new().unwrap();
        let cache = FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL);
        cache.put(&key(), &batch(Path::new("/work"), &["api"])).await.unwrap();

        let all = InventoryRequest::new(EntityType::Org, "Acme", Visibility::All);
        assert_eq!(cache.get(&all).await.unwrap(), None);
    }

    #[tokio::test]
    async fn differently_cased_name_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL);
        let octo = InventoryRequest::new(EntityType::User, "Octo", Visibility::All);
        let lower = InventoryRequest::new(EntityType::User, "octo", Visibility::All);
        let stored = InventoryBatch::new(
            EntityType::User,
            "Octo",
            anchor(),
            vec![descriptor("api", Path::new("/work/Octo"))],
        );
        cache.put(&octo, &stored).await.unwrap();

        assert_eq!(cache.entry_path(&octo), cache.entry_path(&lower));
        assert_eq!(cache.get(&lower).await.unwrap(), None);
        assert_eq!(cache.get(&octo).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn decorator_serves_from_cache_after_first_fetch() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL));
        let client = CachedInventoryClient::new(
            CountingClient {
                calls: AtomicUsize::new(0),
                batch: batch(Path::new("/work"), &["api"]),
            },
            cache,
            "/work",
        );

        let first = client.fetch_inventory(&key(), None).await.unwrap();
        let second = client.fetch_inventory(&key(), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decorator_treats_corruption_as_miss() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL));
        std::fs::write(cache.entry_path(&key()), b"garbage").unwrap();

        let client = CachedInventoryClient::new(
            CountingClient {
                calls: AtomicUsize::new(0),
                batch: batch(Path::new("/work"), &["api"]),
            },
            cache.clone(),
            "/work",
        );
        let fetched = client.fetch_inventory(&key(), None).await.unwrap();
        assert_eq!(fetched.total_count(), 1);
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
        // The corrupt file was replaced by a good entry.
        assert!(cache.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn decorator_ignores_entries_from_another_workspace_and_refresh() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(FileInventoryCache::new(dir.path(), DEFAULT_CACHE_TTL));
        cache
            .put(&key(), &batch(Path::new("/elsewhere"), &["api"]))
            .await
            .unwrap();

        let client = CachedInventoryClient::new(
            CountingClient {
                calls: AtomicUsize::new(0),
                batch: batch(Path::new("/work"), &["api"]),
            },
            cache,
            "/work",
        );
        client.fetch_inventory(&key(), None).await.unwrap();
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);

        let client = client.refresh(true);
        client.fetch_inventory(&key(), None).await.unwrap();
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 2);
    }
}
