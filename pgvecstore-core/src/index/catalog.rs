//! In-memory index catalog: descriptor cache, create keys and per-name locks.
//!
//! `create_index` and `build_index` serialize per index name on two separate
//! locks, so a long build never blocks a cheap create no-op and different
//! names never contend. The lock maps grow with the number of distinct names
//! seen; [`IndexCatalog::prune_locks`] drops entries for deleted indexes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::{IndexDescriptor, IndexKey};
use crate::error::Result;

type NamedLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Catalog state owned by one store.
#[derive(Debug, Default)]
pub struct IndexCatalog {
    descriptors: RwLock<HashMap<String, IndexDescriptor>>,
    created: RwLock<HashMap<String, IndexKey>>,
    create_locks: NamedLocks,
    build_locks: NamedLocks,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor for `name`.
    pub fn descriptor(&self, name: &str) -> Option<IndexDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    /// Stores a descriptor.
    pub fn cache_descriptor(&self, descriptor: IndexDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.name.clone(), descriptor);
    }

    /// Drops the cached descriptor for `name`.
    pub fn invalidate(&self, name: &str) {
        self.descriptors.write().remove(name);
    }

    /// Returns true if `name` was last created with exactly `key`.
    pub fn is_created(&self, name: &str, key: &IndexKey) -> bool {
        self.created.read().get(name) == Some(key)
    }

    /// Records that `name` exists with `key`.
    pub fn mark_created(&self, name: &str, key: IndexKey) {
        self.created.write().insert(name.to_string(), key);
    }

    /// Records a descriptor read from the database, unless a create key or
    /// descriptor for that name is already known. Returns true if recorded.
    ///
    /// Callers hold the create lock for the name.
    pub fn adopt(&self, descriptor: IndexDescriptor) -> bool {
        let mut created = self.created.write();
        let mut descriptors = self.descriptors.write();
        if created.contains_key(&descriptor.name) || descriptors.contains_key(&descriptor.name) {
            return false;
        }
        created.insert(descriptor.name.clone(), descriptor.key());
        descriptors.insert(descriptor.name.clone(), descriptor);
        true
    }

    /// Forgets the create key for `name`.
    pub fn evict_created(&self, name: &str) {
        self.created.write().remove(name);
    }

    /// Runs `create` unless `name` is already known with `key`.
    ///
    /// Returns `Ok(false)` for a no-op. The key is checked before and after
    /// taking the per-name create lock; a failed `create` evicts the key so a
    /// retry does the work again.
    pub async fn create_once<F, Fut>(&self, name: &str, key: IndexKey, create: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.is_created(name, &key) {
            debug!(index = name, "create key unchanged, skipping");
            return Ok(false);
        }

        let _guard = self.lock_create(name).await;
        if self.is_created(name, &key) {
            debug!(index = name, "index created concurrently, skipping");
            return Ok(false);
        }

        match create().await {
            Ok(()) => {
                self.mark_created(name, key);
                Ok(true)
            }
            Err(e) => {
                self.evict_created(name);
                self.invalidate(name);
                Err(e)
            }
        }
    }

    /// Acquires the create lock for `name`.
    pub async fn lock_create(&self, name: &str) -> OwnedMutexGuard<()> {
        Self::named(&self.create_locks, name).lock_owned().await
    }

    /// Acquires the build lock for `name`.
    pub async fn lock_build(&self, name: &str) -> OwnedMutexGuard<()> {
        Self::named(&self.build_locks, name).lock_owned().await
    }

    fn named(locks: &NamedLocks, name: &str) -> Arc<AsyncMutex<()>> {
        locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Removes the lock entries for `name`.
    ///
    /// Holders of a removed lock keep it until they release; a later caller
    /// gets a fresh lock.
    pub fn prune_locks(&self, name: &str) {
        self.create_locks.lock().remove(name);
        self.build_locks.lock().remove(name);
    }

    /// Number of names with a create or build lock entry.
    pub fn lock_count(&self) -> usize {
        let create = self.create_locks.lock();
        let build = self.build_locks.lock();
        create
            .keys()
            .chain(build.keys().filter(|k| !create.contains_key(*k)))
            .count()
    }

    /// Purges everything known about `name`.
    pub fn forget(&self, name: &str) {
        self.invalidate(name);
        self.evict_created(name);
        self.prune_locks(name);
    }

    /// Names with a cached descriptor.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::error::Error;
    use crate::index::{IndexConfig, IndexType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(dimension: u32, index_type: IndexType) -> IndexKey {
        IndexKey::new("docs", dimension, DistanceMetric::Cosine, index_type, None)
    }

    fn descriptor(name: &str) -> IndexDescriptor {
        IndexDescriptor {
            name: name.to_string(),
            dimension: 3,
            metric: DistanceMetric::Cosine,
            config: IndexConfig::Flat,
            count: 0,
            full_text_language: None,
        }
    }

    #[tokio::test]
    async fn test_create_once_is_idempotent() {
        let catalog = IndexCatalog::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            catalog
                .create_once("docs", key(3, IndexType::Hnsw), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_change_reruns_create() {
        let catalog = IndexCatalog::new();
        let calls = AtomicUsize::new(0);
        let create = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        assert!(catalog.create_once("docs", key(3, IndexType::Hnsw), create).await.unwrap());
        assert!(catalog.create_once("docs", key(3, IndexType::IvfFlat), create).await.unwrap());
        assert!(!catalog.create_once("docs", key(3, IndexType::IvfFlat), create).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_run_once() {
        let catalog = Arc::new(IndexCatalog::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let catalog = catalog.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    catalog
                        .create_once("docs", key(3, IndexType::Hnsw), || async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_create_is_evicted() {
        let catalog = IndexCatalog::new();
        catalog.mark_created("docs", key(3, IndexType::Flat));
        catalog.cache_descriptor(descriptor("docs"));

        let result = catalog
            .create_once("docs", key(3, IndexType::Hnsw), || async {
                Err(Error::Permission("no".into()))
            })
            .await;
        assert!(matches!(result, Err(Error::Permission(_))));
        assert!(!catalog.is_created("docs", &key(3, IndexType::Flat)));
        assert!(catalog.descriptor("docs").is_none());

        // a retry does the work
        assert!(catalog
            .create_once("docs", key(3, IndexType::Hnsw), || async { Ok(()) })
            .await
            .unwrap());
    }

    #[test]
    fn test_adopt_keeps_newer_state() {
        let catalog = IndexCatalog::new();
        assert!(catalog.adopt(descriptor("docs")));
        assert!(catalog.is_created("docs", &descriptor("docs").key()));

        let newer = IndexDescriptor {
            metric: DistanceMetric::Euclidean,
            config: IndexConfig::IvfFlat(crate::index::IvfFlatConfig::new(100)),
            ..descriptor("other")
        };
        catalog.mark_created("other", newer.key());
        catalog.cache_descriptor(newer.clone());

        // a stale read of "other" must not replace what a create recorded
        assert!(!catalog.adopt(descriptor("other")));
        assert_eq!(catalog.descriptor("other"), Some(newer.clone()));
        assert!(catalog.is_created("other", &newer.key()));
        assert!(!catalog.is_created("other", &descriptor("other").key()));

        catalog.invalidate("other");
        assert!(!catalog.adopt(descriptor("other")));
        assert!(catalog.descriptor("other").is_none());
    }

    #[tokio::test]
    async fn test_build_lock_does_not_block_create() {
        let catalog = IndexCatalog::new();
        let _build = catalog.lock_build("docs").await;

        let create = tokio::time::timeout(Duration::from_millis(100), catalog.lock_create("docs")).await;
        assert!(create.is_ok());

        let other = tokio::time::timeout(Duration::from_millis(100), catalog.lock_build("other")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), catalog.lock_build("docs")).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn test_prune_and_forget() {
        let catalog = IndexCatalog::new();
        drop(catalog.lock_create("a").await);
        drop(catalog.lock_build("a").await);
        drop(catalog.lock_build("b").await);
        assert_eq!(catalog.lock_count(), 2);

        catalog.prune_locks("a");
        assert_eq!(catalog.lock_count(), 1);

        catalog.cache_descriptor(descriptor("b"));
        catalog.mark_created("b", key(3, IndexType::Flat));
        catalog.forget("b");
        assert!(catalog.descriptor("b").is_none());
        assert_eq!(catalog.lock_count(), 0);
        assert!(catalog.cached_names().is_empty());
    }
}
