//! Identity-keyed collection cache with in-flight coalescing.
//!
//! Cache identity is the resource name, the settled filter, and the page
//! index; sort order and page size are applied client-side and never reach
//! the cache. Each identity maps to a single-assignment cell, so a miss and
//! the requests that pile up behind it share one network call. A failed
//! fetch leaves the cell empty: errors are never cached, and the next
//! caller simply tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::Result;

/// The subset of query parameters that determines cache-key equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryIdentity {
    /// Resource the query reads (e.g. `events`).
    pub resource: &'static str,
    /// Settled (debounced) filter text, never the raw keystroke value.
    pub filter: String,
    /// Zero-based page index.
    pub page: usize,
}

impl QueryIdentity {
    /// Identity for one page of `resource` under `filter`.
    #[must_use]
    pub fn new(resource: &'static str, filter: impl Into<String>, page: usize) -> Self {
        Self {
            resource,
            filter: filter.into(),
            page,
        }
    }
}

/// A fetched page plus when it arrived.
#[derive(Debug, Clone)]
pub struct CachedPage<T> {
    /// Records in server order.
    pub records: Arc<[T]>,
    /// When the fetch completed.
    pub fetched_at: Instant,
}

type Cell<T> = Arc<OnceCell<CachedPage<T>>>;

/// Counters describing cache behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Reads answered from a populated entry.
    pub hits: u64,
    /// Reads that had to wait on a fetch.
    pub misses: u64,
    /// Entries dropped by [`CollectionCache::invalidate`].
    pub invalidations: u64,
}

/// Pages keyed by [`QueryIdentity`].
#[derive(Debug)]
pub struct CollectionCache<T> {
    entries: Mutex<HashMap<QueryIdentity, Cell<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<T> CollectionCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Return the cached page for `identity`, fetching on a miss.
    ///
    /// Concurrent callers for the same identity share one in-flight fetch;
    /// the losers wait on the winner's cell instead of issuing their own
    /// network call.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error to the caller whose fetch ran. The entry
    /// stays empty, so a later read retries.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        identity: &QueryIdentity,
        fetch: F,
    ) -> Result<CachedPage<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(identity.clone()).or_default())
        };
        if let Some(page) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(page.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(?identity, "cache miss");
        let page = cell
            .get_or_try_init(|| async {
                let records = fetch().await?;
                Ok::<CachedPage<T>, crate::error::Error>(CachedPage {
                    records: records.into(),
                    fetched_at: Instant::now(),
                })
            })
            .await?;
        Ok(page.clone())
    }

    /// Drop every cached page for `resource`.
    ///
    /// Called after a successful create, update, or delete so the next read
    /// is forced to refetch. An in-flight fetch for a dropped identity
    /// completes into its orphaned cell and is never served again.
    pub async fn invalidate(&self, resource: &str) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|identity, _| identity.resource != resource);
        let dropped = before - entries.len();
        if dropped > 0 {
            self.invalidations
                .fetch_add(dropped as u64, Ordering::Relaxed);
            debug!(resource, dropped, "cache invalidated");
        }
    }

    /// Snapshot the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for CollectionCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn identity(filter: &str, page: usize) -> QueryIdentity {
        QueryIdentity::new("events", filter, page)
    }

    #[tokio::test]
    async fn second_read_is_a_hit() {
        let cache = CollectionCache::<u32>::new();
        let id = identity("rust", 0);

        let first = cache.get_or_fetch(&id, || async { Ok(vec![1, 2]) }).await;
        assert_eq!(&*first.unwrap().records, &[1, 2]);

        let second = cache
            .get_or_fetch(&id, || async { panic!("must not refetch") })
            .await;
        assert_eq!(&*second.unwrap().records, &[1, 2]);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn concurrent_reads_coalesce_to_one_fetch() {
        let cache = Arc::new(CollectionCache::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let reader = |cache: Arc<CollectionCache<u32>>,
                      calls: Arc<AtomicUsize>,
                      release: Arc<Notify>| async move {
            cache
                .get_or_fetch(&identity("rust", 0), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    Ok(vec![7])
                })
                .await
        };

        let a = tokio::spawn(reader(
            Arc::clone(&cache),
            Arc::clone(&calls),
            Arc::clone(&release),
        ));
        let b = tokio::spawn(reader(
            Arc::clone(&cache),
            Arc::clone(&calls),
            Arc::clone(&release),
        ));
        // One permit: only the single winning fetch ever waits for it.
        release.notify_one();

        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_identities_fetch_separately() {
        let cache = CollectionCache::<u32>::new();
        cache
            .get_or_fetch(&identity("rust", 0), || async { Ok(vec![1]) })
            .await
            .unwrap();
        let other = cache
            .get_or_fetch(&identity("rust", 1), || async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(&*other.records, &[2]);
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn invalidation_forces_a_refetch() {
        let cache = CollectionCache::<u32>::new();
        let id = identity("", 0);
        cache
            .get_or_fetch(&id, || async { Ok(vec![1]) })
            .await
            .unwrap();

        cache.invalidate("events").await;

        let fresh = cache
            .get_or_fetch(&id, || async { Ok(vec![9]) })
            .await
            .unwrap();
        assert_eq!(&*fresh.records, &[9]);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = CollectionCache::<u32>::new();
        let id = identity("", 0);

        let failed = cache
            .get_or_fetch(&id, || async { Err(Error::LoadFailed("offline".into())) })
            .await;
        assert!(failed.is_err());

        let recovered = cache
            .get_or_fetch(&id, || async { Ok(vec![3]) })
            .await
            .unwrap();
        assert_eq!(&*recovered.records, &[3]);
    }
}
