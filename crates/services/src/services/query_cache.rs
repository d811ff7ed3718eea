//! Cache of list query results, invalidated per table by the realtime pipeline.

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use moka::future::Cache;
use tracing::{debug, trace};

/// Identifies one cached query: the table (or derived view) it reads and a scope such as
/// a filter string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub table: String,
    pub scope: String,
}

impl QueryKey {
    pub fn new(table: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            scope: scope.into(),
        }
    }
}

type CachedValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<QueryKey, CachedValue>,
    /// Bumped by every invalidation of a table; a fetch that straddles a bump is not kept.
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(300))
    }
}

impl QueryCache {
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(time_to_live)
                .build(),
            generations: Arc::default(),
        }
    }

    fn generation(&self, table: &str) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(table).copied().unwrap_or(0)
    }

    fn bump_generation(&self, table: &str) {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        *generations.entry(table.to_string()).or_insert(0) += 1;
    }

    /// Cached value for `key`, or the result of `fetch`. The result is cached only on
    /// success and only when `key.table` was not invalidated while it was being fetched.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.inner.get(&key).await {
            if let Ok(value) = hit.downcast::<T>() {
                trace!(table = %key.table, scope = %key.scope, "Query cache hit");
                return Ok(value);
            }
        }
        let generation = self.generation(&key.table);
        let value = Arc::new(fetch().await?);
        self.inner.insert(key.clone(), value.clone() as CachedValue).await;
        // checked after the insert so an invalidation racing the insert cannot be lost
        if self.generation(&key.table) != generation {
            self.inner.invalidate(&key).await;
            debug!(table = %key.table, scope = %key.scope, "Discarded result fetched across an invalidation");
        }
        Ok(value)
    }

    /// Drop every entry reading `table`.
    pub async fn invalidate_table(&self, table: &str) {
        self.bump_generation(table);
        let keys: Vec<QueryKey> = self
            .inner
            .iter()
            .filter(|(key, _)| key.table == table)
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &keys {
            self.inner.invalidate(key).await;
        }
        if !keys.is_empty() {
            debug!(table = %table, entries = keys.len(), "Invalidated cached queries");
        }
    }

    pub fn invalidate_all(&self) {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.values_mut().for_each(|generation| *generation += 1);
        drop(generations);
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_fetches_once_until_invalidated() {
        let cache = QueryCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![1, 2, 3])
        };

        let key = QueryKey::new("routines", "all");
        let first = cache.get_or_fetch(key.clone(), fetch).await.unwrap();
        let second = cache.get_or_fetch(key.clone(), fetch).await.unwrap();
        assert_eq!(*first, *second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_table("tasks").await;
        cache.get_or_fetch(key.clone(), fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_table("routines").await;
        cache.get_or_fetch(key, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = QueryCache::default();
        let key = QueryKey::new("tasks", "");
        let failed: Result<Arc<u32>, &str> = cache.get_or_fetch(key.clone(), || async { Err("boom") }).await;
        assert!(failed.is_err());
        let ok: Result<Arc<u32>, &str> = cache.get_or_fetch(key, || async { Ok(7) }).await;
        assert_eq!(*ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_result_fetched_across_invalidation_is_not_kept() {
        let cache = QueryCache::default();
        let key = QueryKey::new("routines", "cards:false");

        let raced = cache.clone();
        let old = cache
            .get_or_fetch(key.clone(), || async move {
                raced.invalidate_table("routines").await;
                Ok::<_, ()>("old")
            })
            .await
            .unwrap();
        assert_eq!(*old, "old");

        let fresh = cache
            .get_or_fetch(key, || async { Ok::<_, ()>("new") })
            .await
            .unwrap();
        assert_eq!(*fresh, "new");
    }
}
