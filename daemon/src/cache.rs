//! Research cache with single-flight fetching
//!
//! Successful results are kept for the life of the daemon, keyed by the
//! normalized query. Concurrent requests for a key that is not cached yet
//! share one upstream fetch; every waiter receives the same outcome.
//! Failures are handed to the waiters and then forgotten.
//!
//! Invalidating a key (or clearing the cache) moves it to a new
//! generation. A fetch started under an older generation still answers its
//! waiters but never writes its result back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use restomod_core::{ResearchQuery, ResearchResult};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::research::{ResearchError, ResearchSource};

type Outcome = Result<ResearchResult, ResearchError>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResearchQuery,
    pub value: ResearchResult,
    pub inserted_at: DateTime<Utc>,
}

struct Pending {
    generation: u64,
    tx: broadcast::Sender<Outcome>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ResearchQuery, CacheEntry>,
    pending: HashMap<ResearchQuery, Pending>,
    /// Bumped by `clear`
    epoch: u64,
    /// Bumped by `invalidate`, per key
    key_generations: HashMap<ResearchQuery, u64>,
}

impl CacheState {
    fn generation(&self, query: &ResearchQuery) -> u64 {
        self.epoch + self.key_generations.get(query).copied().unwrap_or(0)
    }
}

/// Shared, cloneable handle to the cache.
#[derive(Clone)]
pub struct ResearchCache {
    source: Arc<dyn ResearchSource>,
    state: Arc<Mutex<CacheState>>,
}

impl ResearchCache {
    pub fn new(source: Arc<dyn ResearchSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        lock_state(&self.state)
    }

    /// Cached result for `query`, without fetching.
    pub fn lookup(&self, query: &ResearchQuery) -> Option<ResearchResult> {
        self.lock().entries.get(query).map(|e| e.value.clone())
    }

    /// Full cache entry for `query`, including when it was stored.
    pub fn entry(&self, query: &ResearchQuery) -> Option<CacheEntry> {
        self.lock().entries.get(query).cloned()
    }

    /// Cached result, or the outcome of a (possibly shared) fetch.
    pub async fn get(&self, query: &ResearchQuery) -> Outcome {
        let rx = {
            let mut state = self.lock();
            if let Some(entry) = state.entries.get(query) {
                debug!("Cache hit: {}", query.cache_key());
                return Ok(entry.value.clone());
            }
            self.join_or_start(&mut state, query)
        };
        wait(rx).await
    }

    /// Fetch again even if cached. Joins a fetch already in flight for the
    /// key. The old entry survives a failed refresh.
    pub async fn refresh(&self, query: &ResearchQuery) -> Outcome {
        let rx = {
            let mut state = self.lock();
            self.join_or_start(&mut state, query)
        };
        wait(rx).await
    }

    pub fn put(&self, query: ResearchQuery, value: ResearchResult) {
        let entry = CacheEntry {
            key: query.clone(),
            value,
            inserted_at: Utc::now(),
        };
        self.lock().entries.insert(query, entry);
    }

    /// Drop one entry. Returns whether it was present. A fetch already in
    /// flight for the key will not repopulate it.
    pub fn invalidate(&self, query: &ResearchQuery) -> bool {
        let mut state = self.lock();
        *state.key_generations.entry(query.clone()).or_insert(0) += 1;
        state.pending.remove(query);
        state.entries.remove(query).is_some()
    }

    /// Drop every entry. Fetches in flight will not repopulate the cache.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.pending.clear();
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join_or_start(
        &self,
        state: &mut CacheState,
        query: &ResearchQuery,
    ) -> broadcast::Receiver<Outcome> {
        if let Some(pending) = state.pending.get(query) {
            debug!("Joining in-flight fetch: {}", query.cache_key());
            return pending.tx.subscribe();
        }

        let generation = state.generation(query);
        let (tx, rx) = broadcast::channel(1);
        state.pending.insert(
            query.clone(),
            Pending {
                generation,
                tx: tx.clone(),
            },
        );
        debug!("Cache miss, fetching: {}", query.cache_key());

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.state);
        let query = query.clone();

        // Detached so a caller giving up does not strand the other waiters
        tokio::spawn(async move {
            let fetch_query = query.clone();
            let outcome = match tokio::spawn(async move { source.fetch(&fetch_query).await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(ResearchError::Network(format!("Research task failed: {}", e))),
            };

            {
                let mut state = lock_state(&shared);
                let current = state.generation(&query);
                if state.pending.get(&query).map(|p| p.generation) == Some(generation) {
                    state.pending.remove(&query);
                }
                match &outcome {
                    Ok(_) if current != generation => {
                        debug!("Discarding stale fetch: {}", query.cache_key());
                    }
                    Ok(value) => {
                        state.entries.insert(
                            query.clone(),
                            CacheEntry {
                                key: query.clone(),
                                value: value.clone(),
                                inserted_at: Utc::now(),
                            },
                        );
                    }
                    Err(e) => warn!("Research failed for {}: {}", query.cache_key(), e),
                }
            }

            // No receivers left is fine
            let _ = tx.send(outcome);
        });

        rx
    }
}

fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn wait(mut rx: broadcast::Receiver<Outcome>) -> Outcome {
    rx.recv()
        .await
        .unwrap_or_else(|e| Err(ResearchError::Network(format!("Research fetch abandoned: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    /// Counts calls; answers after a short delay, failing while `fail` is set.
    struct CountingSource {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(fail),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResearchSource for CountingSource {
        async fn fetch(&self, query: &ResearchQuery) -> Result<ResearchResult, ResearchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail.load(Ordering::SeqCst) {
                Err(ResearchError::Network("connection refused".to_string()))
            } else {
                Ok(ResearchResult::with_overview(format!("{} #{}", query, n)))
            }
        }
    }

    fn mustang() -> ResearchQuery {
        ResearchQuery::vehicle("1967 Ford Mustang").unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let source = CountingSource::new(false);
        let cache = ResearchCache::new(source.clone());
        let query = mustang();

        let (a, b, c) = tokio::join!(cache.get(&query), cache.get(&query), cache.get(&query));

        assert_eq!(source.calls(), 1);
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(cache.len(), 1);

        // Served from the cache afterwards
        let again = cache.get(&query).await.unwrap();
        assert_eq!(again, a);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let source = CountingSource::new(true);
        let cache = ResearchCache::new(source.clone());
        let query = mustang();

        let (a, b) = tokio::join!(cache.get(&query), cache.get(&query));
        assert!(matches!(a, Err(ResearchError::Network(_))));
        assert_eq!(a, b);
        assert_eq!(source.calls(), 1);
        assert!(cache.is_empty());
        assert!(cache.lookup(&query).is_none());

        source.fail.store(false, Ordering::SeqCst);
        assert!(cache.get(&query).await.is_ok());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_but_survives_failure() {
        let source = CountingSource::new(false);
        let cache = ResearchCache::new(source.clone());
        let query = mustang();

        let first = cache.get(&query).await.unwrap();
        let refreshed = cache.refresh(&query).await.unwrap();
        assert_ne!(first, refreshed);
        assert_eq!(cache.lookup(&query), Some(refreshed.clone()));

        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.refresh(&query).await.is_err());
        assert_eq!(cache.lookup(&query), Some(refreshed));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_put_and_invalidate() {
        let cache = ResearchCache::new(CountingSource::new(true));
        let brakes = ResearchQuery::part("Brakes", Some("1969 Chevrolet Camaro")).unwrap();
        let brakes_general = ResearchQuery::part("Brakes", None).unwrap();

        cache.put(brakes.clone(), ResearchResult::with_overview("test"));
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&brakes_general).is_none());

        let entry = cache.entry(&brakes).unwrap();
        assert_eq!(entry.key, brakes);
        assert_eq!(entry.value.overview, "test");
        assert!(entry.inserted_at <= Utc::now());

        assert!(cache.invalidate(&brakes));
        assert!(!cache.invalidate(&brakes));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ResearchCache::new(CountingSource::new(false));
        cache.put(mustang(), ResearchResult::with_overview("a"));
        cache.put(
            ResearchQuery::vehicle("1969 Chevrolet Camaro").unwrap(),
            ResearchResult::with_overview("b"),
        );
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_is_not_undone() {
        let source = CountingSource::new(false);
        let cache = ResearchCache::new(source.clone());
        let query = mustang();

        let stale = tokio::spawn({
            let cache = cache.clone();
            let query = query.clone();
            async move { cache.get(&query).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&query);

        // The waiter is still answered, but nothing is stored
        let stale = stale.await.unwrap().unwrap();
        assert_eq!(stale.overview, "1967 Ford Mustang #1");
        assert!(cache.lookup(&query).is_none());

        let fresh = cache.get(&query).await.unwrap();
        assert_eq!(fresh.overview, "1967 Ford Mustang #2");
        assert_eq!(cache.lookup(&query), Some(fresh));
    }

    #[tokio::test]
    async fn test_stale_fetch_leaves_newer_fetch_alone() {
        let source = CountingSource::new(false);
        let cache = ResearchCache::new(source.clone());
        let query = mustang();

        let first = tokio::spawn({
            let cache = cache.clone();
            let query = query.clone();
            async move { cache.get(&query).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&query);

        let second = tokio::spawn({
            let cache = cache.clone();
            let query = query.clone();
            async move { cache.get(&query).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Joins the newer fetch rather than starting a third
        let third = cache.get(&query).await.unwrap();
        assert_eq!(first.await.unwrap().unwrap().overview, "1967 Ford Mustang #1");
        assert_eq!(second.await.unwrap().unwrap(), third);
        assert_eq!(third.overview, "1967 Ford Mustang #2");
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.lookup(&query), Some(third));
    }

    #[tokio::test]
    async fn test_clear_during_fetch_is_not_undone() {
        let source = CountingSource::new(false);
        let cache = ResearchCache::new(source.clone());
        let camaro = ResearchQuery::vehicle("1969 Chevrolet Camaro").unwrap();

        let pending = tokio::spawn({
            let cache = cache.clone();
            let (a, b) = (mustang(), camaro.clone());
            async move { tokio::join!(cache.get(&a), cache.get(&b)) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.clear();

        let (a, b) = pending.await.unwrap();
        assert!(a.is_ok() && b.is_ok());
        assert!(cache.is_empty());

        // Fetches started after the clear are stored again
        cache.get(&camaro).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(source.calls(), 3);
    }
}
