use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::{
    db::Cache,
    models::MovieId,
    services::providers::TitleLookup,
};

/// Ceiling on concurrent outbound title lookups
pub const MAX_CONCURRENT_LOOKUPS: usize = 5;

/// Title memo with FIFO eviction once `capacity` entries are held
struct BoundedMemo {
    capacity: usize,
    entries: HashMap<String, MovieId>,
    order: VecDeque<String>,
}

impl BoundedMemo {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, title: &str) -> Option<MovieId> {
        self.entries.get(title).cloned()
    }

    fn insert(&mut self, title: String, movie_id: MovieId) {
        if self.entries.insert(title.clone(), movie_id).is_some() {
            return;
        }
        self.order.push_back(title);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Maps free-text titles to canonical IMDb IDs
///
/// Lookups are memoized by the exact title string and bounded by a shared
/// semaphore. A failed or empty lookup resolves to `None` and is not cached,
/// so a later batch may try the same title again.
#[derive(Clone)]
pub struct TitleResolver {
    lookup: Arc<dyn TitleLookup>,
    memo: Arc<Mutex<BoundedMemo>>,
    permits: Arc<Semaphore>,
    shared_cache: Option<Cache>,
}

impl TitleResolver {
    pub fn new(lookup: Arc<dyn TitleLookup>, permits: Arc<Semaphore>, capacity: usize) -> Self {
        Self {
            lookup,
            memo: Arc::new(Mutex::new(BoundedMemo::new(capacity))),
            permits,
            shared_cache: None,
        }
    }

    /// Adds Redis as a second tier behind the in-process memo
    pub fn with_shared_cache(mut self, cache: Cache) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Number of memoized titles
    pub fn cached_len(&self) -> usize {
        self.memo.lock().map(|memo| memo.len()).unwrap_or(0)
    }

    fn memo_get(&self, title: &str) -> Option<MovieId> {
        self.memo.lock().ok().and_then(|memo| memo.get(title))
    }

    fn memo_insert(&self, title: &str, movie_id: &MovieId) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(title.to_string(), movie_id.clone());
        }
    }

    async fn shared_get(&self, title: &str) -> Option<MovieId> {
        let cache = self.shared_cache.as_ref()?;
        match cache.get_title(title).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, title = %title, "Shared title cache unavailable");
                None
            }
        }
    }

    /// Resolves a single title, `None` when unresolved
    pub async fn resolve(&self, title: &str) -> Option<MovieId> {
        if let Some(movie_id) = self.memo_get(title) {
            tracing::debug!(title = %title, movie_id = %movie_id, "Title memo hit");
            return Some(movie_id);
        }

        if let Some(movie_id) = self.shared_get(title).await {
            self.memo_insert(title, &movie_id);
            return Some(movie_id);
        }

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(error = %e, "Title lookup semaphore closed");
                return None;
            }
        };

        match self.lookup.lookup_id(title).await {
            Ok(Some(movie_id)) => {
                self.memo_insert(title, &movie_id);
                if let Some(cache) = &self.shared_cache {
                    cache.put_title(title, &movie_id);
                }
                Some(movie_id)
            }
            Ok(None) => {
                tracing::debug!(title = %title, "Title not found");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, title = %title, "Title lookup failed");
                None
            }
        }
    }

    /// Resolves many titles concurrently, preserving input order
    ///
    /// Duplicate titles in the input are looked up once.
    pub async fn resolve_many(&self, titles: &[String]) -> Vec<(String, Option<MovieId>)> {
        let mut unique: Vec<String> = Vec::new();
        for title in titles {
            if !unique.contains(title) {
                unique.push(title.clone());
            }
        }

        let mut tasks = Vec::with_capacity(unique.len());
        for title in unique {
            let resolver = self.clone();
            let task = tokio::spawn(async move {
                let movie_id = resolver.resolve(&title).await;
                (title, movie_id)
            });
            tasks.push(task);
        }

        let mut resolved: HashMap<String, Option<MovieId>> = HashMap::new();
        for task in tasks {
            match task.await {
                Ok((title, movie_id)) => {
                    resolved.insert(title, movie_id);
                }
                Err(e) => tracing::error!(error = %e, "Title lookup task join error"),
            }
        }

        let result: Vec<(String, Option<MovieId>)> = titles
            .iter()
            .map(|title| (title.clone(), resolved.get(title).cloned().flatten()))
            .collect();

        tracing::info!(
            requested = titles.len(),
            resolved = result.iter().filter(|(_, id)| id.is_some()).count(),
            "Titles resolved"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::services::providers::MockTitleLookup;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn resolver(lookup: impl TitleLookup + 'static) -> TitleResolver {
        TitleResolver::new(
            Arc::new(lookup),
            Arc::new(Semaphore::new(MAX_CONCURRENT_LOOKUPS)),
            100,
        )
    }

    /// Records the peak number of lookups running at once
    struct SlowLookup {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TitleLookup for Arc<SlowLookup> {
        async fn lookup_id(&self, title: &str) -> AppResult<Option<MovieId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(MovieId::new(format!("tt-{}", title))))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let mut lookup = MockTitleLookup::new();
        lookup
            .expect_lookup_id()
            .times(1)
            .returning(|_| Ok(Some(MovieId::new("tt1375666"))));

        let resolver = resolver(lookup);
        assert_eq!(resolver.resolve("Inception").await, Some(MovieId::new("tt1375666")));
        assert_eq!(resolver.resolve("Inception").await, Some(MovieId::new("tt1375666")));
        assert_eq!(resolver.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_title_variants_are_distinct_keys() {
        let mut lookup = MockTitleLookup::new();
        lookup
            .expect_lookup_id()
            .times(2)
            .returning(|_| Ok(Some(MovieId::new("tt0133093"))));

        let resolver = resolver(lookup);
        resolver.resolve("The Matrix").await;
        resolver.resolve("the matrix").await;
        assert_eq!(resolver.cached_len(), 2);
    }

    #[tokio::test]
    async fn test_failures_resolve_to_none_and_are_not_cached() {
        let mut lookup = MockTitleLookup::new();
        lookup
            .expect_lookup_id()
            .times(2)
            .returning(|_| Err(AppError::ExternalApi("503".to_string())));

        let resolver = resolver(lookup);
        assert_eq!(resolver.resolve("Heat").await, None);
        assert_eq!(resolver.resolve("Heat").await, None);
        assert_eq!(resolver.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_resolve_many_preserves_order_and_dedupes() {
        let mut lookup = MockTitleLookup::new();
        lookup.expect_lookup_id().times(3).returning(|title| {
            Ok(match title {
                "Alien" => Some(MovieId::new("tt0078748")),
                "Aliens" => Some(MovieId::new("tt0090605")),
                _ => None,
            })
        });

        let resolver = resolver(lookup);
        let titles: Vec<String> = ["Alien", "Nonexistent", "Aliens", "Alien"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = resolver.resolve_many(&titles).await;

        assert_eq!(result.len(), 4);
        assert_eq!(result[0].1, Some(MovieId::new("tt0078748")));
        assert_eq!(result[1].1, None);
        assert_eq!(result[2].1, Some(MovieId::new("tt0090605")));
        assert_eq!(result[3].0, "Alien");
        assert_eq!(result[3].1, Some(MovieId::new("tt0078748")));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_are_bounded() {
        let lookup = Arc::new(SlowLookup {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver(lookup.clone());

        let titles: Vec<String> = (0..20).map(|i| format!("Movie {}", i)).collect();
        let result = resolver.resolve_many(&titles).await;

        assert_eq!(result.len(), 20);
        assert!(result.iter().all(|(_, id)| id.is_some()));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 20);
        assert!(lookup.peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_LOOKUPS);
    }

    #[tokio::test]
    async fn test_unreachable_shared_cache_falls_through_to_lookup() {
        let mut lookup = MockTitleLookup::new();
        lookup
            .expect_lookup_id()
            .times(1)
            .returning(|_| Ok(Some(MovieId::new("tt0113277"))));

        let client = crate::db::create_redis_client("redis://127.0.0.1:1/").unwrap();
        let (cache, handle) = Cache::new(client);
        let resolver = resolver(lookup).with_shared_cache(cache);

        assert_eq!(resolver.resolve("Heat").await, Some(MovieId::new("tt0113277")));
        // second call is served by the memo, the shared tier is not consulted
        assert_eq!(resolver.resolve("Heat").await, Some(MovieId::new("tt0113277")));
        assert_eq!(resolver.cached_len(), 1);

        handle.shutdown().await;
    }

    #[test]
    fn test_memo_evicts_oldest_first() {
        let mut memo = BoundedMemo::new(2);
        memo.insert("a".to_string(), MovieId::new("tt1"));
        memo.insert("b".to_string(), MovieId::new("tt2"));
        memo.insert("a".to_string(), MovieId::new("tt1"));
        memo.insert("c".to_string(), MovieId::new("tt3"));

        assert_eq!(memo.len(), 2);
        assert_eq!(memo.get("a"), None);
        assert_eq!(memo.get("b"), Some(MovieId::new("tt2")));
        assert_eq!(memo.get("c"), Some(MovieId::new("tt3")));
    }
}
