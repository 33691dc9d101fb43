use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::Semaphore;

use crate::{
    db::Datastore,
    models::{ContentType, KinopoiskMovie, MovieEntry, MovieId, MovieRecord},
    services::providers::MetadataProvider,
};

/// Ceiling on concurrent outbound metadata requests
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// Timing for remote metadata requests
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub attempt_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(5),
            max_retries: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Turns IMDb IDs into movie records, local store first
///
/// Every id that can't be served from the store or validated from the
/// provider is left out of the result. A provider outage for one id never
/// affects the others.
#[derive(Clone)]
pub struct MetadataFetcher {
    provider: Arc<dyn MetadataProvider>,
    store: Arc<dyn Datastore>,
    permits: Arc<Semaphore>,
    policy: FetchPolicy,
}

impl MetadataFetcher {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        store: Arc<dyn Datastore>,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            provider,
            store,
            permits,
            policy: FetchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn fetch(&self, movie_ids: &[MovieId]) -> HashMap<MovieId, MovieEntry> {
        let mut entries = HashMap::new();
        if movie_ids.is_empty() {
            return entries;
        }

        let cached = match self.store.get_movies_by_ids(movie_ids).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Movie cache lookup failed, fetching all remotely");
                Vec::new()
            }
        };
        for record in cached {
            entries.insert(record.id.clone(), MovieEntry::Cached(record));
        }

        let mut remote: Vec<MovieId> = Vec::new();
        for movie_id in movie_ids {
            if !entries.contains_key(movie_id) && !remote.contains(movie_id) {
                remote.push(movie_id.clone());
            }
        }

        tracing::info!(
            requested = movie_ids.len(),
            cached = entries.len(),
            remote = remote.len(),
            "Fetching movie metadata"
        );

        let mut tasks = Vec::with_capacity(remote.len());
        for movie_id in remote {
            let fetcher = self.clone();
            tasks.push(tokio::spawn(async move { fetcher.fetch_remote(movie_id).await }));
        }

        for task in tasks {
            match task.await {
                Ok(Some(entry)) => {
                    entries.insert(entry.id().clone(), entry);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Metadata task join error"),
            }
        }

        entries
    }

    async fn fetch_remote(&self, movie_id: MovieId) -> Option<MovieEntry> {
        let doc = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(error = %e, "Metadata semaphore closed");
                    return None;
                }
            };
            self.request_with_retry(&movie_id).await?
        };

        let record = match validate(&movie_id, doc) {
            Some(record) => record,
            None => {
                tracing::warn!(movie_id = %movie_id, "Discarding incomplete metadata");
                return None;
            }
        };

        match self.store.upsert_movie(&record).await {
            Ok(inserted) => {
                tracing::debug!(movie_id = %movie_id, inserted, "Movie cached");
                Some(MovieEntry::Cached(record))
            }
            Err(e) => {
                tracing::warn!(movie_id = %movie_id, error = %e, "Failed to cache movie");
                Some(MovieEntry::Transient(record))
            }
        }
    }

    /// `None` once every attempt failed or the provider has no document
    async fn request_with_retry(&self, movie_id: &MovieId) -> Option<KinopoiskMovie> {
        let attempts = self.policy.max_retries + 1;

        for attempt in 1..=attempts {
            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.provider.fetch_metadata(movie_id))
                    .await;

            match outcome {
                Ok(Ok(Some(doc))) => return Some(doc),
                Ok(Ok(None)) => {
                    tracing::debug!(movie_id = %movie_id, "Provider has no document");
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::warn!(movie_id = %movie_id, attempt, error = %e, "Metadata request failed");
                }
                Err(_) => {
                    tracing::warn!(movie_id = %movie_id, attempt, "Metadata request timed out");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        None
    }
}

/// Builds a record from a provider document, `None` if anything required is missing
pub fn validate(movie_id: &MovieId, doc: KinopoiskMovie) -> Option<MovieRecord> {
    let name = doc.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;

    let poster_url = doc.poster.and_then(|p| p.url).filter(|url| {
        Url::parse(url)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false)
    })?;

    let rating = doc
        .rating
        .and_then(|r| r.kp)
        .filter(|kp| kp.is_finite() && *kp > 0.0)?;

    let description = [doc.short_description, doc.description]
        .into_iter()
        .flatten()
        .map(|d| d.trim().to_string())
        .find(|d| !d.is_empty())?;

    let duration_minutes = doc
        .movie_length
        .filter(|m| *m > 0)
        .or(doc.series_length.filter(|m| *m > 0))
        .unwrap_or(0);

    let genres = doc
        .genres
        .into_iter()
        .map(|g| g.name.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();

    Some(MovieRecord {
        id: movie_id.clone(),
        name,
        description,
        rating,
        poster_url: Some(poster_url),
        year: doc.year.unwrap_or(0),
        genres,
        duration_minutes,
        content_type: ContentType::from_provider(doc.kind.as_deref()),
    })
}
