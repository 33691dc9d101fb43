use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::{
    db::Datastore,
    error::AppResult,
    models::{InteractionKind, MovieEntry, MovieId, MovieRecord, PreferenceProfile, UserId},
    services::{
        llm::{LlmClient, PromptMessage},
        metadata::MetadataFetcher,
        prompts,
        title_resolver::TitleResolver,
    },
};

/// Full pipeline runs before giving up on an empty batch
pub const MAX_ATTEMPTS: usize = 3;

/// Liked movies needed before history drives recommendations, and how many
/// of the most recent ones are sent to the model
pub const HISTORY_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendationMode {
    /// `preferences_priority` forces the questionnaire strategy, used right
    /// after the questionnaire was (re)filled
    Auto { preferences_priority: bool },
    Search(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Questionnaire,
    History,
    Search,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub strategy: Strategy,
    pub movies: Vec<MovieEntry>,
}

impl Recommendation {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

/// Turns a user's answers or history into an enriched, filtered batch
///
/// The model does all ranking. Its order survives resolution, exclusion
/// of already-seen movies and deduplication.
#[derive(Clone)]
pub struct RecommendationOrchestrator {
    store: Arc<dyn Datastore>,
    llm: Arc<dyn LlmClient>,
    resolver: TitleResolver,
    fetcher: MetadataFetcher,
    llm_timeout: Duration,
}

impl RecommendationOrchestrator {
    pub fn new(
        store: Arc<dyn Datastore>,
        llm: Arc<dyn LlmClient>,
        resolver: TitleResolver,
        fetcher: MetadataFetcher,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            store,
            llm,
            resolver,
            fetcher,
            llm_timeout,
        }
    }

    /// Runs the pipeline once. An empty batch is a valid, retryable outcome.
    pub async fn recommend(
        &self,
        user_id: UserId,
        mode: &RecommendationMode,
    ) -> AppResult<Recommendation> {
        let (strategy, messages) = self.build_prompt(user_id, mode).await?;

        tracing::info!(user_id = %user_id, strategy = ?strategy, "Requesting recommendations");

        let titles = self.complete_titles(user_id, messages).await;
        if titles.is_empty() {
            return Ok(Recommendation {
                strategy,
                movies: Vec::new(),
            });
        }

        let resolved = self.resolver.resolve_many(&titles).await;

        let excluded: HashSet<MovieId> = self
            .store
            .get_interactions(user_id, &InteractionKind::EXCLUDED)
            .await?
            .into_iter()
            .map(|record| record.movie_id)
            .collect();

        let movie_ids = select_candidates(resolved, &excluded);
        let mut entries = self.fetcher.fetch(&movie_ids).await;

        let movies: Vec<MovieEntry> = movie_ids
            .iter()
            .filter_map(|movie_id| entries.remove(movie_id))
            .collect();

        tracing::info!(
            user_id = %user_id,
            strategy = ?strategy,
            titles = titles.len(),
            candidates = movie_ids.len(),
            movies = movies.len(),
            "Recommendation batch ready"
        );

        Ok(Recommendation { strategy, movies })
    }

    /// Retries the whole pipeline while it yields nothing
    ///
    /// Returns the last (empty) batch once [`MAX_ATTEMPTS`] runs are used up.
    pub async fn recommend_with_retry(
        &self,
        user_id: UserId,
        mode: &RecommendationMode,
    ) -> AppResult<Recommendation> {
        let mut attempt = 1;
        loop {
            let recommendation = self.recommend(user_id, mode).await?;
            if !recommendation.is_empty() || attempt >= MAX_ATTEMPTS {
                if recommendation.is_empty() {
                    tracing::warn!(user_id = %user_id, attempts = attempt, "No recommendations after retries");
                }
                return Ok(recommendation);
            }

            tracing::info!(user_id = %user_id, attempt, "Empty recommendation batch, retrying");
            attempt += 1;
        }
    }

    async fn build_prompt(
        &self,
        user_id: UserId,
        mode: &RecommendationMode,
    ) -> AppResult<(Strategy, Vec<PromptMessage>)> {
        let preferences_priority = match mode {
            RecommendationMode::Search(query) => {
                return Ok((Strategy::Search, prompts::search_prompt(query)));
            }
            RecommendationMode::Auto {
                preferences_priority,
            } => *preferences_priority,
        };

        if !preferences_priority {
            let liked = self
                .store
                .get_interacted_movies(user_id, &[InteractionKind::Liked])
                .await?;

            if liked.len() >= HISTORY_WINDOW {
                let recent = recent_unique(liked, HISTORY_WINDOW);
                return Ok((Strategy::History, prompts::history_prompt(&recent)));
            }
        }

        let profile = self
            .store
            .get_preference_profile(user_id)
            .await?
            .unwrap_or_else(|| PreferenceProfile::new(user_id, Vec::new()));

        Ok((Strategy::Questionnaire, prompts::questionnaire_prompt(&profile)))
    }

    /// Model titles, empty on timeout, error or unparseable output
    async fn complete_titles(&self, user_id: UserId, messages: Vec<PromptMessage>) -> Vec<String> {
        match tokio::time::timeout(self.llm_timeout, self.llm.complete(messages)).await {
            Ok(Ok(content)) => prompts::parse_movie_list(&content),
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Completion failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    timeout_secs = self.llm_timeout.as_secs(),
                    "Completion timed out"
                );
                Vec::new()
            }
        }
    }
}

/// Resolved ids in model order, minus unresolved, excluded and repeated ones
fn select_candidates(
    resolved: Vec<(String, Option<MovieId>)>,
    excluded: &HashSet<MovieId>,
) -> Vec<MovieId> {
    let mut seen = HashSet::new();
    resolved
        .into_iter()
        .filter_map(|(_, movie_id)| movie_id)
        .filter(|movie_id| !excluded.contains(movie_id))
        .filter(|movie_id| seen.insert(movie_id.clone()))
        .collect()
}

/// The `limit` most recent movies (input is oldest first), unique by id
fn recent_unique(movies: Vec<MovieRecord>, limit: usize) -> Vec<MovieRecord> {
    let mut seen = HashSet::new();
    let mut recent: Vec<MovieRecord> = movies
        .into_iter()
        .rev()
        .filter(|movie| seen.insert(movie.id.clone()))
        .take(limit)
        .collect();
    recent.reverse();
    recent
}
