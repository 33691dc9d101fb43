use crate::{
    error::AppResult,
    models::{InteractionKind, InteractionRecord, MovieId, MovieRecord, PreferenceProfile, User, UserId},
};

/// Persistence boundary for users, questionnaire answers, interactions and
/// cached movie metadata.
///
/// Every method is atomic on its own: multi-row writes either fully commit
/// or leave the store untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Datastore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> AppResult<Option<User>>;

    /// Creates the user on first contact, otherwise refreshes `last_seen_at`
    async fn upsert_user(&self, user_id: UserId) -> AppResult<User>;

    async fn get_preference_profile(&self, user_id: UserId)
        -> AppResult<Option<PreferenceProfile>>;

    /// Replaces the whole profile
    async fn upsert_preference_profile(&self, profile: &PreferenceProfile) -> AppResult<()>;

    async fn reset_preference_profile(&self, user_id: UserId) -> AppResult<()>;

    /// Records `kind` for the pair, replacing any previous kind
    async fn upsert_interaction(
        &self,
        user_id: UserId,
        movie_id: &MovieId,
        kind: InteractionKind,
    ) -> AppResult<()>;

    /// Batch form of [`Datastore::upsert_interaction`]; recency follows slice order
    async fn upsert_interactions(
        &self,
        user_id: UserId,
        movie_ids: &[MovieId],
        kind: InteractionKind,
    ) -> AppResult<()>;

    /// Interactions of the given kinds, oldest first
    async fn get_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<InteractionRecord>>;

    /// Movies joined with interactions of the given kinds, oldest first
    async fn get_interacted_movies(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<MovieRecord>>;

    /// Deletes matching interactions, optionally for a single movie.
    /// Returns the number of removed records.
    async fn delete_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
        movie_id: Option<MovieId>,
    ) -> AppResult<u64>;

    async fn get_movie(&self, movie_id: &MovieId) -> AppResult<Option<MovieRecord>>;

    /// Single batched lookup; ids without a record are simply absent
    async fn get_movies_by_ids(&self, movie_ids: &[MovieId]) -> AppResult<Vec<MovieRecord>>;

    /// Inserts the record if it is new. Existing records are never updated.
    /// Returns whether a row was inserted.
    async fn upsert_movie(&self, movie: &MovieRecord) -> AppResult<bool>;
}
