use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    db::Datastore,
    error::{AppError, AppResult},
    models::{InteractionKind, InteractionRecord, MovieId, MovieRecord, PreferenceProfile, User, UserId},
};

/// In-process [`Datastore`] used by tests and local runs without Postgres
///
/// Writes can be forced to fail with [`InMemoryStore::fail_writes`], in which
/// case nothing is modified.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    profiles: HashMap<UserId, PreferenceProfile>,
    interactions: HashMap<(UserId, MovieId), (InteractionKind, i64)>,
    movies: HashMap<MovieId, MovieRecord>,
    next_seq: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail until reset
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn sorted_interactions(
        inner: &Inner,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> Vec<InteractionRecord> {
        let mut records: Vec<InteractionRecord> = inner
            .interactions
            .iter()
            .filter(|((uid, _), (kind, _))| *uid == user_id && kinds.contains(kind))
            .map(|((uid, movie_id), (kind, seq))| InteractionRecord {
                user_id: *uid,
                movie_id: movie_id.clone(),
                kind: *kind,
                seq: *seq,
            })
            .collect();
        records.sort_by_key(|r| r.seq);
        records
    }
}

#[async_trait::async_trait]
impl Datastore for InMemoryStore {
    async fn get_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&user_id).cloned())
    }

    async fn upsert_user(&self, user_id: UserId) -> AppResult<User> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .entry(user_id)
            .and_modify(|u| u.last_seen_at = Utc::now())
            .or_insert_with(|| User::new(user_id));
        Ok(user.clone())
    }

    async fn get_preference_profile(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<PreferenceProfile>> {
        Ok(self.inner.lock().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_preference_profile(&self, profile: &PreferenceProfile) -> AppResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        inner
            .users
            .entry(profile.user_id)
            .or_insert_with(|| User::new(profile.user_id));
        inner.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn reset_preference_profile(&self, user_id: UserId) -> AppResult<()> {
        self.check_writable()?;
        self.inner.lock().await.profiles.remove(&user_id);
        Ok(())
    }

    async fn upsert_interaction(
        &self,
        user_id: UserId,
        movie_id: &MovieId,
        kind: InteractionKind,
    ) -> AppResult<()> {
        self.upsert_interactions(user_id, std::slice::from_ref(movie_id), kind)
            .await
    }

    async fn upsert_interactions(
        &self,
        user_id: UserId,
        movie_ids: &[MovieId],
        kind: InteractionKind,
    ) -> AppResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;

        if let Some(missing) = movie_ids.iter().find(|id| !inner.movies.contains_key(*id)) {
            return Err(AppError::NotFound(format!("movie {} is not cached", missing)));
        }

        for movie_id in movie_ids {
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner
                .interactions
                .insert((user_id, movie_id.clone()), (kind, seq));
        }
        Ok(())
    }

    async fn get_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<InteractionRecord>> {
        let inner = self.inner.lock().await;
        Ok(Self::sorted_interactions(&inner, user_id, kinds))
    }

    async fn get_interacted_movies(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<MovieRecord>> {
        let inner = self.inner.lock().await;
        Ok(Self::sorted_interactions(&inner, user_id, kinds)
            .into_iter()
            .filter_map(|r| inner.movies.get(&r.movie_id).cloned())
            .collect())
    }

    async fn delete_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
        movie_id: Option<MovieId>,
    ) -> AppResult<u64> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        let before = inner.interactions.len();
        inner.interactions.retain(|(uid, mid), (kind, _)| {
            let matches = *uid == user_id
                && kinds.contains(kind)
                && movie_id.as_ref().map_or(true, |target| target == mid);
            !matches
        });
        Ok((before - inner.interactions.len()) as u64)
    }

    async fn get_movie(&self, movie_id: &MovieId) -> AppResult<Option<MovieRecord>> {
        Ok(self.inner.lock().await.movies.get(movie_id).cloned())
    }

    async fn get_movies_by_ids(&self, movie_ids: &[MovieId]) -> AppResult<Vec<MovieRecord>> {
        let inner = self.inner.lock().await;
        Ok(movie_ids
            .iter()
            .filter_map(|id| inner.movies.get(id).cloned())
            .collect())
    }

    async fn upsert_movie(&self, movie: &MovieRecord) -> AppResult<bool> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        if inner.movies.contains_key(&movie.id) {
            return Ok(false);
        }
        inner.movies.insert(movie.id.clone(), movie.clone());
        Ok(true)
    }
}
