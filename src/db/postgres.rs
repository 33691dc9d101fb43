use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};

use crate::{
    db::Datastore,
    error::{AppError, AppResult},
    models::{
        ContentType, InteractionKind, InteractionRecord, MovieId, MovieRecord, PreferenceProfile,
        User, UserId,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const MOVIE_COLUMNS: &str =
    "m.imdb_id, m.name, m.description, m.rating, m.poster_url, m.year, m.genres, m.duration_minutes, m.content_type";

/// Postgres-backed [`Datastore`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn kinds_param(kinds: &[InteractionKind]) -> Vec<String> {
        kinds.iter().map(|k| k.as_str().to_string()).collect()
    }

    fn movie_from_row(row: &PgRow) -> AppResult<MovieRecord> {
        let content_type: String = row.try_get("content_type")?;
        let genres: String = row.try_get("genres")?;

        Ok(MovieRecord {
            id: MovieId::new(row.try_get::<String, _>("imdb_id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            rating: row.try_get("rating")?,
            poster_url: row.try_get("poster_url")?,
            year: row.try_get("year")?,
            genres: MovieRecord::parse_genres(&genres),
            duration_minutes: row.try_get("duration_minutes")?,
            content_type: ContentType::from_provider(Some(content_type.as_str())),
        })
    }

    fn user_from_row(row: &PgRow) -> AppResult<User> {
        Ok(User {
            id: UserId(row.try_get("user_id")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            last_seen_at: row.try_get::<DateTime<Utc>, _>("last_seen_at")?,
        })
    }
}

#[async_trait::async_trait]
impl Datastore for PgStore {
    async fn get_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT user_id, created_at, last_seen_at FROM users WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn upsert_user(&self, user_id: UserId) -> AppResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (user_id, created_at, last_seen_at)
            VALUES ($1, now(), now())
            ON CONFLICT (user_id) DO UPDATE SET last_seen_at = now()
            RETURNING user_id, created_at, last_seen_at
            "#,
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;

        Self::user_from_row(&row)
    }

    async fn get_preference_profile(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<PreferenceProfile>> {
        let row = sqlx::query("SELECT answers FROM preference_profiles WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let answers: Vec<String> = row.try_get("answers")?;
                Ok(Some(PreferenceProfile::new(user_id, answers)))
            }
            None => Ok(None),
        }
    }

    async fn upsert_preference_profile(&self, profile: &PreferenceProfile) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, created_at, last_seen_at)
            VALUES ($1, now(), now())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(profile.user_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO preference_profiles (user_id, completed, answers)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET completed = EXCLUDED.completed, answers = EXCLUDED.answers
            "#,
        )
        .bind(profile.user_id.0)
        .bind(profile.has_completed_questionnaire())
        .bind(&profile.answers)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reset_preference_profile(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query("DELETE FROM preference_profiles WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
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
        if movie_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        // Sequence values are drawn in slice order, which preserves batch order
        for movie_id in movie_ids {
            sqlx::query(
                r#"
                INSERT INTO user_interactions (user_id, movie_id, kind, seq)
                VALUES ($1, $2, $3, nextval('interaction_seq'))
                ON CONFLICT (user_id, movie_id) DO UPDATE
                SET kind = EXCLUDED.kind, seq = EXCLUDED.seq
                "#,
            )
            .bind(user_id.0)
            .bind(movie_id.as_str())
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            user_id = %user_id,
            kind = %kind,
            count = movie_ids.len(),
            "Interactions recorded"
        );

        Ok(())
    }

    async fn get_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<InteractionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT movie_id, kind, seq
            FROM user_interactions
            WHERE user_id = $1 AND kind = ANY($2)
            ORDER BY seq
            "#,
        )
        .bind(user_id.0)
        .bind(Self::kinds_param(kinds))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(InteractionRecord {
                    user_id,
                    movie_id: MovieId::new(row.try_get::<String, _>("movie_id")?),
                    kind: kind.parse::<InteractionKind>().map_err(AppError::Internal)?,
                    seq: row.try_get("seq")?,
                })
            })
            .collect()
    }

    async fn get_interacted_movies(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
    ) -> AppResult<Vec<MovieRecord>> {
        let query = format!(
            r#"
            SELECT {}
            FROM movies m
            JOIN user_interactions i ON i.movie_id = m.imdb_id
            WHERE i.user_id = $1 AND i.kind = ANY($2)
            ORDER BY i.seq
            "#,
            MOVIE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(user_id.0)
            .bind(Self::kinds_param(kinds))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::movie_from_row).collect()
    }

    async fn delete_interactions(
        &self,
        user_id: UserId,
        kinds: &[InteractionKind],
        movie_id: Option<MovieId>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_interactions
            WHERE user_id = $1
              AND kind = ANY($2)
              AND ($3::TEXT IS NULL OR movie_id = $3)
            "#,
        )
        .bind(user_id.0)
        .bind(Self::kinds_param(kinds))
        .bind(movie_id.as_ref().map(MovieId::as_str))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_movie(&self, movie_id: &MovieId) -> AppResult<Option<MovieRecord>> {
        let query = format!("SELECT {} FROM movies m WHERE m.imdb_id = $1", MOVIE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(movie_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::movie_from_row).transpose()
    }

    async fn get_movies_by_ids(&self, movie_ids: &[MovieId]) -> AppResult<Vec<MovieRecord>> {
        if movie_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = movie_ids.iter().map(|id| id.0.clone()).collect();
        let query = format!("SELECT {} FROM movies m WHERE m.imdb_id = ANY($1)", MOVIE_COLUMNS);

        let rows = sqlx::query(&query)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::movie_from_row).collect()
    }

    async fn upsert_movie(&self, movie: &MovieRecord) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO movies
                (imdb_id, name, description, rating, poster_url, year, genres, duration_minutes, content_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (imdb_id) DO NOTHING
            "#,
        )
        .bind(movie.id.as_str())
        .bind(&movie.name)
        .bind(&movie.description)
        .bind(movie.rating)
        .bind(&movie.poster_url)
        .bind(movie.year)
        .bind(movie.genres_text())
        .bind(movie.duration_minutes)
        .bind(movie.content_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
