/// External movie data providers
///
/// Two lookups back the recommendation pipeline: free-text title to canonical
/// IMDb ID (OMDb), and IMDb ID to rich metadata (Kinopoisk). Both are
/// abstracted so the resolver and fetcher can be exercised without network.
use crate::{
    error::AppResult,
    models::{KinopoiskMovie, MovieId},
};

pub mod kinopoisk;
pub mod omdb;

pub use kinopoisk::KinopoiskProvider;
pub use omdb::OmdbProvider;

/// Title to canonical identifier lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TitleLookup: Send + Sync {
    /// Returns `Ok(None)` when the provider has no match for the title
    async fn lookup_id(&self, title: &str) -> AppResult<Option<MovieId>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Metadata lookup by canonical identifier
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Returns the provider's first document for the ID, `Ok(None)` if it has none.
    /// The document is not validated here.
    async fn fetch_metadata(&self, movie_id: &MovieId) -> AppResult<Option<KinopoiskMovie>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
