use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod interaction;
pub mod user;

pub use interaction::{InteractionKind, InteractionRecord};
pub use user::{PreferenceProfile, User, UserId, QUESTIONS};

/// Separator used when genres are stored as a single text column
pub const GENRE_SEPARATOR: &str = ", ";

/// Canonical provider-assigned identifier (IMDb ID, e.g. "tt1375666")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub String);

impl MovieId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Movie,
    Series,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
        }
    }

    /// Maps a provider type tag, falling back to `Movie` for anything unknown
    pub fn from_provider(tag: Option<&str>) -> Self {
        match tag {
            Some("tv-series") | Some("animated-series") | Some("series") => ContentType::Series,
            _ => ContentType::Movie,
        }
    }
}

/// Movie metadata cached in the local store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecord {
    pub id: MovieId,
    pub name: String,
    pub description: String,
    /// Provider scale, 0 to 10
    pub rating: f64,
    pub poster_url: Option<String>,
    pub year: i32,
    pub genres: Vec<String>,
    /// Minutes, 0 when unknown
    pub duration_minutes: i32,
    pub content_type: ContentType,
}

impl MovieRecord {
    pub fn genres_text(&self) -> String {
        self.genres.join(GENRE_SEPARATOR)
    }

    pub fn parse_genres(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A movie in a recommendation batch
///
/// `Cached` entries are known to exist in the local store. `Transient`
/// entries were fetched and validated but could not be persisted; they are
/// written back before an interaction is recorded against them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", content = "movie", rename_all = "snake_case")]
pub enum MovieEntry {
    Cached(MovieRecord),
    Transient(MovieRecord),
}

impl MovieEntry {
    pub fn record(&self) -> &MovieRecord {
        match self {
            MovieEntry::Cached(record) | MovieEntry::Transient(record) => record,
        }
    }

    pub fn into_record(self) -> MovieRecord {
        match self {
            MovieEntry::Cached(record) | MovieEntry::Transient(record) => record,
        }
    }

    pub fn id(&self) -> &MovieId {
        &self.record().id
    }

    pub fn name(&self) -> &str {
        &self.record().name
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, MovieEntry::Cached(_))
    }
}

// ============================================================================
// OMDb API Types
// ============================================================================

/// Response from OMDb `?t=<title>` lookups
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbTitleResponse {
    #[serde(rename = "Response", default)]
    pub response: String,
    #[serde(rename = "imdbID", default)]
    pub imdb_id: Option<String>,
}

impl OmdbTitleResponse {
    pub fn into_movie_id(self) -> Option<MovieId> {
        if self.response != "True" {
            return None;
        }
        self.imdb_id
            .filter(|id| !id.trim().is_empty())
            .map(MovieId::new)
    }
}

// ============================================================================
// Kinopoisk API Types
// ============================================================================

/// Response from `GET /v1.4/movie?externalId.imdb=<id>`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct KinopoiskSearchResponse {
    #[serde(default)]
    pub docs: Vec<KinopoiskMovie>,
}

/// A single Kinopoisk document. Every field is optional; validation happens
/// in the metadata fetcher.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KinopoiskMovie {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rating: Option<KinopoiskRating>,
    #[serde(default)]
    pub poster: Option<KinopoiskPoster>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<KinopoiskGenre>,
    #[serde(default)]
    pub movie_length: Option<i32>,
    #[serde(default)]
    pub series_length: Option<i32>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct KinopoiskRating {
    #[serde(default)]
    pub kp: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct KinopoiskPoster {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct KinopoiskGenre {
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MovieRecord {
        MovieRecord {
            id: MovieId::new("tt1375666"),
            name: "Inception".to_string(),
            description: "A thief who steals corporate secrets".to_string(),
            rating: 8.7,
            poster_url: Some("https://image.example/inception.jpg".to_string()),
            year: 2010,
            genres: vec!["sci-fi".to_string(), "thriller".to_string()],
            duration_minutes: 148,
            content_type: ContentType::Movie,
        }
    }

    #[test]
    fn test_movie_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&MovieId::new("tt1375666")).unwrap();
        assert_eq!(json, r#""tt1375666""#);
    }

    #[test]
    fn test_genres_text_and_parse() {
        let movie = record();
        assert_eq!(movie.genres_text(), "sci-fi, thriller");
        assert_eq!(
            MovieRecord::parse_genres("drama,  crime , "),
            vec!["drama".to_string(), "crime".to_string()]
        );
        assert!(MovieRecord::parse_genres("").is_empty());
    }

    #[test]
    fn test_content_type_from_provider() {
        assert_eq!(ContentType::from_provider(Some("tv-series")), ContentType::Series);
        assert_eq!(ContentType::from_provider(Some("movie")), ContentType::Movie);
        assert_eq!(ContentType::from_provider(Some("cartoon")), ContentType::Movie);
        assert_eq!(ContentType::from_provider(None), ContentType::Movie);
    }

    #[test]
    fn test_movie_entry_accessors() {
        let cached = MovieEntry::Cached(record());
        let transient = MovieEntry::Transient(record());

        assert_eq!(cached.id(), transient.id());
        assert_eq!(cached.name(), "Inception");
        assert!(cached.is_cached());
        assert!(!transient.is_cached());
        assert_eq!(transient.into_record(), record());
    }

    #[test]
    fn test_omdb_response_found() {
        let json = r#"{"Title":"Inception","imdbID":"tt1375666","Response":"True"}"#;
        let response: OmdbTitleResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_movie_id(), Some(MovieId::new("tt1375666")));
    }

    #[test]
    fn test_omdb_response_not_found() {
        let json = r#"{"Response":"False","Error":"Movie not found!"}"#;
        let response: OmdbTitleResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_movie_id(), None);
    }

    #[test]
    fn test_kinopoisk_doc_tolerates_missing_fields() {
        let json = r#"{"docs":[{"name":"Начало","rating":{"kp":8.665},"genres":[{"name":"фантастика"}]}]}"#;
        let response: KinopoiskSearchResponse = serde_json::from_str(json).unwrap();
        let doc = &response.docs[0];
        assert_eq!(doc.name.as_deref(), Some("Начало"));
        assert_eq!(doc.rating.as_ref().and_then(|r| r.kp), Some(8.665));
        assert_eq!(doc.poster, None);
        assert_eq!(doc.movie_length, None);
        assert_eq!(doc.genres[0].name, "фантастика");
    }
}
