/// Kinopoisk metadata provider
///
/// Looks movies up by their IMDb ID:
/// `GET /v1.4/movie?externalId.imdb=<id>` with the token in `X-API-KEY`.
/// The response is a search envelope; only the first document is used.
use crate::{
    error::{AppError, AppResult},
    models::{KinopoiskMovie, KinopoiskSearchResponse, MovieId},
    services::providers::MetadataProvider,
};
use reqwest::Client as HttpClient;

#[derive(Clone)]
pub struct KinopoiskProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl KinopoiskProvider {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
        }
    }

    /// Parses the raw body. Kept separate so malformed payloads surface as
    /// provider errors with the offending body logged.
    fn parse_body(movie_id: &MovieId, body: &str) -> AppResult<Option<KinopoiskMovie>> {
        let parsed: KinopoiskSearchResponse = serde_json::from_str(body).map_err(|e| {
            tracing::error!(
                movie_id = %movie_id,
                error = %e,
                response = %body,
                "Failed to deserialize Kinopoisk response"
            );
            AppError::ExternalApi(format!("Failed to parse Kinopoisk response: {}", e))
        })?;

        Ok(parsed.docs.into_iter().next())
    }
}

#[async_trait::async_trait]
impl MetadataProvider for KinopoiskProvider {
    async fn fetch_metadata(&self, movie_id: &MovieId) -> AppResult<Option<KinopoiskMovie>> {
        let url = format!("{}/v1.4/movie", self.api_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[("externalId.imdb", movie_id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Kinopoisk API returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let doc = Self::parse_body(movie_id, &body)?;

        tracing::debug!(
            movie_id = %movie_id,
            found = doc.is_some(),
            provider = "kinopoisk",
            "Metadata fetched"
        );

        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "kinopoisk"
    }
}
