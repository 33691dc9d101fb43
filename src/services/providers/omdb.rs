/// OMDb title lookup
///
/// Resolves a free-text title to an IMDb ID with `GET /?t=<title>&apikey=<key>`.
/// OMDb answers 200 even for misses and signals them with `"Response": "False"`.
use crate::{
    error::{AppError, AppResult},
    models::{MovieId, OmdbTitleResponse},
    services::providers::TitleLookup,
};
use reqwest::Client as HttpClient;

#[derive(Clone)]
pub struct OmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl OmdbProvider {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
        }
    }
}

#[async_trait::async_trait]
impl TitleLookup for OmdbProvider {
    async fn lookup_id(&self, title: &str) -> AppResult<Option<MovieId>> {
        if title.trim().is_empty() {
            return Ok(None);
        }

        let response = self
            .http_client
            .get(format!("{}/", self.api_url.trim_end_matches('/')))
            .query(&[("t", title), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "OMDb API returned status {}: {}",
                status, body
            )));
        }

        let body: OmdbTitleResponse = response.json().await?;
        let movie_id = body.into_movie_id();

        tracing::debug!(
            title = %title,
            found = movie_id.is_some(),
            provider = "omdb",
            "Title lookup completed"
        );

        Ok(movie_id)
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}
