use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinebot::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, Datastore, PgStore},
    services::{
        metadata::MAX_CONCURRENT_FETCHES,
        providers::{KinopoiskProvider, MetadataProvider, OmdbProvider, TitleLookup},
        title_resolver::MAX_CONCURRENT_LOOKUPS,
        Bot, MetadataFetcher, OpenAiClient, RecommendationOrchestrator, TitleResolver,
    },
    transport::HttpChatTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinebot=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    let store: Arc<dyn Datastore> = Arc::new(PgStore::new(pool));

    let http_client = reqwest::Client::new();

    let title_lookup = Arc::new(OmdbProvider::new(
        http_client.clone(),
        config.omdb_api_key.clone(),
        config.omdb_api_url.clone(),
    ));
    let metadata_provider = Arc::new(KinopoiskProvider::new(
        http_client.clone(),
        config.kinopoisk_api_key.clone(),
        config.kinopoisk_api_url.clone(),
    ));
    tracing::info!(
        title_lookup = title_lookup.name(),
        metadata = metadata_provider.name(),
        "Movie providers configured"
    );

    let mut resolver = TitleResolver::new(
        title_lookup,
        Arc::new(Semaphore::new(MAX_CONCURRENT_LOOKUPS)),
        config.title_cache_capacity,
    );

    // The writer task stops as soon as its handle is dropped, so keep it
    // alive until shutdown.
    let mut cache_writer = None;
    if let Some(redis_url) = &config.redis_url {
        let client = create_redis_client(redis_url).context("Failed to create Redis client")?;
        let (cache, handle) = Cache::new(client);
        resolver = resolver.with_shared_cache(cache);
        cache_writer = Some(handle);
        tracing::info!("Shared title cache enabled");
    }

    let fetcher = MetadataFetcher::new(
        metadata_provider,
        store.clone(),
        Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
    );

    let llm = Arc::new(OpenAiClient::new(
        http_client.clone(),
        config.openai_api_key.clone(),
        config.openai_api_url.clone(),
        config.openai_model.clone(),
    ));

    let orchestrator =
        RecommendationOrchestrator::new(store.clone(), llm, resolver, fetcher, config.llm_timeout());

    let transport = Arc::new(HttpChatTransport::new(
        http_client,
        config.transport_webhook_url.clone(),
    ));

    let bot = Arc::new(Bot::new(store, transport, orchestrator));
    let app = create_router(AppState::new(bot));

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(address = %listener.local_addr()?, "cinebot listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
