#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use cinebot::{
    db::{Datastore, InMemoryStore},
    error::{AppError, AppResult},
    models::{
        KinopoiskGenre, KinopoiskMovie, KinopoiskPoster, KinopoiskRating, MovieId,
        PreferenceProfile, UserId, QUESTIONS,
    },
    services::{
        metadata::FetchPolicy,
        providers::{MetadataProvider, TitleLookup},
        Bot, LlmClient, MetadataFetcher, PromptMessage, RecommendationOrchestrator,
        TitleResolver,
    },
    transport::{ChatEvent, ChatTransport, MessageContent, MessageRef},
};

/// Outbound message as seen by the fake chat platform
#[derive(Debug, Clone)]
pub enum Outbound {
    Sent(UserId, MessageContent),
    Edited(MessageRef, MessageContent),
}

impl Outbound {
    pub fn content(&self) -> &MessageContent {
        match self {
            Outbound::Sent(_, content) | Outbound::Edited(_, content) => content,
        }
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<Outbound>>,
    next_id: AtomicI64,
    delay: Option<Duration>,
    down: AtomicBool,
}

impl RecordingTransport {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Makes every send and edit fail until switched back
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<Outbound> {
        self.log.lock().unwrap().clone()
    }

    pub fn last(&self) -> MessageContent {
        self.log
            .lock()
            .unwrap()
            .last()
            .map(|o| o.content().clone())
            .expect("nothing was sent")
    }

    pub fn texts(&self) -> Vec<String> {
        self.log().iter().map(|o| o.content().text.clone()).collect()
    }

    async fn pause(&self) -> AppResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::Transport("down".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, user_id: UserId, content: MessageContent) -> AppResult<MessageRef> {
        self.pause().await?;
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(Outbound::Sent(user_id, content));
        Ok(MessageRef {
            user_id,
            message_id,
        })
    }

    async fn edit(&self, message: &MessageRef, content: MessageContent) -> AppResult<()> {
        self.pause().await?;
        self.log.lock().unwrap().push(Outbound::Edited(*message, content));
        Ok(())
    }
}

/// Answers from a queue, then falls back to a fixed reply
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str], fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User message of the `n`-th completion request
    pub fn user_prompt(&self, n: usize) -> String {
        self.prompts.lock().unwrap()[n][1].content.clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: Vec<PromptMessage>) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages);
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Maps a title to `tt-<lowercased title>`
pub struct SlugLookup;

pub fn slug(title: &str) -> MovieId {
    MovieId::new(format!("tt-{}", title.to_lowercase().replace(' ', "-")))
}

#[async_trait::async_trait]
impl TitleLookup for SlugLookup {
    async fn lookup_id(&self, title: &str) -> AppResult<Option<MovieId>> {
        Ok(Some(slug(title)))
    }

    fn name(&self) -> &'static str {
        "slug"
    }
}

/// Returns a valid document for any id, except those listed as unknown
#[derive(Default)]
pub struct FakeMetadata {
    unknown: Vec<MovieId>,
}

pub fn display_name(movie_id: &MovieId) -> String {
    format!("Movie {}", movie_id)
}

#[async_trait::async_trait]
impl MetadataProvider for FakeMetadata {
    async fn fetch_metadata(&self, movie_id: &MovieId) -> AppResult<Option<KinopoiskMovie>> {
        if self.unknown.contains(movie_id) {
            return Err(AppError::ExternalApi(format!("no data for {}", movie_id)));
        }
        Ok(Some(KinopoiskMovie {
            name: Some(display_name(movie_id)),
            short_description: Some("A story".to_string()),
            rating: Some(KinopoiskRating { kp: Some(7.4) }),
            poster: Some(KinopoiskPoster {
                url: Some(format!("https://posters.example/{}.jpg", movie_id)),
            }),
            year: Some(2004),
            genres: vec![KinopoiskGenre {
                name: "drama".to_string(),
            }],
            movie_length: Some(110),
            kind: Some("movie".to_string()),
            ..Default::default()
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct Harness {
    pub bot: Arc<Bot>,
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub llm: Arc<ScriptedLlm>,
}

impl Harness {
    pub fn new(llm: ScriptedLlm) -> Self {
        Self::with_transport(llm, RecordingTransport::default())
    }

    pub fn with_transport(llm: ScriptedLlm, transport: RecordingTransport) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(transport);
        let llm = Arc::new(llm);

        let resolver = TitleResolver::new(Arc::new(SlugLookup), Arc::new(Semaphore::new(5)), 100);
        let fetcher = MetadataFetcher::new(
            Arc::new(FakeMetadata::default()),
            store.clone(),
            Arc::new(Semaphore::new(5)),
        )
        .with_policy(FetchPolicy {
            attempt_timeout: Duration::from_secs(1),
            max_retries: 0,
            backoff: Duration::from_millis(1),
        });
        let orchestrator = RecommendationOrchestrator::new(
            store.clone(),
            llm.clone(),
            resolver,
            fetcher,
            Duration::from_secs(5),
        );
        let bot = Arc::new(Bot::new(store.clone(), transport.clone(), orchestrator));

        Self {
            bot,
            store,
            transport,
            llm,
        }
    }

    pub async fn with_profile(self, user_id: UserId) -> Self {
        let answers = QUESTIONS.iter().map(|_| "anything".to_string()).collect();
        self.store
            .upsert_preference_profile(&PreferenceProfile::new(user_id, answers))
            .await
            .unwrap();
        self
    }
}

pub fn callback(user_id: UserId, data: &str) -> ChatEvent {
    ChatEvent::Callback {
        user_id,
        data: data.to_string(),
        message_id: None,
    }
}

pub fn message(user_id: UserId, text: &str) -> ChatEvent {
    ChatEvent::Message {
        user_id,
        text: Some(text.to_string()),
    }
}

pub fn command(user_id: UserId, command: &str) -> ChatEvent {
    ChatEvent::Command {
        user_id,
        command: command.to_string(),
    }
}

/// `Movies = ["A", "B"]`
pub fn movies_reply(titles: &[&str]) -> String {
    let quoted: Vec<String> = titles.iter().map(|t| format!("\"{}\"", t)).collect();
    format!("Movies = [{}]", quoted.join(", "))
}
