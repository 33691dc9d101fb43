/// Conversation handling
///
/// [`Bot::handle_event`] is the single entry point for inbound chat updates.
/// Each user gets one [`SessionState`] behind an async mutex. Card actions
/// only `try_lock` it, so a double tap while a refill is running is dropped
/// rather than applied twice; everything else waits its turn.
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    db::Datastore,
    error::{AppError, AppResult},
    models::{InteractionKind, MovieEntry, MovieId, MovieRecord, PreferenceProfile, UserId},
    services::{
        recommendations::{RecommendationMode, RecommendationOrchestrator},
        session::{
            Advance, BatchOrigin, QuestionnaireProgress, RecommendationBatch, SessionPhase,
            SessionState,
        },
    },
    transport::{ChatEvent, ChatTransport, MessageContent, MessageRef},
};

pub mod callbacks;
pub mod views;

pub use callbacks::{CardAction, Callback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Handled,
    /// Another card action for the same user was still running
    Busy,
    /// Stale or unrecognised input; nothing changed
    Ignored,
    /// A write failed; the user was notified and the session kept its previous state
    SaveFailed,
    /// The session was unusable and has been reset to idle
    SessionReset,
}

/// Inbound event with callback data already decoded
enum Input {
    Command(String),
    Text(Option<String>),
    Callback {
        callback: Callback,
        message_id: Option<i64>,
    },
}

pub struct Bot {
    store: Arc<dyn Datastore>,
    transport: Arc<dyn ChatTransport>,
    orchestrator: RecommendationOrchestrator,
    sessions: StdMutex<HashMap<UserId, Arc<Mutex<SessionState>>>>,
}

impl Bot {
    pub fn new(
        store: Arc<dyn Datastore>,
        transport: Arc<dyn ChatTransport>,
        orchestrator: RecommendationOrchestrator,
    ) -> Self {
        Self {
            store,
            transport,
            orchestrator,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    fn session(&self, user_id: UserId) -> Arc<Mutex<SessionState>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.entry(user_id).or_default().clone()
    }

    /// Copy of the user's current session, waiting for any in-flight event
    pub async fn session_state(&self, user_id: UserId) -> SessionState {
        self.session(user_id).lock().await.clone()
    }

    pub async fn handle_event(&self, event: ChatEvent) -> AppResult<EventOutcome> {
        let user_id = event.user_id();
        tracing::debug!(user_id = %user_id, kind = event.kind(), "Handling chat event");

        let input = match event {
            ChatEvent::Command { command, .. } => Input::Command(command),
            ChatEvent::Message { text, .. } => Input::Text(text),
            ChatEvent::Callback {
                data, message_id, ..
            } => match data.parse::<Callback>() {
                Ok(callback) => Input::Callback {
                    callback,
                    message_id,
                },
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Ignoring callback");
                    return Ok(EventOutcome::Ignored);
                }
            },
        };

        let session = self.session(user_id);
        let mut guard = match &input {
            Input::Callback { callback, .. } if callback.is_card_action() => {
                match session.try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        tracing::info!(user_id = %user_id, "Card action dropped, another is in flight");
                        return Ok(EventOutcome::Busy);
                    }
                }
            }
            _ => session.lock_owned().await,
        };

        let mut next = guard.clone();
        match self.dispatch(user_id, input, &mut next).await {
            Ok(outcome) => {
                *guard = next;
                Ok(outcome)
            }
            Err(e) => self.recover(user_id, &mut guard, e).await,
        }
    }

    async fn recover(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        error: AppError,
    ) -> AppResult<EventOutcome> {
        match error {
            AppError::InvalidSession(reason) => {
                tracing::warn!(user_id = %user_id, reason = %reason, "Resetting session");
                state.reset();
                self.notify(user_id, views::with_menu(views::SESSION_RESET)).await;
                Ok(EventOutcome::SessionReset)
            }
            e if e.is_storage() => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to save user action");
                self.notify(user_id, MessageContent::text(views::SAVE_FAILED)).await;
                Ok(EventOutcome::SaveFailed)
            }
            e => Err(e),
        }
    }

    /// Best-effort message used on error paths
    async fn notify(&self, user_id: UserId, content: MessageContent) {
        if let Err(e) = self.transport.send(user_id, content).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to notify user");
        }
    }

    async fn send(&self, user_id: UserId, content: MessageContent) -> AppResult<MessageRef> {
        self.transport.send(user_id, content).await
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        input: Input,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        match input {
            Input::Command(command) => self.on_command(user_id, &command, state).await,
            Input::Text(text) => self.on_text(user_id, text, state).await,
            Input::Callback {
                callback,
                message_id,
            } => self.on_callback(user_id, callback, message_id, state).await,
        }
    }

    async fn on_command(
        &self,
        user_id: UserId,
        command: &str,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        match command.trim_start_matches('/') {
            "start" => {
                let user = self.store.upsert_user(user_id).await?;
                tracing::info!(user_id = %user_id, created_at = %user.created_at, "User started the bot");
                state.reset();
                self.send(user_id, views::with_menu(views::WELCOME)).await?;
                Ok(EventOutcome::Handled)
            }
            "menu" => {
                self.send(user_id, views::with_menu(views::MENU_PROMPT)).await?;
                Ok(EventOutcome::Handled)
            }
            other => {
                tracing::debug!(user_id = %user_id, command = %other, "Unknown command");
                self.send(user_id, views::with_menu(views::UNKNOWN_INPUT)).await?;
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn on_text(
        &self,
        user_id: UserId,
        text: Option<String>,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        match state.phase {
            SessionPhase::Questionnaire { .. } => self.on_answer(user_id, text, state).await,
            SessionPhase::AwaitingSearchQuery => self.on_search_query(user_id, text, state).await,
            _ => {
                self.send(user_id, views::with_menu(views::UNKNOWN_INPUT)).await?;
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn on_answer(
        &self,
        user_id: UserId,
        text: Option<String>,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        let Some(text) = text else {
            self.send(user_id, MessageContent::text(views::ANSWER_WITH_TEXT)).await?;
            return Ok(EventOutcome::Handled);
        };

        if text.eq_ignore_ascii_case(views::BACK_WORD) {
            return self.questionnaire_back(user_id, state).await;
        }
        if text.eq_ignore_ascii_case(views::CANCEL_WORD) {
            return self.questionnaire_cancel(user_id, state).await;
        }

        match state.answer(&text)? {
            QuestionnaireProgress::Next(step) => {
                self.send(user_id, views::question(step)).await?;
                Ok(EventOutcome::Handled)
            }
            QuestionnaireProgress::Completed(answers) => {
                let profile = PreferenceProfile::new(user_id, answers);
                self.store.upsert_preference_profile(&profile).await?;
                tracing::info!(
                    user_id = %user_id,
                    completed = profile.has_completed_questionnaire(),
                    "Questionnaire saved"
                );

                state.preferences_priority = true;
                self.send(user_id, MessageContent::text(views::QUESTIONNAIRE_DONE))
                    .await?;
                self.start_recommendations(user_id, state).await
            }
        }
    }

    async fn questionnaire_back(
        &self,
        user_id: UserId,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        let content = match state.back()? {
            Some(step) => views::question(step),
            None => MessageContent::text(views::NO_PREVIOUS_STEP),
        };
        self.send(user_id, content).await?;
        Ok(EventOutcome::Handled)
    }

    async fn questionnaire_cancel(
        &self,
        user_id: UserId,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        if !state.is_in_questionnaire() {
            return Ok(EventOutcome::Ignored);
        }
        state.reset();
        self.send(user_id, views::with_menu(views::QUESTIONNAIRE_CANCELLED))
            .await?;
        Ok(EventOutcome::Handled)
    }

    async fn on_search_query(
        &self,
        user_id: UserId,
        text: Option<String>,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        let Some(query) = text else {
            self.send(user_id, MessageContent::text(views::ANSWER_WITH_TEXT)).await?;
            return Ok(EventOutcome::Handled);
        };

        let recommendation = self
            .orchestrator
            .recommend_with_retry(user_id, &RecommendationMode::Search(query))
            .await?;

        if recommendation.is_empty() {
            state.reset();
            self.send(user_id, views::with_menu(views::RECOMMENDATIONS_FAILED))
                .await?;
            return Ok(EventOutcome::Handled);
        }

        state.card_message = None;
        state.begin_browsing(RecommendationBatch::new(
            recommendation.movies,
            BatchOrigin::Search,
        ));
        self.show_card(user_id, state).await
    }

    async fn on_callback(
        &self,
        user_id: UserId,
        callback: Callback,
        message_id: Option<i64>,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        match callback {
            Callback::MainMenu => {
                self.send(user_id, views::with_menu(views::MENU_PROMPT)).await?;
                Ok(EventOutcome::Handled)
            }
            Callback::Profile => {
                let configured = self
                    .store
                    .get_preference_profile(user_id)
                    .await?
                    .is_some_and(|p| p.has_completed_questionnaire());
                self.send(user_id, views::profile(user_id, configured)).await?;
                Ok(EventOutcome::Handled)
            }
            Callback::RedoQuestionnaire => {
                self.store.reset_preference_profile(user_id).await?;
                state.start_questionnaire();
                self.send(user_id, MessageContent::text(views::QUESTIONNAIRE_INTRO))
                    .await?;
                self.send(user_id, views::question(0)).await?;
                Ok(EventOutcome::Handled)
            }
            Callback::Favourites { page } => {
                let movies = self
                    .store
                    .get_interacted_movies(user_id, &[InteractionKind::Liked])
                    .await?;
                let content = views::favourites(&movies, page);
                let message = message_id.map(|message_id| MessageRef {
                    user_id,
                    message_id,
                });
                self.replace_or_send(user_id, message, content).await?;
                Ok(EventOutcome::Handled)
            }
            Callback::Recommendations => self.start_recommendations(user_id, state).await,
            Callback::Search => {
                state.await_search_query();
                self.send(user_id, MessageContent::text(views::SEARCH_PROMPT))
                    .await?;
                Ok(EventOutcome::Handled)
            }
            Callback::QuestionnaireBack => self.questionnaire_back(user_id, state).await,
            Callback::QuestionnaireCancel => self.questionnaire_cancel(user_id, state).await,
            Callback::Card { action, index } => self.on_card(user_id, action, index, state).await,
            Callback::Rate { index, score } => self.on_rate(user_id, index, score, state).await,
        }
    }

    async fn on_card(
        &self,
        user_id: UserId,
        action: CardAction,
        index: usize,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        if state.is_in_questionnaire() {
            tracing::debug!(user_id = %user_id, index, "Card action during questionnaire");
            return Ok(EventOutcome::Ignored);
        }
        let Some(entry) = state.card_at(index)?.cloned() else {
            tracing::debug!(user_id = %user_id, index, "Stale card action");
            return Ok(EventOutcome::Ignored);
        };
        if !state.is_browsing() {
            return Ok(EventOutcome::Ignored);
        }

        match action {
            CardAction::Next => {
                self.record(user_id, &entry, InteractionKind::Skipped).await?;
                self.advance(user_id, state).await
            }
            CardAction::Like => {
                self.record(user_id, &entry, InteractionKind::Liked).await?;
                self.advance(user_id, state).await
            }
            CardAction::Watched => {
                state.await_rating();
                self.present(user_id, state, views::rating_prompt(&entry, index))
                    .await?;
                Ok(EventOutcome::Handled)
            }
            CardAction::Stop => self.stop(user_id, state).await,
        }
    }

    async fn on_rate(
        &self,
        user_id: UserId,
        index: usize,
        score: u8,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        if !state.is_awaiting_rating() {
            return Ok(EventOutcome::Ignored);
        }
        let Some(entry) = state.card_at(index)?.cloned() else {
            return Ok(EventOutcome::Ignored);
        };
        let Some(kind) = InteractionKind::from_rating(score) else {
            return Ok(EventOutcome::Ignored);
        };

        self.record(user_id, &entry, kind).await?;
        self.advance(user_id, state).await
    }

    /// Persists the interaction, writing back a transient movie first
    async fn record(&self, user_id: UserId, entry: &MovieEntry, kind: InteractionKind) -> AppResult<()> {
        if let MovieEntry::Transient(movie) = entry {
            self.store.upsert_movie(movie).await?;
        }
        self.store
            .upsert_interaction(user_id, entry.id(), kind)
            .await?;

        tracing::info!(user_id = %user_id, movie_id = %entry.id(), kind = %kind, "Interaction recorded");
        Ok(())
    }

    async fn advance(&self, user_id: UserId, state: &mut SessionState) -> AppResult<EventOutcome> {
        match state.advance()? {
            Advance::NextCard(_) => self.show_card(user_id, state).await,
            Advance::Exhausted(BatchOrigin::Recommendation) => self.refill(user_id, state).await,
            Advance::Exhausted(BatchOrigin::Search) => {
                state.reset();
                self.send(user_id, views::with_menu(views::SEARCH_DONE)).await?;
                Ok(EventOutcome::Handled)
            }
        }
    }

    /// Marks everything not yet rated as unwatched, in one write
    async fn stop(&self, user_id: UserId, state: &mut SessionState) -> AppResult<EventOutcome> {
        let transient: Vec<MovieRecord> = state
            .batch
            .iter()
            .flat_map(|batch| batch.movies.iter().skip(batch.cursor))
            .filter(|entry| !entry.is_cached())
            .map(|entry| entry.record().clone())
            .collect();
        for movie in &transient {
            self.store.upsert_movie(movie).await?;
        }

        let unseen = state.stop();
        if !unseen.is_empty() {
            self.store
                .upsert_interactions(user_id, &unseen, InteractionKind::Unwatched)
                .await?;
        }

        tracing::info!(user_id = %user_id, unwatched = unseen.len(), "Recommendations stopped");
        self.send(user_id, views::with_menu(views::STOPPED)).await?;
        Ok(EventOutcome::Handled)
    }

    /// Questionnaire first, then leftovers from a stopped session, then fresh picks
    async fn start_recommendations(
        &self,
        user_id: UserId,
        state: &mut SessionState,
    ) -> AppResult<EventOutcome> {
        let completed = self
            .store
            .get_preference_profile(user_id)
            .await?
            .is_some_and(|p| p.has_completed_questionnaire());

        if !completed {
            state.start_questionnaire();
            self.send(user_id, MessageContent::text(views::QUESTIONNAIRE_INTRO))
                .await?;
            self.send(user_id, views::question(0)).await?;
            return Ok(EventOutcome::Handled);
        }

        state.card_message = None;

        let resurfaced = self.unwatched_movies(user_id).await?;
        if !resurfaced.is_empty() {
            tracing::info!(user_id = %user_id, count = resurfaced.len(), "Resurfacing unwatched movies");
            state.begin_browsing(RecommendationBatch::new(
                resurfaced,
                BatchOrigin::Recommendation,
            ));
            let outcome = self.show_card(user_id, state).await?;

            // markers stay until the first resurfaced card reached the user
            self.store
                .delete_interactions(user_id, &[InteractionKind::Unwatched], None)
                .await?;
            return Ok(outcome);
        }

        self.refill(user_id, state).await
    }

    /// Movies behind the unwatched markers, in the order they were left
    ///
    /// Markers whose movies are all gone from the store are cleared here,
    /// since there is nothing left to resurface.
    async fn unwatched_movies(&self, user_id: UserId) -> AppResult<Vec<MovieEntry>> {
        let markers = self
            .store
            .get_interactions(user_id, &[InteractionKind::Unwatched])
            .await?;
        if markers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MovieId> = markers.into_iter().map(|r| r.movie_id).collect();
        let mut movies: HashMap<MovieId, MovieRecord> = self
            .store
            .get_movies_by_ids(&ids)
            .await?
            .into_iter()
            .map(|movie| (movie.id.clone(), movie))
            .collect();

        let entries: Vec<MovieEntry> = ids
            .iter()
            .filter_map(|id| movies.remove(id))
            .map(MovieEntry::Cached)
            .collect();

        if entries.is_empty() {
            self.store
                .delete_interactions(user_id, &[InteractionKind::Unwatched], None)
                .await?;
        }
        Ok(entries)
    }

    async fn refill(&self, user_id: UserId, state: &mut SessionState) -> AppResult<EventOutcome> {
        let mode = RecommendationMode::Auto {
            preferences_priority: state.preferences_priority,
        };
        let recommendation = self.orchestrator.recommend_with_retry(user_id, &mode).await?;

        if recommendation.is_empty() {
            state.reset();
            self.send(user_id, views::with_menu(views::RECOMMENDATIONS_FAILED))
                .await?;
            return Ok(EventOutcome::Handled);
        }

        state.preferences_priority = false;
        state.begin_browsing(RecommendationBatch::new(
            recommendation.movies,
            BatchOrigin::Recommendation,
        ));
        self.show_card(user_id, state).await
    }

    async fn show_card(&self, user_id: UserId, state: &mut SessionState) -> AppResult<EventOutcome> {
        let content = {
            let batch = state
                .batch
                .as_ref()
                .ok_or_else(|| AppError::InvalidSession("no active batch".to_string()))?;
            let entry = batch.current().ok_or_else(|| {
                AppError::InvalidSession(format!("cursor {} out of range", batch.cursor))
            })?;
            views::movie_card(entry, batch.cursor)
        };

        self.present(user_id, state, content).await?;
        Ok(EventOutcome::Handled)
    }

    /// Edits the card message in place, or sends a new one
    async fn present(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        content: MessageContent,
    ) -> AppResult<()> {
        let message = self
            .replace_or_send(user_id, state.card_message, content)
            .await?;
        state.card_message = Some(message);
        Ok(())
    }

    async fn replace_or_send(
        &self,
        user_id: UserId,
        message: Option<MessageRef>,
        content: MessageContent,
    ) -> AppResult<MessageRef> {
        if let Some(message) = message {
            match self.transport.edit(&message, content.clone()).await {
                Ok(()) => return Ok(message),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Edit failed, sending a new message");
                }
            }
        }
        self.send(user_id, content).await
    }
}
