use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{MovieEntry, MovieId, QUESTIONS},
    transport::MessageRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrigin {
    /// Refills from the orchestrator when exhausted
    Recommendation,
    /// One-shot; browsing ends when exhausted
    Search,
}

/// Movies the user is currently swiping through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationBatch {
    pub movies: Vec<MovieEntry>,
    pub cursor: usize,
    pub origin: BatchOrigin,
}

impl RecommendationBatch {
    pub fn new(movies: Vec<MovieEntry>, origin: BatchOrigin) -> Self {
        Self {
            movies,
            cursor: 0,
            origin,
        }
    }

    pub fn current(&self) -> Option<&MovieEntry> {
        self.movies.get(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.movies.len()
    }

    /// Ids from the cursor to the end, current card included
    pub fn unseen_ids(&self) -> Vec<MovieId> {
        self.movies
            .iter()
            .skip(self.cursor)
            .map(|entry| entry.id().clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Questionnaire {
        step: usize,
        answers: Vec<String>,
    },
    AwaitingSearchQuery,
    Browsing,
    AwaitingRating,
}

/// Result of answering a questionnaire step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionnaireProgress {
    /// Index of the next question to ask
    Next(usize),
    Completed(Vec<String>),
}

/// Where the cursor ended up after a card was dealt with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextCard(usize),
    Exhausted(BatchOrigin),
}

/// Per-user conversation state
///
/// Transitions are plain methods on an owned value. Callers clone the state,
/// apply a transition, perform side effects, and only then store the clone
/// back, so a failed side effect leaves the previous state untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub batch: Option<RecommendationBatch>,
    /// Message showing the current card, edited in place
    pub card_message: Option<MessageRef>,
    /// Set when the questionnaire was just filled; consumed by the next batch
    pub preferences_priority: bool,
}

impl SessionState {
    pub fn reset(&mut self) {
        *self = SessionState {
            preferences_priority: self.preferences_priority,
            ..Default::default()
        };
    }

    pub fn start_questionnaire(&mut self) {
        self.batch = None;
        self.card_message = None;
        self.phase = SessionPhase::Questionnaire {
            step: 0,
            answers: Vec::with_capacity(QUESTIONS.len()),
        };
    }

    pub fn is_in_questionnaire(&self) -> bool {
        matches!(self.phase, SessionPhase::Questionnaire { .. })
    }

    /// Stores the answer for the current step
    pub fn answer(&mut self, text: &str) -> AppResult<QuestionnaireProgress> {
        let SessionPhase::Questionnaire { step, answers } = &mut self.phase else {
            return Err(AppError::InvalidSession("not in questionnaire".to_string()));
        };

        answers.truncate(*step);
        answers.push(text.trim().to_string());
        *step += 1;

        if *step >= QUESTIONS.len() {
            let answers = std::mem::take(answers);
            self.phase = SessionPhase::Idle;
            return Ok(QuestionnaireProgress::Completed(answers));
        }

        Ok(QuestionnaireProgress::Next(*step))
    }

    /// Steps back one question. `None` on the first question.
    pub fn back(&mut self) -> AppResult<Option<usize>> {
        let SessionPhase::Questionnaire { step, answers } = &mut self.phase else {
            return Err(AppError::InvalidSession("not in questionnaire".to_string()));
        };

        if *step == 0 {
            return Ok(None);
        }

        *step -= 1;
        answers.truncate(*step);
        Ok(Some(*step))
    }

    pub fn await_search_query(&mut self) {
        self.batch = None;
        self.card_message = None;
        self.phase = SessionPhase::AwaitingSearchQuery;
    }

    pub fn begin_browsing(&mut self, batch: RecommendationBatch) {
        self.batch = Some(batch);
        self.phase = SessionPhase::Browsing;
    }

    /// Card shown at `index`
    ///
    /// `Ok(None)` for a stale index (a button on an old card). An error means
    /// the state can't serve card actions at all and should be reset.
    pub fn card_at(&self, index: usize) -> AppResult<Option<&MovieEntry>> {
        let batch = self
            .batch
            .as_ref()
            .ok_or_else(|| AppError::InvalidSession("no active batch".to_string()))?;

        if batch.is_exhausted() {
            return Err(AppError::InvalidSession(format!(
                "cursor {} out of range for {} movies",
                batch.cursor,
                batch.movies.len()
            )));
        }

        if index != batch.cursor {
            return Ok(None);
        }

        Ok(batch.current())
    }

    pub fn is_browsing(&self) -> bool {
        self.phase == SessionPhase::Browsing
    }

    pub fn is_awaiting_rating(&self) -> bool {
        self.phase == SessionPhase::AwaitingRating
    }

    pub fn await_rating(&mut self) {
        self.phase = SessionPhase::AwaitingRating;
    }

    /// Moves past the current card and returns to browsing
    pub fn advance(&mut self) -> AppResult<Advance> {
        let batch = self
            .batch
            .as_mut()
            .ok_or_else(|| AppError::InvalidSession("no active batch".to_string()))?;

        batch.cursor += 1;
        self.phase = SessionPhase::Browsing;

        if batch.is_exhausted() {
            Ok(Advance::Exhausted(batch.origin))
        } else {
            Ok(Advance::NextCard(batch.cursor))
        }
    }

    /// Ends browsing, returning the movies the user never got to
    pub fn stop(&mut self) -> Vec<MovieId> {
        let unseen = self
            .batch
            .as_ref()
            .map(RecommendationBatch::unseen_ids)
            .unwrap_or_default();
        self.reset();
        unseen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, MovieRecord};

    fn entry(id: &str) -> MovieEntry {
        MovieEntry::Cached(MovieRecord {
            id: MovieId::new(id),
            name: id.to_string(),
            description: String::new(),
            rating: 7.0,
            poster_url: None,
            year: 2001,
            genres: Vec::new(),
            duration_minutes: 0,
            content_type: ContentType::Movie,
        })
    }

    fn browsing(ids: &[&str], origin: BatchOrigin) -> SessionState {
        let mut state = SessionState::default();
        state.begin_browsing(RecommendationBatch::new(
            ids.iter().map(|id| entry(id)).collect(),
            origin,
        ));
        state
    }

    #[test]
    fn test_questionnaire_completes_after_all_questions() {
        let mut state = SessionState::default();
        state.start_questionnaire();

        for i in 0..QUESTIONS.len() - 1 {
            assert_eq!(
                state.answer(&format!(" answer {} ", i)).unwrap(),
                QuestionnaireProgress::Next(i + 1)
            );
        }

        match state.answer("last").unwrap() {
            QuestionnaireProgress::Completed(answers) => {
                assert_eq!(answers.len(), QUESTIONS.len());
                assert_eq!(answers[0], "answer 0");
                assert_eq!(answers[4], "last");
            }
            other => panic!("unexpected progress: {:?}", other),
        }
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[test]
    fn test_back_on_first_question() {
        let mut state = SessionState::default();
        state.start_questionnaire();
        assert_eq!(state.back().unwrap(), None);

        state.answer("first").unwrap();
        assert_eq!(state.back().unwrap(), Some(0));
        assert_eq!(
            state.phase,
            SessionPhase::Questionnaire {
                step: 0,
                answers: Vec::new()
            }
        );

        assert_eq!(state.answer("again").unwrap(), QuestionnaireProgress::Next(1));
    }

    #[test]
    fn test_answer_outside_questionnaire_is_invalid() {
        let mut state = SessionState::default();
        assert!(matches!(state.answer("x"), Err(AppError::InvalidSession(_))));
        assert!(matches!(state.back(), Err(AppError::InvalidSession(_))));
    }

    #[test]
    fn test_card_at_ignores_stale_index() {
        let state = browsing(&["tt1", "tt2"], BatchOrigin::Recommendation);
        assert_eq!(state.card_at(0).unwrap().map(|e| e.id().as_str()), Some("tt1"));
        assert!(state.card_at(1).unwrap().is_none());
    }

    #[test]
    fn test_card_at_without_batch_is_invalid() {
        let state = SessionState::default();
        assert!(matches!(state.card_at(0), Err(AppError::InvalidSession(_))));
    }

    #[test]
    fn test_advance_reports_exhaustion_with_origin() {
        let mut state = browsing(&["tt1", "tt2"], BatchOrigin::Search);
        assert_eq!(state.advance().unwrap(), Advance::NextCard(1));
        assert_eq!(state.advance().unwrap(), Advance::Exhausted(BatchOrigin::Search));
        assert!(matches!(state.card_at(2), Err(AppError::InvalidSession(_))));
    }

    #[test]
    fn test_rating_returns_to_browsing_on_advance() {
        let mut state = browsing(&["tt1", "tt2"], BatchOrigin::Recommendation);
        state.await_rating();
        assert!(state.is_awaiting_rating());
        state.advance().unwrap();
        assert!(state.is_browsing());
    }

    #[test]
    fn test_stop_returns_unseen_including_current() {
        let mut state = browsing(&["tt1", "tt2", "tt3", "tt4"], BatchOrigin::Recommendation);
        state.preferences_priority = true;
        state.advance().unwrap();

        let unseen = state.stop();
        assert_eq!(
            unseen,
            vec![MovieId::new("tt2"), MovieId::new("tt3"), MovieId::new("tt4")]
        );
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.batch.is_none());
        assert!(state.preferences_priority);
    }
}
