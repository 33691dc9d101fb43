use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Fixed, ordered questionnaire used for cold-start recommendations
pub const QUESTIONS: [&str; 5] = [
    "Which three movies or series have you enjoyed the most?",
    "Which genres do you usually pick, and which ones do you avoid?",
    "Do you prefer new releases or older classics? Any favourite decades?",
    "What mood are you usually in when you choose something to watch?",
    "Are there actors, directors or countries whose work you particularly like?",
];

/// Opaque chat user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bot user, created on first contact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_seen_at: now,
        }
    }
}

/// Answers to the questionnaire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceProfile {
    pub user_id: UserId,
    /// One answer per entry of [`QUESTIONS`], in order
    pub answers: Vec<String>,
    completed: bool,
}

impl PreferenceProfile {
    /// Builds a profile; the completion flag is derived from the answers
    pub fn new(user_id: UserId, answers: Vec<String>) -> Self {
        let completed = Self::all_answered(&answers);
        Self {
            user_id,
            answers,
            completed,
        }
    }

    /// True iff every question has a non-empty answer
    pub fn has_completed_questionnaire(&self) -> bool {
        self.completed
    }

    /// Question/answer pairs in questionnaire order
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        QUESTIONS
            .iter()
            .enumerate()
            .map(|(i, q)| (*q, self.answers.get(i).map(String::as_str).unwrap_or("")))
    }

    fn all_answered(answers: &[String]) -> bool {
        answers.len() == QUESTIONS.len() && answers.iter().all(|a| !a.trim().is_empty())
    }
}
