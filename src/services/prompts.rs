use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::{
    models::{MovieRecord, PreferenceProfile},
    services::llm::PromptMessage,
};

/// Number of titles requested from the model per batch
pub const BATCH_SIZE: usize = 10;

const NO_ANSWER: &str = "No answer";

const OUTPUT_FORMAT: &str = "Return the recommendations as a list in the format Movies = [\"Title 1\", \"Title 2\"], \
     containing only the movie titles in English and nothing else.";

fn movie_list_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Movies\s*=\s*\[\s*(.*?)\s*\]").ok())
        .as_ref()
}

/// Extracts titles from a `Movies = [...]` answer
///
/// Returns an empty list when the pattern is missing. Entries are split on
/// commas with surrounding whitespace and quotes removed; blanks are dropped.
pub fn parse_movie_list(response: &str) -> Vec<String> {
    let Some(captures) = movie_list_regex().and_then(|re| re.captures(response)) else {
        tracing::warn!(response = %response, "Movie list not found in completion");
        return Vec::new();
    };

    let Some(body) = captures.get(1) else {
        return Vec::new();
    };

    body.as_str()
        .split(',')
        .map(|entry| entry.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cold start: recommend from questionnaire answers
pub fn questionnaire_prompt(profile: &PreferenceProfile) -> Vec<PromptMessage> {
    let system = format!(
        "You are a movie recommendation system. Recommend {} movies that match the user's \
         preferences, based on their answers to a short questionnaire. {}",
        BATCH_SIZE, OUTPUT_FORMAT
    );

    let mut user = String::from("I answered some questions about movies. Recommend me something.\n");
    for (i, (question, answer)) in profile.pairs().enumerate() {
        let answer = if answer.trim().is_empty() { NO_ANSWER } else { answer };
        let _ = write!(user, "Question {}: {}\nAnswer: {}\n\n", i + 1, question, answer);
    }

    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

/// Recommend from recently liked movies
pub fn history_prompt(liked: &[MovieRecord]) -> Vec<PromptMessage> {
    let system = format!(
        "You are a movie recommendation system. Based on the movies the user liked recently, \
         recommend {} new movies that match them in genre, tone and style. Do not recommend \
         movies from the list itself. {}",
        BATCH_SIZE, OUTPUT_FORMAT
    );

    let mut user = String::from("Here are the movies the user liked recently:\n");
    for movie in liked {
        let _ = writeln!(
            user,
            "- {} ({}, {}, {:.1}/10)",
            movie.name,
            movie.genres_text(),
            movie.year,
            movie.rating
        );
    }

    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

/// Free-text search that ignores history
pub fn search_prompt(query: &str) -> Vec<PromptMessage> {
    let system = format!(
        "You are a movie search assistant. Find up to {} movies that best match the user's \
         description. {}",
        BATCH_SIZE, OUTPUT_FORMAT
    );

    vec![
        PromptMessage::system(system),
        PromptMessage::user(format!("Find movies matching: {}", query.trim())),
    ]
}
