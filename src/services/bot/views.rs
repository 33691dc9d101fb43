use reqwest::Url;

use crate::{
    models::{MovieEntry, MovieRecord, UserId, QUESTIONS},
    services::bot::callbacks::{CardAction, Callback},
    transport::{Button, Keyboard, MessageContent},
};

pub const FAVOURITES_PAGE_SIZE: usize = 5;

pub const WELCOME: &str = "Hi! I'm your personal movie bot 🎥\n\
    I'll help you pick a movie by mood, by genre, or when you just want something good to watch.\n\
    Ready? Let's start! 🍿";
pub const MENU_PROMPT: &str = "What would you like to do?";
pub const ANSWER_WITH_TEXT: &str = "Please answer with text";
pub const NO_PREVIOUS_STEP: &str = "There is no previous step";
pub const QUESTIONNAIRE_INTRO: &str = "Let's get to know your taste first. Answer a few questions.";
pub const QUESTIONNAIRE_CANCELLED: &str = "Questionnaire cancelled";
pub const QUESTIONNAIRE_DONE: &str = "Got it, all answers saved. Picking movies for you...";
pub const RECOMMENDATIONS_FAILED: &str =
    "Something went wrong, try stopping and restarting recommendations.";
pub const SAVE_FAILED: &str = "Failed to save, please try again.";
pub const SESSION_RESET: &str = "Something went off track. Please start again from the menu.";
pub const SEARCH_PROMPT: &str = "Describe what you'd like to watch.";
pub const SEARCH_DONE: &str = "That's everything I found for your search.";
pub const STOPPED: &str = "Recommendations stopped. Come back any time!";
pub const NO_FAVOURITES: &str = "You have no favourites yet.";
pub const UNKNOWN_INPUT: &str = "Use the menu below.";

/// Back/Cancel words accepted as plain text during the questionnaire
pub const BACK_WORD: &str = "Back";
pub const CANCEL_WORD: &str = "Cancel";

fn menu_keyboard() -> Keyboard {
    vec![
        vec![
            Button::callback("My profile", Callback::Profile.to_string()),
            Button::callback("Favourites", Callback::Favourites { page: 1 }.to_string()),
        ],
        vec![
            Button::callback("Recommendations", Callback::Recommendations.to_string()),
            Button::callback("Search", Callback::Search.to_string()),
        ],
    ]
}

fn to_menu_row() -> Vec<Button> {
    vec![Button::callback("Main menu", Callback::MainMenu.to_string())]
}

/// Web search link for watching a title
pub fn watch_url(title: &str) -> String {
    Url::parse_with_params(
        "https://www.google.com/search",
        &[("q", format!("watch movie {}", title))],
    )
    .map(String::from)
    .unwrap_or_else(|_| "https://www.google.com/search".to_string())
}

/// Text followed by the main menu buttons
pub fn with_menu(text: &str) -> MessageContent {
    MessageContent::text(text).with_buttons(menu_keyboard())
}

pub fn profile(user_id: UserId, configured: bool) -> MessageContent {
    let status = if configured { "configured" } else { "not configured" };
    let text = format!(
        "👤 Your profile\nID: {}\nRecommendations: {}",
        user_id, status
    );

    let mut buttons = vec![vec![Button::callback(
        "Redo questionnaire",
        Callback::RedoQuestionnaire.to_string(),
    )]];
    buttons.extend(menu_keyboard());

    MessageContent::text(text).with_buttons(buttons)
}

/// Question `step` (0-based) with navigation buttons
pub fn question(step: usize) -> MessageContent {
    let text = format!(
        "Question {} of {}\n{}",
        step + 1,
        QUESTIONS.len(),
        QUESTIONS.get(step).copied().unwrap_or_default()
    );

    MessageContent::text(text).with_buttons(vec![vec![
        Button::callback(BACK_WORD, Callback::QuestionnaireBack.to_string()),
        Button::callback(CANCEL_WORD, Callback::QuestionnaireCancel.to_string()),
    ]])
}

pub fn total_pages(count: usize) -> usize {
    count.div_ceil(FAVOURITES_PAGE_SIZE).max(1)
}

/// One page of liked movies. `page` is 1-based and clamped to the valid range.
pub fn favourites(movies: &[MovieRecord], page: usize) -> MessageContent {
    if movies.is_empty() {
        return MessageContent::text(NO_FAVOURITES).with_buttons(vec![to_menu_row()]);
    }

    let total = total_pages(movies.len());
    let page = page.clamp(1, total);
    let start = (page - 1) * FAVOURITES_PAGE_SIZE;

    let entries: Vec<String> = movies
        .iter()
        .enumerate()
        .skip(start)
        .take(FAVOURITES_PAGE_SIZE)
        .map(|(i, movie)| {
            let rating = if movie.rating > 0.0 {
                format!("{:.1}", movie.rating)
            } else {
                "no data".to_string()
            };
            format!(
                "{}. 🎬 {} ({})\n   📅 {}\n   ⭐ Rating: {}",
                i + 1,
                movie.name,
                watch_url(&movie.name),
                movie.year,
                rating
            )
        })
        .collect();

    let text = format!(
        "🌟 Your favourites (page {} of {}):\n\n{}",
        page,
        total,
        entries.join("\n\n")
    );

    let mut navigation = Vec::new();
    if page > 1 {
        navigation.push(Button::callback("⏮️ First", Callback::Favourites { page: 1 }.to_string()));
        navigation.push(Button::callback(
            "◀️ Previous",
            Callback::Favourites { page: page - 1 }.to_string(),
        ));
    }
    if page < total {
        navigation.push(Button::callback(
            "▶️ Next",
            Callback::Favourites { page: page + 1 }.to_string(),
        ));
        navigation.push(Button::callback(
            "⏩ Last",
            Callback::Favourites { page: total }.to_string(),
        ));
    }

    let mut buttons = Vec::new();
    if !navigation.is_empty() {
        buttons.push(navigation);
    }
    buttons.push(to_menu_row());

    MessageContent::text(text).with_buttons(buttons)
}

fn card_text(movie: &MovieRecord) -> String {
    let duration = if movie.duration_minutes > 0 {
        format!("{} min", movie.duration_minutes)
    } else {
        "unknown".to_string()
    };

    format!(
        "Title: {}\nYear: {}\nRating: {:.1}\nDuration: {}\nGenres: {}\n\nDescription: {}\n🎬 Watch: {}",
        movie.name,
        movie.year,
        movie.rating,
        duration,
        movie.genres_text(),
        movie.description,
        watch_url(&movie.name)
    )
}

/// Carousel card for the movie at cursor `index`
pub fn movie_card(entry: &MovieEntry, index: usize) -> MessageContent {
    let card = |action: CardAction| Callback::Card { action, index }.to_string();
    let movie = entry.record();

    MessageContent::text(card_text(movie))
        .with_photo(movie.poster_url.clone())
        .with_buttons(vec![
            vec![
                Button::callback("Next ⏩", card(CardAction::Next)),
                Button::callback("❤️", card(CardAction::Like)),
            ],
            vec![
                Button::callback("Watched", card(CardAction::Watched)),
                Button::callback("Stop", card(CardAction::Stop)),
            ],
            vec![Button::link("🎬 Where to watch", watch_url(&movie.name))],
        ])
}

/// Replaces the card buttons with a 1 to 5 rating row
pub fn rating_prompt(entry: &MovieEntry, index: usize) -> MessageContent {
    let movie = entry.record();
    let row: Vec<Button> = (1..=5u8)
        .map(|score| Button::callback(score.to_string(), Callback::Rate { index, score }.to_string()))
        .collect();

    MessageContent::text(format!("How would you rate \"{}\"?", movie.name))
        .with_photo(movie.poster_url.clone())
        .with_buttons(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, MovieId};

    fn movie(i: usize) -> MovieRecord {
        MovieRecord {
            id: MovieId::new(format!("tt{}", i)),
            name: format!("Movie {}", i),
            description: "Plot".to_string(),
            rating: 7.25,
            poster_url: Some("https://image.example/p.jpg".to_string()),
            year: 1990 + i as i32,
            genres: vec!["drama".to_string(), "comedy".to_string()],
            duration_minutes: 95,
            content_type: ContentType::Movie,
        }
    }

    fn callbacks(content: &MessageContent) -> Vec<String> {
        content
            .buttons
            .iter()
            .flatten()
            .filter_map(|b| b.callback_data.clone())
            .collect()
    }

    #[test]
    fn test_watch_url_is_encoded() {
        let url = watch_url("Amélie & Co");
        assert!(url.starts_with("https://www.google.com/search?q=watch+movie+"));
        assert!(!url.contains(' '));
        assert!(url.contains("%26"));
    }

    #[test]
    fn test_movie_card_buttons_carry_index() {
        let content = movie_card(&MovieEntry::Cached(movie(1)), 3);
        assert_eq!(
            callbacks(&content),
            vec!["card:next:3", "card:like:3", "card:watched:3", "card:stop:3"]
        );
        assert_eq!(content.photo_url.as_deref(), Some("https://image.example/p.jpg"));
        assert!(content.text.contains("Duration: 95 min"));
        assert!(content.text.contains("Genres: drama, comedy"));
    }

    #[test]
    fn test_rating_prompt_has_five_scores() {
        let content = rating_prompt(&MovieEntry::Cached(movie(1)), 0);
        assert_eq!(
            callbacks(&content),
            vec!["rate:0:1", "rate:0:2", "rate:0:3", "rate:0:4", "rate:0:5"]
        );
    }

    #[test]
    fn test_favourites_pagination() {
        let movies: Vec<MovieRecord> = (1..=12).map(movie).collect();
        assert_eq!(total_pages(movies.len()), 3);

        let first = favourites(&movies, 1);
        assert!(first.text.contains("1. 🎬 Movie 1"));
        assert!(first.text.contains("5. 🎬 Movie 5"));
        assert!(!first.text.contains("6. 🎬"));
        assert_eq!(callbacks(&first), vec!["favourites:2", "favourites:3", "menu"]);

        let middle = favourites(&movies, 2);
        assert_eq!(
            callbacks(&middle),
            vec!["favourites:1", "favourites:1", "favourites:3", "favourites:3", "menu"]
        );

        let last = favourites(&movies, 99);
        assert!(last.text.contains("page 3 of 3"));
        assert!(last.text.contains("12. 🎬 Movie 12"));
        assert_eq!(callbacks(&last), vec!["favourites:1", "favourites:2", "menu"]);
    }

    #[test]
    fn test_favourites_empty() {
        let content = favourites(&[], 1);
        assert_eq!(content.text, NO_FAVOURITES);
        assert_eq!(callbacks(&content), vec!["menu"]);
    }

    #[test]
    fn test_question_has_navigation() {
        let content = question(0);
        assert!(content.text.starts_with("Question 1 of 5"));
        assert_eq!(callbacks(&content), vec!["quiz:back", "quiz:cancel"]);
    }
}
