use std::fmt::Display;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    Next,
    Like,
    Watched,
    Stop,
}

impl CardAction {
    fn as_str(&self) -> &'static str {
        match self {
            CardAction::Next => "next",
            CardAction::Like => "like",
            CardAction::Watched => "watched",
            CardAction::Stop => "stop",
        }
    }
}

/// Payload carried by inline buttons
///
/// Card and rating buttons carry the cursor index they were rendered for,
/// so presses on an outdated card can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    MainMenu,
    Profile,
    RedoQuestionnaire,
    /// 1-based page
    Favourites { page: usize },
    Recommendations,
    Search,
    QuestionnaireBack,
    QuestionnaireCancel,
    Card { action: CardAction, index: usize },
    Rate { index: usize, score: u8 },
}

impl Callback {
    /// Whether the callback acts on the current card and must not queue
    /// behind another in-flight card action
    pub fn is_card_action(&self) -> bool {
        matches!(self, Callback::Card { .. } | Callback::Rate { .. })
    }
}

impl Display for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callback::MainMenu => write!(f, "menu"),
            Callback::Profile => write!(f, "profile"),
            Callback::RedoQuestionnaire => write!(f, "profile:redo"),
            Callback::Favourites { page } => write!(f, "favourites:{}", page),
            Callback::Recommendations => write!(f, "recommendations"),
            Callback::Search => write!(f, "search"),
            Callback::QuestionnaireBack => write!(f, "quiz:back"),
            Callback::QuestionnaireCancel => write!(f, "quiz:cancel"),
            Callback::Card { action, index } => write!(f, "card:{}:{}", action.as_str(), index),
            Callback::Rate { index, score } => write!(f, "rate:{}:{}", index, score),
        }
    }
}

impl FromStr for Callback {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidInput(format!("Unknown callback data: {}", s));
        let number = |part: Option<&str>| -> Result<usize, AppError> {
            part.and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };

        let mut parts = s.split(':');
        let callback = match parts.next() {
            Some("menu") => Callback::MainMenu,
            Some("profile") => match parts.next() {
                None => Callback::Profile,
                Some("redo") => Callback::RedoQuestionnaire,
                Some(_) => return Err(invalid()),
            },
            Some("favourites") => Callback::Favourites {
                page: number(parts.next())?.max(1),
            },
            Some("recommendations") => Callback::Recommendations,
            Some("search") => Callback::Search,
            Some("quiz") => match parts.next() {
                Some("back") => Callback::QuestionnaireBack,
                Some("cancel") => Callback::QuestionnaireCancel,
                _ => return Err(invalid()),
            },
            Some("card") => {
                let action = match parts.next() {
                    Some("next") => CardAction::Next,
                    Some("like") => CardAction::Like,
                    Some("watched") => CardAction::Watched,
                    Some("stop") => CardAction::Stop,
                    _ => return Err(invalid()),
                };
                Callback::Card {
                    action,
                    index: number(parts.next())?,
                }
            }
            Some("rate") => {
                let index = number(parts.next())?;
                let score = parts
                    .next()
                    .and_then(|p| p.parse::<u8>().ok())
                    .filter(|score| (1..=5).contains(score))
                    .ok_or_else(invalid)?;
                Callback::Rate { index, score }
            }
            _ => return Err(invalid()),
        };

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_parseable() {
        let callbacks = [
            Callback::MainMenu,
            Callback::Profile,
            Callback::RedoQuestionnaire,
            Callback::Favourites { page: 3 },
            Callback::Recommendations,
            Callback::Search,
            Callback::QuestionnaireBack,
            Callback::QuestionnaireCancel,
            Callback::Card {
                action: CardAction::Watched,
                index: 4,
            },
            Callback::Rate { index: 2, score: 5 },
        ];

        for callback in callbacks {
            assert_eq!(callback.to_string().parse::<Callback>().unwrap(), callback);
        }
    }

    #[test]
    fn test_card_encoding() {
        let callback = Callback::Card {
            action: CardAction::Like,
            index: 7,
        };
        assert_eq!(callback.to_string(), "card:like:7");
        assert!(callback.is_card_action());
        assert!(!Callback::Favourites { page: 1 }.is_card_action());
    }

    #[test]
    fn test_rejects_malformed_data() {
        for data in [
            "",
            "card:like",
            "card:dance:1",
            "card:like:x",
            "rate:0:6",
            "rate:0:0",
            "menu:extra",
            "quiz:skip",
        ] {
            assert!(data.parse::<Callback>().is_err(), "accepted {:?}", data);
        }
    }

    #[test]
    fn test_favourites_page_is_at_least_one() {
        assert_eq!(
            "favourites:0".parse::<Callback>().unwrap(),
            Callback::Favourites { page: 1 }
        );
    }
}
