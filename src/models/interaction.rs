use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::{MovieId, UserId};

/// Kind of a user's interaction with a movie
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Liked,
    Disliked,
    Watched,
    Skipped,
    /// Left in a batch when the user stopped; resurfaced once on the next session
    Unwatched,
}

impl InteractionKind {
    /// Kinds whose movies must never be recommended again
    pub const EXCLUDED: [InteractionKind; 4] = [
        InteractionKind::Liked,
        InteractionKind::Disliked,
        InteractionKind::Skipped,
        InteractionKind::Watched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Liked => "liked",
            InteractionKind::Disliked => "disliked",
            InteractionKind::Watched => "watched",
            InteractionKind::Skipped => "skipped",
            InteractionKind::Unwatched => "unwatched",
        }
    }

    /// Maps a 1-5 rating given after "watched" to the recorded kind
    pub fn from_rating(rating: u8) -> Option<Self> {
        match rating {
            4..=5 => Some(InteractionKind::Watched),
            1..=3 => Some(InteractionKind::Disliked),
            _ => None,
        }
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "liked" => Ok(InteractionKind::Liked),
            "disliked" => Ok(InteractionKind::Disliked),
            "watched" => Ok(InteractionKind::Watched),
            "skipped" => Ok(InteractionKind::Skipped),
            "unwatched" => Ok(InteractionKind::Unwatched),
            other => Err(format!("unknown interaction kind: {}", other)),
        }
    }
}

/// Live interaction for a (user, movie) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub kind: InteractionKind,
    /// Monotonic recency marker, bumped on every upsert
    pub seq: i64,
}
