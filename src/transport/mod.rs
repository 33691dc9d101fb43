/// Chat platform boundary
///
/// The bot talks to users only through [`ChatTransport`]. Inbound updates
/// arrive as [`ChatEvent`]s over HTTP; outbound messages go through whichever
/// transport the binary wires in.
use serde::{Deserialize, Serialize};

use crate::{error::AppResult, models::UserId};

pub mod events;
pub mod http;

pub use events::ChatEvent;
pub use http::HttpChatTransport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

/// Rows of inline buttons
pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Keyboard,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_photo(mut self, url: Option<String>) -> Self {
        self.photo_url = url;
        self
    }

    pub fn with_buttons(mut self, buttons: Keyboard) -> Self {
        self.buttons = buttons;
        self
    }
}

/// A message previously sent to a user, used for in-place edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub user_id: UserId,
    pub message_id: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, user_id: UserId, content: MessageContent) -> AppResult<MessageRef>;

    async fn edit(&self, message: &MessageRef, content: MessageContent) -> AppResult<()>;
}
