use serde::{Deserialize, Serialize};

use crate::models::UserId;

/// Inbound update from the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Slash command without the leading `/`, e.g. `start`
    Command { user_id: UserId, command: String },
    /// Free-form message; `text` is absent for stickers, photos and the like
    Message {
        user_id: UserId,
        #[serde(default)]
        text: Option<String>,
    },
    /// Inline button press
    Callback {
        user_id: UserId,
        data: String,
        #[serde(default)]
        message_id: Option<i64>,
    },
}

impl ChatEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            ChatEvent::Command { user_id, .. }
            | ChatEvent::Message { user_id, .. }
            | ChatEvent::Callback { user_id, .. } => *user_id,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Command { .. } => "command",
            ChatEvent::Message { .. } => "message",
            ChatEvent::Callback { .. } => "callback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_callback() {
        let json = r#"{"type":"callback","user_id":42,"data":"card:like:3","message_id":7}"#;
        let event: ChatEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ChatEvent::Callback {
                user_id: UserId(42),
                data: "card:like:3".to_string(),
                message_id: Some(7),
            }
        );
        assert_eq!(event.user_id(), UserId(42));
        assert_eq!(event.kind(), "callback");
    }

    #[test]
    fn test_deserialize_message_without_text() {
        let event: ChatEvent = serde_json::from_str(r#"{"type":"message","user_id":1}"#).unwrap();
        assert_eq!(
            event,
            ChatEvent::Message {
                user_id: UserId(1),
                text: None
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<ChatEvent>(r#"{"type":"poll","user_id":1}"#);
        assert!(result.is_err());
    }
}
