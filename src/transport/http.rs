/// Webhook-backed transport
///
/// Outbound traffic is posted as JSON to a single endpoint owned by the chat
/// gateway: `{"action": "send", "user_id", "content"}` or
/// `{"action": "edit", "message", "content"}`. Sends answer with
/// `{"message_id": <i64>}`.
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::UserId,
    transport::{ChatTransport, MessageContent, MessageRef},
};
use reqwest::Client as HttpClient;

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum OutboundRequest<'a> {
    Send {
        user_id: UserId,
        content: &'a MessageContent,
    },
    Edit {
        message: &'a MessageRef,
        content: &'a MessageContent,
    },
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: i64,
}

#[derive(Clone)]
pub struct HttpChatTransport {
    http_client: HttpClient,
    webhook_url: String,
}

impl HttpChatTransport {
    pub fn new(http_client: HttpClient, webhook_url: String) -> Self {
        Self {
            http_client,
            webhook_url,
        }
    }

    async fn post(&self, request: &OutboundRequest<'_>) -> AppResult<reqwest::Response> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Chat gateway rejected request");
            return Err(AppError::Transport(format!(
                "Gateway returned status {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&self, user_id: UserId, content: MessageContent) -> AppResult<MessageRef> {
        let response = self
            .post(&OutboundRequest::Send {
                user_id,
                content: &content,
            })
            .await?;

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::Transport(format!("Invalid gateway response: {}", e)))?;

        tracing::debug!(user_id = %user_id, message_id = body.message_id, "Message sent");

        Ok(MessageRef {
            user_id,
            message_id: body.message_id,
        })
    }

    async fn edit(&self, message: &MessageRef, content: MessageContent) -> AppResult<()> {
        self.post(&OutboundRequest::Edit {
            message,
            content: &content,
        })
        .await?;

        tracing::debug!(user_id = %message.user_id, message_id = message.message_id, "Message edited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_send_shape() {
        let content = MessageContent::text("hi");
        let json = serde_json::to_value(OutboundRequest::Send {
            user_id: UserId(5),
            content: &content,
        })
        .unwrap();

        assert_eq!(json["action"], "send");
        assert_eq!(json["user_id"], 5);
        assert_eq!(json["content"]["text"], "hi");
    }

    #[test]
    fn test_outbound_edit_shape() {
        let content = MessageContent::text("edited");
        let message = MessageRef {
            user_id: UserId(5),
            message_id: 11,
        };
        let json = serde_json::to_value(OutboundRequest::Edit {
            message: &message,
            content: &content,
        })
        .unwrap();

        assert_eq!(json["action"], "edit");
        assert_eq!(json["message"]["message_id"], 11);
    }
}
