use super::wire::{ConversationDto, DecodeEventError, MessageDto};
use crate::domain::{Conversation, ConversationId, Message, MessageId};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api base url cannot carry path segments: {0}")]
    InvalidBaseUrl(String),

    #[error("request failed with http status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Message(#[from] DecodeEventError),
}

/// Blocking REST client for the chat backend. Cheap to clone; run calls off the UI thread.
#[derive(Clone, Debug)]
pub struct ApiClient {
    agent: ureq::Agent,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: Url, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base.to_string()));
        }
        Ok(Self {
            agent: make_agent(timeout),
            base,
            token,
        })
    }

    /// `mine_only` hides the message for the caller only; otherwise it is deleted for everyone.
    pub fn delete_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        mine_only: bool,
    ) -> Result<(), ApiError> {
        let mut url = self.endpoint(&[
            "conversations",
            conversation_id.as_str(),
            "messages",
            message_id.as_str(),
        ])?;
        url.query_pairs_mut()
            .append_pair("forMe", if mine_only { "true" } else { "false" });

        debug!(%url, "DELETE");
        let request = self.agent.delete(url.as_str());
        let request = match self.token.as_deref() {
            Some(token) => request.header("Authorization", &format!("Bearer {token}")),
            None => request,
        };
        request.call().map_err(map_ureq_error)?;
        Ok(())
    }

    pub fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint(&["conversations"])?;
        let rows: Vec<ConversationDto> = self.get_json(&url)?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    /// Oldest first, as the view renders them.
    pub fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let mut url = self.endpoint(&["conversations", conversation_id.as_str(), "messages"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let rows: Vec<MessageDto> = self.get_json(&url)?;
        let mut messages = rows
            .into_iter()
            .map(MessageDto::into_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let request = self
            .agent
            .get(url.as_str())
            .header("Accept", "application/json");
        let request = match self.token.as_deref() {
            Some(token) => request.header("Authorization", &format!("Bearer {token}")),
            None => request,
        };
        let mut response = request.call().map_err(map_ureq_error)?;
        response
            .body_mut()
            .read_json::<T>()
            .map_err(|error| ApiError::Decode(error.to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        build_endpoint(&self.base, segments)
    }
}

fn build_endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn map_ureq_error(error: ureq::Error) -> ApiError {
    match error {
        ureq::Error::StatusCode(code) => ApiError::Status(code),
        other => ApiError::Transport(other.to_string()),
    }
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_escaped_segments() {
        let base = Url::parse("https://chat.example/api/").expect("url");
        let url = build_endpoint(&base, &["conversations", "c 1", "messages", "a/b"]).expect("url");
        assert_eq!(
            url.as_str(),
            "https://chat.example/api/conversations/c%201/messages/a%2Fb"
        );
    }

    #[test]
    fn endpoint_without_trailing_slash() {
        let base = Url::parse("http://localhost:8080/api").expect("url");
        let url = build_endpoint(&base, &["conversations"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/api/conversations");
    }

    #[test]
    fn rejects_non_hierarchical_base() {
        let base = Url::parse("mailto:chat@example.com").expect("url");
        assert!(matches!(
            ApiClient::new(base, None, Duration::from_secs(1)),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }
}
