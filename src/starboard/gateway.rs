use async_trait::async_trait;
use thiserror::Error;

use super::post::BoardPost;
use super::types::{ChatMessage, MessageIdentity};
use crate::guild::StarEmote;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("message not found")]
    NotFound,

    #[error("invalid platform id: {0}")]
    InvalidId(String),

    #[error("platform request failed: {0}")]
    Platform(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// The chat platform operations the starboard core depends on.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_message(&self, id: &MessageIdentity) -> Result<ChatMessage, GatewayError>;

    /// User ids that reacted to `id` with `emote`.
    async fn fetch_reactors(
        &self,
        id: &MessageIdentity,
        emote: &StarEmote,
    ) -> Result<Vec<String>, GatewayError>;

    async fn send_message(
        &self,
        channel_id: &str,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError>;

    async fn edit_message(
        &self,
        id: &MessageIdentity,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError>;

    async fn delete_message(&self, id: &MessageIdentity) -> Result<(), GatewayError>;
}
