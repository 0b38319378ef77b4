use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A (channel, message) pair as issued by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentity {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageIdentity {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Cross-reference between an original message and its board post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostRecord {
    pub original: MessageIdentity,
    pub board: MessageIdentity,
    pub guild_id: String,
    pub created_at: DateTime<Utc>,
}

impl RepostRecord {
    pub fn new(original: MessageIdentity, board: MessageIdentity, guild_id: &str) -> Self {
        Self {
            original,
            board,
            guild_id: guild_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Who reacted and how many reactions of the star emote the message carried
/// when the platform event was translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSnapshot {
    pub actor_id: String,
    pub count: u32,
}

/// Unit of work pushed through the per-message queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarboardEvent {
    ReactionAdded {
        target: MessageIdentity,
        guild_id: String,
        snapshot: ReactionSnapshot,
    },
    ReactionRemoved {
        target: MessageIdentity,
        guild_id: String,
        snapshot: ReactionSnapshot,
    },
    AllReactionsCleared {
        target: MessageIdentity,
        guild_id: String,
    },
    MessageDeleted {
        target: MessageIdentity,
        guild_id: String,
    },
}

impl StarboardEvent {
    pub fn target(&self) -> &MessageIdentity {
        match self {
            Self::ReactionAdded { target, .. }
            | Self::ReactionRemoved { target, .. }
            | Self::AllReactionsCleared { target, .. }
            | Self::MessageDeleted { target, .. } => target,
        }
    }

    pub fn snapshot(&self) -> Option<&ReactionSnapshot> {
        match self {
            Self::ReactionAdded { snapshot, .. } | Self::ReactionRemoved { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
            Self::AllReactionsCleared { .. } => "all_reactions_cleared",
            Self::MessageDeleted { .. } => "message_deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageAuthor {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// Platform-neutral view of a fetched message, carrying only what the
/// starboard needs to decide and render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub identity: MessageIdentity,
    pub guild_id: Option<String>,
    pub author: MessageAuthor,
    pub channel_name: String,
    pub channel_nsfw: bool,
    pub content: String,
    pub attachments: Vec<MessageAttachment>,
    pub embed_image: Option<String>,
    pub footer_text: Option<String>,
    pub reference: Option<MessageIdentity>,
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn has_displayable_content(&self) -> bool {
        !self.content.trim().is_empty() || !self.attachments.is_empty()
    }
}
