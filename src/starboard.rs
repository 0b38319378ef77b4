use std::sync::Arc;

use thiserror::Error;

pub use self::engine::StarboardEngine;
pub use self::gateway::{Gateway, GatewayError};
pub use self::post::{BoardPost, PostField};
pub use self::queue::EventQueue;
pub use self::repost::CachedRepostStore;
pub use self::types::{
    ChatMessage, MessageAttachment, MessageAuthor, MessageIdentity, ReactionSnapshot,
    RepostRecord, StarboardEvent,
};

use crate::db::{DatabaseError, RepostStore};
use crate::guild::{GuildSettingsProvider, SettingsError};

mod decision;
mod engine;
mod gateway;
mod post;
mod queue;
mod repost;
mod types;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum StarboardError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Entry point for the ingestion layer: events are handed to the per-message
/// queue and applied by a [`StarboardEngine`].
#[derive(Clone)]
pub struct Starboard {
    queue: EventQueue,
}

impl Starboard {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        reposts: Arc<dyn RepostStore>,
        settings: Arc<dyn GuildSettingsProvider>,
    ) -> Self {
        let engine = StarboardEngine::new(gateway, reposts, settings);
        Self {
            queue: EventQueue::new(Arc::new(engine)),
        }
    }

    /// Returns immediately; `false` once shutdown has begun.
    pub fn submit(&self, event: StarboardEvent) -> bool {
        self.queue.push(event)
    }

    pub fn active_workers(&self) -> usize {
        self.queue.worker_count()
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
