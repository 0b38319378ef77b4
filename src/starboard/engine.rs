use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use super::StarboardError;
use super::decision::{Decision, Posted, ReactionChange, ReactionState, decide};
use super::gateway::{Gateway, GatewayError};
use super::post::BoardPost;
use super::queue::{Disposition, EventHandler};
use super::types::{MessageIdentity, ReactionSnapshot, RepostRecord, StarboardEvent};
use crate::db::RepostStore;
use crate::guild::{GuildSettingsProvider, StarEmote};
use crate::web::Metrics;

/// Applies starboard decisions for one event at a time. Callers must
/// serialize events per message; [`super::queue::EventQueue`] does.
pub struct StarboardEngine {
    gateway: Arc<dyn Gateway>,
    reposts: Arc<dyn RepostStore>,
    settings: Arc<dyn GuildSettingsProvider>,
}

impl StarboardEngine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        reposts: Arc<dyn RepostStore>,
        settings: Arc<dyn GuildSettingsProvider>,
    ) -> Self {
        Self {
            gateway,
            reposts,
            settings,
        }
    }

    async fn on_message_deleted(
        &self,
        target: &MessageIdentity,
    ) -> Result<Disposition, StarboardError> {
        if let Some(record) = self.reposts.get_repost(target).await? {
            self.delete_board(&record.board).await?;
            self.reposts.delete_repost(&record.original).await?;
            Metrics::board_removed();
            info!(original = %target, board = %record.board, "original deleted, removed board post");
        } else if let Some(record) = self.reposts.get_repost_by_board(target).await? {
            self.reposts.delete_repost(&record.original).await?;
            info!(original = %record.original, board = %target, "board post deleted, dropped repost record");
        }
        Ok(Disposition::Retire)
    }

    async fn on_reactions_cleared(
        &self,
        target: &MessageIdentity,
    ) -> Result<Disposition, StarboardError> {
        if let Some(record) = self.reposts.get_repost(target).await? {
            self.delete_board(&record.board).await?;
            self.reposts.delete_repost(&record.original).await?;
            Metrics::board_removed();
            info!(original = %target, board = %record.board, "reactions cleared, removed board post");
        }
        Ok(Disposition::Continue)
    }

    async fn on_reaction(
        &self,
        target: &MessageIdentity,
        guild_id: &str,
        change: ReactionChange,
        snapshot: &ReactionSnapshot,
    ) -> Result<Disposition, StarboardError> {
        let Some(policy) = self.settings.get_policy(guild_id).await? else {
            trace!(guild_id, "no starboard settings for guild");
            return Ok(Disposition::Continue);
        };
        if !policy.accepts_reactions_in(&target.channel_id) {
            return Ok(Disposition::Continue);
        }

        let record = self.reposts.get_repost(target).await?;
        if change == ReactionChange::Removed && record.is_none() {
            return Ok(Disposition::Continue);
        }

        let message = match self.gateway.fetch_message(target).await {
            Ok(message) => message,
            Err(err) if err.is_not_found() => {
                if let Some(record) = &record {
                    self.reposts.delete_repost(&record.original).await?;
                    Metrics::stale_repost_purged();
                    warn!(original = %target, board = %record.board, "original message is gone, dropped repost record");
                }
                return Ok(Disposition::Retire);
            }
            Err(err) => return Err(err.into()),
        };

        let self_starred = self
            .is_self_starred(target, &policy.emote(), &message.author.id)
            .await?;

        let posted = match &record {
            Some(record) => match self.gateway.fetch_message(&record.board).await {
                Ok(board) => Some(Posted::from_footer(board.footer_text.as_deref())),
                Err(err) if err.is_not_found() => {
                    self.reposts.delete_repost(&record.original).await?;
                    Metrics::stale_repost_purged();
                    warn!(original = %target, board = %record.board, "board post is gone, dropped repost record");
                    return Ok(Disposition::Continue);
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        };

        let decision = decide(ReactionState {
            policy: &policy,
            message: &message,
            change,
            raw_count: snapshot.count,
            self_starred,
            posted,
        });

        match (decision, record) {
            (Decision::Create { channel_id, count }, None) => {
                let post = BoardPost::render(&message, guild_id, &policy, count, self_starred);
                let board = self.gateway.send_message(&channel_id, &post).await?;
                let record = RepostRecord::new(target.clone(), board.identity, guild_id);
                if let Err(err) = self.reposts.put_repost(&record).await {
                    error!(original = %target, board = %record.board, "board post created but repost record was not stored: {err}");
                    return Err(err.into());
                }
                Metrics::board_created();
                info!(original = %target, board = %record.board, count, "created board post");
            }
            (Decision::Update { count }, Some(record)) => {
                let post = BoardPost::render(&message, guild_id, &policy, count, self_starred);
                match self.gateway.edit_message(&record.board, &post).await {
                    Ok(_) => {
                        Metrics::board_edited();
                        debug!(original = %target, board = %record.board, count, "updated board post");
                    }
                    Err(err) if err.is_not_found() => {
                        self.reposts.delete_repost(&record.original).await?;
                        Metrics::stale_repost_purged();
                        warn!(original = %target, board = %record.board, "board post vanished before edit, dropped repost record");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            (Decision::Remove, Some(record)) => {
                self.delete_board(&record.board).await?;
                self.reposts.delete_repost(&record.original).await?;
                Metrics::board_removed();
                info!(original = %target, board = %record.board, "star count fell, removed board post");
            }
            (Decision::Skip(reason), _) => {
                trace!(original = %target, ?reason, "no starboard change");
            }
            (decision, record) => {
                error!(original = %target, ?decision, posted = record.is_some(), "decision does not match repost state");
            }
        }

        Ok(Disposition::Continue)
    }

    /// Whether the message author is among the users who reacted with the
    /// star emote. A vanished reaction list counts as not self-starred.
    async fn is_self_starred(
        &self,
        target: &MessageIdentity,
        emote: &StarEmote,
        author_id: &str,
    ) -> Result<bool, StarboardError> {
        match self.gateway.fetch_reactors(target, emote).await {
            Ok(reactors) => Ok(reactors.iter().any(|user| user == author_id)),
            Err(GatewayError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_board(&self, board: &MessageIdentity) -> Result<(), StarboardError> {
        match self.gateway.delete_message(board).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(board = %board, "board post already deleted");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl EventHandler for StarboardEngine {
    async fn handle(&self, event: StarboardEvent) -> Result<Disposition, StarboardError> {
        match &event {
            StarboardEvent::MessageDeleted { target, .. } => self.on_message_deleted(target).await,
            StarboardEvent::AllReactionsCleared { target, .. } => {
                self.on_reactions_cleared(target).await
            }
            StarboardEvent::ReactionAdded {
                target,
                guild_id,
                snapshot,
            } => {
                self.on_reaction(target, guild_id, ReactionChange::Added, snapshot)
                    .await
            }
            StarboardEvent::ReactionRemoved {
                target,
                guild_id,
                snapshot,
            } => {
                self.on_reaction(target, guild_id, ReactionChange::Removed, snapshot)
                    .await
            }
        }
    }
}
