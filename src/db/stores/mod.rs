use async_trait::async_trait;

use super::DatabaseError;
use crate::guild::GuildPolicy;
use crate::starboard::{MessageIdentity, RepostRecord};

/// Original message to board post mapping, with a reverse lookup by board
/// post for when the board post itself is deleted.
#[async_trait]
pub trait RepostStore: Send + Sync {
    async fn get_repost(
        &self,
        original: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError>;
    async fn get_repost_by_board(
        &self,
        board: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError>;
    async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError>;
    async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn get_guild(&self, guild_id: &str) -> Result<Option<GuildPolicy>, DatabaseError>;
    async fn upsert_guild(&self, policy: &GuildPolicy) -> Result<(), DatabaseError>;
    async fn delete_guild(&self, guild_id: &str) -> Result<(), DatabaseError>;
}
