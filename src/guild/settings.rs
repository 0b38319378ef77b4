use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use super::policy::{GuildPolicy, StarEmote};
use crate::config::PolicyDefaults;
use crate::db::{DatabaseError, GuildStore};

const MAX_EMBED_COLOUR: u32 = 0xFF_FF_FF;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("guild {0} has no starboard settings")]
    UnknownGuild(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Read side consumed by the starboard core.
#[async_trait]
pub trait GuildSettingsProvider: Send + Sync {
    async fn get_policy(&self, guild_id: &str) -> Result<Option<Arc<GuildPolicy>>, SettingsError>;
}

/// A single typed change to a guild's starboard settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Enabled(bool),
    StarboardChannel(Option<String>),
    NsfwStarboardChannel(Option<String>),
    StarEmote(String),
    StarsRequired(u32),
    ChannelStars {
        channel_id: String,
        stars: Option<u32>,
    },
    AllowSelfStar(bool),
    IgnoreBots(bool),
    BanChannel(String),
    UnbanChannel(String),
    BlacklistUser(String),
    UnblacklistUser(String),
    EmbedColour(u32),
}

impl SettingChange {
    pub fn validate(&self) -> Result<(), SettingsError> {
        match self {
            Self::StarsRequired(0)
            | Self::ChannelStars {
                stars: Some(0), ..
            } => Err(SettingsError::Invalid(
                "star requirement must be at least 1".to_string(),
            )),
            Self::StarEmote(emote) if emote.trim().is_empty() => Err(SettingsError::Invalid(
                "star emote cannot be empty".to_string(),
            )),
            Self::EmbedColour(colour) if *colour > MAX_EMBED_COLOUR => Err(
                SettingsError::Invalid(format!("colour {colour:#x} is not a 24-bit RGB value")),
            ),
            Self::StarboardChannel(Some(id))
            | Self::NsfwStarboardChannel(Some(id))
            | Self::BanChannel(id)
            | Self::UnbanChannel(id)
            | Self::BlacklistUser(id)
            | Self::UnblacklistUser(id)
            | Self::ChannelStars { channel_id: id, .. }
                if id.parse::<u64>().is_err() =>
            {
                Err(SettingsError::Invalid(format!("{id} is not a valid id")))
            }
            _ => Ok(()),
        }
    }

    pub fn apply_to(&self, policy: &mut GuildPolicy) {
        match self {
            Self::Enabled(enabled) => policy.enabled = *enabled,
            Self::StarboardChannel(channel) => policy.starboard_channel_id = channel.clone(),
            Self::NsfwStarboardChannel(channel) => {
                policy.nsfw_starboard_channel_id = channel.clone()
            }
            Self::StarEmote(emote) => policy.star_emote = StarEmote::parse(emote).to_string(),
            Self::StarsRequired(stars) => policy.stars_required = *stars,
            Self::ChannelStars { channel_id, stars } => match stars {
                Some(stars) => {
                    policy.channel_stars.insert(channel_id.clone(), *stars);
                }
                None => {
                    policy.channel_stars.remove(channel_id);
                }
            },
            Self::AllowSelfStar(allow) => policy.allow_self_star = *allow,
            Self::IgnoreBots(ignore) => policy.ignore_bots = *ignore,
            Self::BanChannel(channel_id) => {
                policy.banned_channels.insert(channel_id.clone());
            }
            Self::UnbanChannel(channel_id) => {
                policy.banned_channels.remove(channel_id);
            }
            Self::BlacklistUser(user_id) => {
                policy.blacklisted_users.insert(user_id.clone());
            }
            Self::UnblacklistUser(user_id) => {
                policy.blacklisted_users.remove(user_id);
            }
            Self::EmbedColour(colour) => policy.embed_colour = *colour,
        }
    }
}

struct CachedPolicy {
    policy: Arc<GuildPolicy>,
    loaded_at: Instant,
}

/// Guild settings service: a TTL cache in front of the guild store. Every
/// settings change goes through [`GuildSettings::apply`], which invalidates
/// the cached entry for that guild.
pub struct GuildSettings {
    store: Arc<dyn GuildStore>,
    defaults: PolicyDefaults,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedPolicy>>,
}

impl GuildSettings {
    pub fn new(store: Arc<dyn GuildStore>, defaults: PolicyDefaults, ttl: Duration) -> Self {
        Self {
            store,
            defaults,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates default settings for a guild the bot just joined. Existing
    /// settings are left alone.
    pub async fn ensure_guild(&self, guild_id: &str, name: &str) -> Result<(), SettingsError> {
        if self.store.get_guild(guild_id).await?.is_some() {
            return Ok(());
        }

        let policy = GuildPolicy::with_defaults(guild_id, name, &self.defaults);
        self.store.upsert_guild(&policy).await?;
        info!(guild_id, name, "created default starboard settings");
        Ok(())
    }

    pub async fn remove_guild(&self, guild_id: &str) -> Result<(), SettingsError> {
        self.store.delete_guild(guild_id).await?;
        self.invalidate(guild_id);
        info!(guild_id, "removed starboard settings");
        Ok(())
    }

    pub async fn apply(
        &self,
        guild_id: &str,
        change: SettingChange,
    ) -> Result<Arc<GuildPolicy>, SettingsError> {
        change.validate()?;

        let mut policy = self
            .store
            .get_guild(guild_id)
            .await?
            .ok_or_else(|| SettingsError::UnknownGuild(guild_id.to_string()))?;
        change.apply_to(&mut policy);
        self.store.upsert_guild(&policy).await?;
        self.invalidate(guild_id);

        debug!(guild_id, ?change, "applied starboard setting");
        Ok(Arc::new(policy))
    }

    pub fn invalidate(&self, guild_id: &str) {
        self.cache.write().remove(guild_id);
    }

    fn cached(&self, guild_id: &str) -> Option<Arc<GuildPolicy>> {
        let cache = self.cache.read();
        cache
            .get(guild_id)
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| entry.policy.clone())
    }
}

#[async_trait]
impl GuildSettingsProvider for GuildSettings {
    async fn get_policy(&self, guild_id: &str) -> Result<Option<Arc<GuildPolicy>>, SettingsError> {
        if let Some(policy) = self.cached(guild_id) {
            return Ok(Some(policy));
        }

        let Some(policy) = self.store.get_guild(guild_id).await? else {
            return Ok(None);
        };

        let policy = Arc::new(policy);
        self.cache.write().insert(
            guild_id.to_string(),
            CachedPolicy {
                policy: policy.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(Some(policy))
    }
}
