use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::DatabaseError;
use crate::guild::GuildPolicy;

/// Column values for a `guild_settings` row. Collections are stored as JSON
/// text so both backends share one layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildColumns {
    pub guild_id: String,
    pub name: String,
    pub star_emote: String,
    pub stars_required: i32,
    pub channel_stars: String,
    pub allow_self_star: bool,
    pub ignore_bots: bool,
    pub blacklisted_users: String,
    pub banned_channels: String,
    pub starboard_channel_id: Option<String>,
    pub nsfw_starboard_channel_id: Option<String>,
    pub enabled: bool,
    pub embed_colour: i32,
}

impl GuildColumns {
    pub fn from_policy(policy: &GuildPolicy) -> Result<Self, DatabaseError> {
        let channel_stars: BTreeMap<_, _> = policy.channel_stars.iter().collect();
        let blacklisted_users: BTreeSet<_> = policy.blacklisted_users.iter().collect();
        let banned_channels: BTreeSet<_> = policy.banned_channels.iter().collect();

        Ok(Self {
            guild_id: policy.guild_id.clone(),
            name: policy.name.clone(),
            star_emote: policy.star_emote.clone(),
            stars_required: to_i32("stars_required", policy.stars_required)?,
            channel_stars: encode(&channel_stars)?,
            allow_self_star: policy.allow_self_star,
            ignore_bots: policy.ignore_bots,
            blacklisted_users: encode(&blacklisted_users)?,
            banned_channels: encode(&banned_channels)?,
            starboard_channel_id: policy.starboard_channel_id.clone(),
            nsfw_starboard_channel_id: policy.nsfw_starboard_channel_id.clone(),
            enabled: policy.enabled,
            embed_colour: to_i32("embed_colour", policy.embed_colour)?,
        })
    }

    pub fn into_policy(self) -> Result<GuildPolicy, DatabaseError> {
        let channel_stars: HashMap<String, u32> = decode(&self.channel_stars)?;
        let blacklisted_users: HashSet<String> = decode(&self.blacklisted_users)?;
        let banned_channels: HashSet<String> = decode(&self.banned_channels)?;

        Ok(GuildPolicy {
            guild_id: self.guild_id,
            name: self.name,
            star_emote: self.star_emote,
            stars_required: to_u32("stars_required", self.stars_required)?,
            channel_stars,
            allow_self_star: self.allow_self_star,
            ignore_bots: self.ignore_bots,
            blacklisted_users,
            banned_channels,
            starboard_channel_id: self.starboard_channel_id,
            nsfw_starboard_channel_id: self.nsfw_starboard_channel_id,
            enabled: self.enabled,
            embed_colour: to_u32("embed_colour", self.embed_colour)?,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned + Default>(raw: &str) -> Result<T, DatabaseError> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw).map_err(|e| DatabaseError::Decode(e.to_string()))
}

fn to_i32(field: &str, value: u32) -> Result<i32, DatabaseError> {
    i32::try_from(value).map_err(|_| DatabaseError::Decode(format!("{field} out of range: {value}")))
}

fn to_u32(field: &str, value: i32) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::Decode(format!("{field} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::GuildColumns;
    use crate::config::PolicyDefaults;
    use crate::db::DatabaseError;
    use crate::guild::GuildPolicy;

    #[test]
    fn guild_columns_preserve_collections() {
        let mut policy = GuildPolicy::with_defaults("1", "Guild", &PolicyDefaults::default());
        policy.channel_stars.insert("5".to_string(), 2);
        policy.banned_channels.insert("6".to_string());
        policy.blacklisted_users.insert("7".to_string());

        let columns = GuildColumns::from_policy(&policy).unwrap();
        assert_eq!(columns.channel_stars, r#"{"5":2}"#);
        assert_eq!(columns.into_policy().unwrap(), policy);
    }

    #[test]
    fn empty_collection_columns_decode_as_empty() {
        let policy = GuildPolicy::with_defaults("1", "Guild", &PolicyDefaults::default());
        let mut columns = GuildColumns::from_policy(&policy).unwrap();
        columns.banned_channels = String::new();
        columns.channel_stars = String::new();

        let decoded = columns.into_policy().unwrap();
        assert!(decoded.banned_channels.is_empty());
        assert!(decoded.channel_stars.is_empty());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let policy = GuildPolicy::with_defaults("1", "Guild", &PolicyDefaults::default());
        let mut columns = GuildColumns::from_policy(&policy).unwrap();
        columns.stars_required = -1;

        assert!(matches!(columns.into_policy(), Err(DatabaseError::Decode(_))));
    }
}
