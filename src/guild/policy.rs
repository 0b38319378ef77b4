use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PolicyDefaults;

/// The emote a guild stars messages with: either a unicode emoji or a custom
/// guild emoji in `<:name:id>` / `<a:name:id>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StarEmote {
    Unicode(String),
    Custom {
        name: String,
        id: u64,
        animated: bool,
    },
}

impl StarEmote {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(inner) = raw.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let (animated, rest) = match inner.strip_prefix("a:") {
                Some(rest) => (true, rest),
                None => (false, inner.trim_start_matches(':')),
            };
            if let Some((name, id)) = rest.rsplit_once(':')
                && let Ok(id) = id.parse::<u64>()
            {
                return Self::Custom {
                    name: name.to_string(),
                    id,
                    animated,
                };
            }
        }
        Self::Unicode(raw.to_string())
    }

    pub fn matches_unicode(&self, emoji: &str) -> bool {
        matches!(self, Self::Unicode(own) if own == emoji)
    }

    pub fn matches_custom(&self, emoji_id: u64) -> bool {
        matches!(self, Self::Custom { id, .. } if *id == emoji_id)
    }

    /// CDN image for custom emotes, used as the footer icon.
    pub fn icon_url(&self) -> Option<String> {
        match self {
            Self::Unicode(_) => None,
            Self::Custom { id, animated, .. } => Some(format!(
                "https://cdn.discordapp.com/emojis/{}.{}",
                id,
                if *animated { "gif" } else { "png" }
            )),
        }
    }
}

impl fmt::Display for StarEmote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicode(emoji) => f.write_str(emoji),
            Self::Custom { name, id, animated } => {
                write!(f, "<{}:{}:{}>", if *animated { "a" } else { "" }, name, id)
            }
        }
    }
}

/// Per-guild starboard configuration, read-only to the starboard core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildPolicy {
    pub guild_id: String,
    pub name: String,
    pub star_emote: String,
    pub stars_required: u32,
    pub channel_stars: HashMap<String, u32>,
    pub allow_self_star: bool,
    pub ignore_bots: bool,
    pub blacklisted_users: HashSet<String>,
    pub banned_channels: HashSet<String>,
    pub starboard_channel_id: Option<String>,
    pub nsfw_starboard_channel_id: Option<String>,
    pub enabled: bool,
    pub embed_colour: u32,
}

impl GuildPolicy {
    pub fn with_defaults(guild_id: &str, name: &str, defaults: &PolicyDefaults) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            name: name.to_string(),
            star_emote: defaults.star_emote.clone(),
            stars_required: defaults.stars_required,
            channel_stars: HashMap::new(),
            allow_self_star: defaults.allow_self_star,
            ignore_bots: defaults.ignore_bots,
            blacklisted_users: HashSet::new(),
            banned_channels: HashSet::new(),
            starboard_channel_id: None,
            nsfw_starboard_channel_id: None,
            enabled: defaults.enabled,
            embed_colour: defaults.embed_colour,
        }
    }

    pub fn emote(&self) -> StarEmote {
        StarEmote::parse(&self.star_emote)
    }

    /// The per-channel override when one exists, the guild threshold otherwise.
    pub fn stars_required(&self, channel_id: &str) -> u32 {
        self.channel_stars
            .get(channel_id)
            .copied()
            .unwrap_or(self.stars_required)
    }

    pub fn is_banned(&self, channel_id: &str) -> bool {
        self.banned_channels.contains(channel_id)
    }

    pub fn is_blacklisted(&self, user_id: &str) -> bool {
        self.blacklisted_users.contains(user_id)
    }

    pub fn is_starboard_channel(&self, channel_id: &str) -> bool {
        self.starboard_channel_id.as_deref() == Some(channel_id)
            || self.nsfw_starboard_channel_id.as_deref() == Some(channel_id)
    }

    /// Whether reaction events from `channel_id` should be considered at all.
    pub fn accepts_reactions_in(&self, channel_id: &str) -> bool {
        self.enabled && self.starboard_channel_id.is_some() && !self.is_banned(channel_id)
    }

    /// NSFW origins go to the NSFW board when one is configured.
    pub fn board_channel_for(&self, origin_nsfw: bool) -> Option<&str> {
        if origin_nsfw && let Some(nsfw) = self.nsfw_starboard_channel_id.as_deref() {
            return Some(nsfw);
        }
        self.starboard_channel_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{GuildPolicy, StarEmote};
    use crate::config::PolicyDefaults;

    fn policy() -> GuildPolicy {
        let mut policy = GuildPolicy::with_defaults("guild", "Guild", &PolicyDefaults::default());
        policy.starboard_channel_id = Some("board".to_string());
        policy
    }

    #[test_case("⭐", StarEmote::Unicode("⭐".to_string()) ; "unicode")]
    #[test_case("<:kek:1234>", StarEmote::Custom { name: "kek".to_string(), id: 1234, animated: false } ; "custom")]
    #[test_case("<a:dance:99>", StarEmote::Custom { name: "dance".to_string(), id: 99, animated: true } ; "animated")]
    #[test_case("<:broken:abc>", StarEmote::Unicode("<:broken:abc>".to_string()) ; "malformed id")]
    fn star_emote_parse(raw: &str, expected: StarEmote) {
        assert_eq!(StarEmote::parse(raw), expected);
    }

    #[test]
    fn star_emote_display_round_trips_custom_form() {
        assert_eq!(StarEmote::parse("<a:dance:99>").to_string(), "<a:dance:99>");
        assert_eq!(
            StarEmote::parse("<:kek:1234>").icon_url().as_deref(),
            Some("https://cdn.discordapp.com/emojis/1234.png")
        );
    }

    #[test]
    fn channel_override_supersedes_global_threshold() {
        let mut policy = policy();
        policy.stars_required = 10;
        policy.channel_stars.insert("memes".to_string(), 3);

        assert_eq!(policy.stars_required("memes"), 3);
        assert_eq!(policy.stars_required("general"), 10);
    }

    #[test]
    fn nsfw_origin_prefers_nsfw_board() {
        let mut policy = policy();
        assert_eq!(policy.board_channel_for(true), Some("board"));

        policy.nsfw_starboard_channel_id = Some("lewd-board".to_string());
        assert_eq!(policy.board_channel_for(true), Some("lewd-board"));
        assert_eq!(policy.board_channel_for(false), Some("board"));
    }

    #[test]
    fn disabled_or_unconfigured_guild_rejects_reactions() {
        let mut policy = policy();
        assert!(policy.accepts_reactions_in("general"));

        policy.banned_channels.insert("general".to_string());
        assert!(!policy.accepts_reactions_in("general"));

        let mut policy = super::GuildPolicy::with_defaults("g", "G", &PolicyDefaults::default());
        assert!(!policy.accepts_reactions_in("general"));
        policy.starboard_channel_id = Some("board".to_string());
        policy.enabled = false;
        assert!(!policy.accepts_reactions_in("general"));
    }
}
