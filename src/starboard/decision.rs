use super::post::{footer_shows_self_star, parse_displayed_count};
use super::types::ChatMessage;
use crate::guild::GuildPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    Removed,
}

/// What the board currently shows for a posted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posted {
    pub displayed_count: Option<u32>,
    pub shows_self_star: bool,
}

impl Posted {
    pub fn from_footer(footer: Option<&str>) -> Self {
        Self {
            displayed_count: footer.and_then(parse_displayed_count),
            shows_self_star: footer.is_some_and(footer_shows_self_star),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPosted,
    BelowThreshold,
    Unchanged,
    BlacklistedAuthor,
    BotAuthor,
    BannedChannel,
    StarboardChannel,
    NoContent,
    NoBoardChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Create { channel_id: String, count: u32 },
    Update { count: u32 },
    Remove,
    Skip(SkipReason),
}

/// Inputs for one reaction event on one message.
#[derive(Debug, Clone, Copy)]
pub struct ReactionState<'a> {
    pub policy: &'a GuildPolicy,
    pub message: &'a ChatMessage,
    pub change: ReactionChange,
    pub raw_count: u32,
    pub self_starred: bool,
    pub posted: Option<Posted>,
}

/// The count used for every threshold comparison. The raw platform count is
/// never adjusted in place.
pub fn effective_count(raw_count: u32, self_starred: bool, allow_self_star: bool) -> u32 {
    if self_starred && !allow_self_star {
        raw_count.saturating_sub(1)
    } else {
        raw_count
    }
}

/// Posted boards are removed once the count falls to half the current
/// requirement or lower.
pub fn removal_threshold(required: u32) -> u32 {
    required / 2
}

pub fn decide(state: ReactionState<'_>) -> Decision {
    let policy = state.policy;
    let channel_id = state.message.identity.channel_id.as_str();
    let required = policy.stars_required(channel_id);
    let count = effective_count(state.raw_count, state.self_starred, policy.allow_self_star);
    let noted_self_star = state.self_starred && policy.allow_self_star;

    match state.posted {
        Some(posted) => {
            if count <= removal_threshold(required) {
                Decision::Remove
            } else if posted.displayed_count == Some(count)
                && posted.shows_self_star == noted_self_star
            {
                Decision::Skip(SkipReason::Unchanged)
            } else {
                Decision::Update { count }
            }
        }
        None if state.change == ReactionChange::Removed => Decision::Skip(SkipReason::NotPosted),
        None => {
            if count < required {
                return Decision::Skip(SkipReason::BelowThreshold);
            }
            if let Some(reason) = ineligibility(policy, state.message) {
                return Decision::Skip(reason);
            }
            match policy.board_channel_for(state.message.channel_nsfw) {
                Some(board) => Decision::Create {
                    channel_id: board.to_string(),
                    count,
                },
                None => Decision::Skip(SkipReason::NoBoardChannel),
            }
        }
    }
}

fn ineligibility(policy: &GuildPolicy, message: &ChatMessage) -> Option<SkipReason> {
    let channel_id = message.identity.channel_id.as_str();
    if policy.is_blacklisted(&message.author.id) {
        Some(SkipReason::BlacklistedAuthor)
    } else if policy.ignore_bots && message.author.bot {
        Some(SkipReason::BotAuthor)
    } else if policy.is_banned(channel_id) {
        Some(SkipReason::BannedChannel)
    } else if policy.is_starboard_channel(channel_id) {
        Some(SkipReason::StarboardChannel)
    } else if !message.has_displayable_content() {
        Some(SkipReason::NoContent)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{
        Decision, Posted, ReactionChange, ReactionState, SkipReason, decide, effective_count,
    };
    use crate::config::PolicyDefaults;
    use crate::guild::GuildPolicy;
    use crate::starboard::types::{ChatMessage, MessageAuthor, MessageIdentity};

    fn policy(required: u32) -> GuildPolicy {
        let mut policy = GuildPolicy::with_defaults("1", "G", &PolicyDefaults::default());
        policy.stars_required = required;
        policy.starboard_channel_id = Some("900".to_string());
        policy
    }

    fn message() -> ChatMessage {
        ChatMessage {
            identity: MessageIdentity::new("100", "1"),
            guild_id: Some("1".to_string()),
            author: MessageAuthor {
                id: "7".to_string(),
                name: "alice".to_string(),
                avatar_url: None,
                bot: false,
            },
            channel_name: "general".to_string(),
            channel_nsfw: false,
            content: "hello".to_string(),
            attachments: Vec::new(),
            embed_image: None,
            footer_text: None,
            reference: None,
            timestamp: None,
        }
    }

    fn state<'a>(
        policy: &'a GuildPolicy,
        message: &'a ChatMessage,
        raw_count: u32,
        posted: Option<Posted>,
    ) -> ReactionState<'a> {
        ReactionState {
            policy,
            message,
            change: ReactionChange::Added,
            raw_count,
            self_starred: false,
            posted,
        }
    }

    fn shown(count: u32) -> Option<Posted> {
        Some(Posted {
            displayed_count: Some(count),
            shows_self_star: false,
        })
    }

    #[test_case(5, true, false, 4 ; "self star discounted")]
    #[test_case(5, true, true, 5 ; "self star allowed")]
    #[test_case(5, false, false, 5 ; "no self star")]
    #[test_case(0, true, false, 0 ; "never underflows")]
    fn effective_count_cases(raw: u32, self_starred: bool, allow: bool, expected: u32) {
        assert_eq!(effective_count(raw, self_starred, allow), expected);
    }

    #[test_case(9, None, Decision::Skip(SkipReason::BelowThreshold) ; "below threshold")]
    #[test_case(10, None, Decision::Create { channel_id: "900".to_string(), count: 10 } ; "crosses threshold")]
    #[test_case(5, shown(10), Decision::Remove ; "half threshold removes")]
    #[test_case(6, shown(10), Decision::Update { count: 6 } ; "above half edits")]
    #[test_case(6, shown(6), Decision::Skip(SkipReason::Unchanged) ; "same count skips")]
    #[test_case(11, Some(Posted::from_footer(Some("starboard"))), Decision::Update { count: 11 } ; "unreadable footer edits")]
    fn threshold_transitions(raw: u32, posted: Option<Posted>, expected: Decision) {
        let policy = policy(10);
        let message = message();
        assert_eq!(decide(state(&policy, &message, raw, posted)), expected);
    }

    #[test]
    fn self_star_keeps_message_below_threshold() {
        let mut policy = policy(5);
        policy.allow_self_star = false;
        let message = message();
        let mut input = state(&policy, &message, 5, None);
        input.self_starred = true;

        assert_eq!(decide(input), Decision::Skip(SkipReason::BelowThreshold));
    }

    #[test]
    fn self_star_change_at_same_count_edits() {
        let mut policy = policy(4);
        policy.allow_self_star = true;
        let message = message();

        let mut starred = state(&policy, &message, 6, shown(6));
        starred.self_starred = true;
        assert_eq!(decide(starred), Decision::Update { count: 6 });

        let marked = Posted::from_footer(Some("⭐ 6 | self-starred"));
        let mut unstarred = state(&policy, &message, 6, Some(marked));
        unstarred.self_starred = false;
        assert_eq!(decide(unstarred), Decision::Update { count: 6 });

        let mut still_starred = state(&policy, &message, 6, Some(marked));
        still_starred.self_starred = true;
        assert_eq!(decide(still_starred), Decision::Skip(SkipReason::Unchanged));
    }

    #[test]
    fn removal_uses_current_requirement() {
        let mut policy = policy(4);
        let message = message();
        assert_eq!(decide(state(&policy, &message, 3, shown(4))), Decision::Update { count: 3 });

        policy.stars_required = 8;
        assert_eq!(decide(state(&policy, &message, 3, shown(4))), Decision::Remove);
    }

    #[test]
    fn removal_on_unposted_message_is_noop() {
        let policy = policy(1);
        let message = message();
        let mut input = state(&policy, &message, 3, None);
        input.change = ReactionChange::Removed;

        assert_eq!(decide(input), Decision::Skip(SkipReason::NotPosted));
    }

    #[test]
    fn ineligible_messages_are_skipped() {
        let message = message();

        let mut blacklisted = policy(1);
        blacklisted.blacklisted_users.insert("7".to_string());
        assert_eq!(
            decide(state(&blacklisted, &message, 2, None)),
            Decision::Skip(SkipReason::BlacklistedAuthor)
        );

        let mut bots = policy(1);
        bots.ignore_bots = true;
        let mut bot_message = message.clone();
        bot_message.author.bot = true;
        assert_eq!(
            decide(state(&bots, &bot_message, 2, None)),
            Decision::Skip(SkipReason::BotAuthor)
        );

        let board = policy(1);
        let mut on_board = message.clone();
        on_board.identity.channel_id = "900".to_string();
        assert_eq!(
            decide(state(&board, &on_board, 2, None)),
            Decision::Skip(SkipReason::StarboardChannel)
        );

        let mut empty = message.clone();
        empty.content = "   ".to_string();
        assert_eq!(
            decide(state(&board, &empty, 2, None)),
            Decision::Skip(SkipReason::NoContent)
        );
    }

    #[test]
    fn channel_override_applies_to_that_channel_only() {
        let mut policy = policy(10);
        policy.channel_stars.insert("100".to_string(), 2);
        let message = message();

        assert!(matches!(
            decide(state(&policy, &message, 2, None)),
            Decision::Create { count: 2, .. }
        ));
    }

    #[test]
    fn nsfw_origin_targets_nsfw_board() {
        let mut policy = policy(1);
        policy.nsfw_starboard_channel_id = Some("901".to_string());
        let mut message = message();
        message.channel_nsfw = true;

        assert_eq!(
            decide(state(&policy, &message, 1, None)),
            Decision::Create {
                channel_id: "901".to_string(),
                count: 1
            }
        );
    }
}
