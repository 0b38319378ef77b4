use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::types::{ChatMessage, MessageAttachment, MessageIdentity};
use crate::guild::{GuildPolicy, StarEmote};

const SELF_STARRED_SUFFIX: &str = " | self-starred";
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "gif", "png", "webp"];

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>]+").expect("url pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostField {
    pub name: String,
    pub value: String,
}

/// Everything the gateway needs to render a board post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPost {
    pub author: String,
    pub author_icon: Option<String>,
    pub author_url: String,
    pub description: String,
    pub image_url: Option<String>,
    pub fields: Vec<PostField>,
    pub colour: u32,
    pub footer: String,
    pub footer_icon: Option<String>,
    pub timestamp: Option<String>,
}

impl BoardPost {
    pub fn render(
        message: &ChatMessage,
        guild_id: &str,
        policy: &GuildPolicy,
        count: u32,
        self_starred: bool,
    ) -> Self {
        let jump = jump_url(guild_id, &message.identity);
        let mut description = message.content.clone();
        let mut fields = vec![PostField {
            name: "Original message".to_string(),
            value: link(&jump),
        }];

        if let Some(reference) = &message.reference {
            fields.push(PostField {
                name: "Reply to".to_string(),
                value: link(&jump_url(guild_id, reference)),
            });
        }

        let image_url = match message.attachments.split_first() {
            Some((first, rest)) => {
                let image = is_image_attachment(first).then(|| first.url.clone());
                if image.is_none() {
                    fields.push(PostField {
                        name: "Attachment".to_string(),
                        value: link(&first.url),
                    });
                }
                for (index, attachment) in rest.iter().enumerate() {
                    fields.push(PostField {
                        name: format!("Attachment {}", index + 2),
                        value: link(&attachment.url),
                    });
                }
                image
            }
            None => match first_image_url(&message.content) {
                Some(found) => {
                    description = description.replacen(&found, "", 1).trim().to_string();
                    Some(found)
                }
                None => message.embed_image.clone(),
            },
        };

        let emote = policy.emote();
        Self {
            author: format!("{} in #{}", message.author.name, message.channel_name),
            author_icon: message.author.avatar_url.clone(),
            author_url: jump,
            description,
            image_url,
            fields,
            colour: policy.embed_colour,
            footer: footer_text(&emote, count, self_starred && policy.allow_self_star),
            footer_icon: emote.icon_url(),
            timestamp: message.timestamp.clone(),
        }
    }
}

pub fn jump_url(guild_id: &str, id: &MessageIdentity) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild_id, id.channel_id, id.message_id
    )
}

/// `"⭐ N"` for unicode emotes, `"N"` for custom ones (their image is the
/// footer icon instead).
pub fn footer_text(emote: &StarEmote, count: u32, self_starred: bool) -> String {
    let mut text = match emote {
        StarEmote::Unicode(emoji) => format!("{emoji} {count}"),
        StarEmote::Custom { .. } => count.to_string(),
    };
    if self_starred {
        text.push_str(SELF_STARRED_SUFFIX);
    }
    text
}

/// Reads the star count back out of a board post footer.
pub fn parse_displayed_count(footer: &str) -> Option<u32> {
    let footer = footer.split(" | ").next().unwrap_or(footer);
    footer
        .split_whitespace()
        .find_map(|token| token.parse::<u32>().ok())
}

pub fn footer_shows_self_star(footer: &str) -> bool {
    footer.ends_with(SELF_STARRED_SUFFIX)
}

fn first_image_url(content: &str) -> Option<String> {
    URL_REGEX
        .find_iter(content)
        .map(|m| m.as_str())
        .find(|candidate| Url::parse(candidate).is_ok_and(|url| has_image_extension(url.path())))
        .map(ToString::to_string)
}

fn is_image_attachment(attachment: &MessageAttachment) -> bool {
    if let Some(content_type) = &attachment.content_type {
        return content_type.starts_with("image/");
    }
    has_image_extension(&attachment.filename)
        || Url::parse(&attachment.url).is_ok_and(|url| has_image_extension(url.path()))
}

fn has_image_extension(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

fn link(url: &str) -> String {
    format!("[Jump]({url})")
}
