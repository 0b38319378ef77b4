use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serenity::http::HttpError;
use serenity::all::{
    Channel, ChannelId, Client as SerenityClient, Context as SerenityContext, CreateEmbed,
    CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, EditMessage, EmojiId,
    EventHandler as SerenityEventHandler, GatewayIntents, Guild, GuildId, Http,
    Message as SerenityMessage, MessageId, Reaction, ReactionType, Ready, Timestamp,
    UnavailableGuild,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::guild::{GuildSettings, GuildSettingsProvider, StarEmote};
use crate::starboard::{
    BoardPost, ChatMessage, Gateway, GatewayError, MessageAttachment, MessageAuthor,
    MessageIdentity, ReactionSnapshot, Starboard, StarboardEvent,
};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT_SECONDS: u64 = 30;

/// Where ingested events go once the starboard is wired up.
#[derive(Clone)]
struct Binding {
    starboard: Starboard,
    settings: Arc<GuildSettings>,
}

#[derive(Debug, Clone)]
struct ChannelInfo {
    guild_id: Option<String>,
    name: String,
    nsfw: bool,
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

/// Serenity-backed chat platform client. Ingests gateway events into the
/// starboard and serves the [`Gateway`] operations over REST.
#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    binding: Arc<RwLock<Option<Binding>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    channel_cache: Arc<RwLock<HashMap<u64, ChannelInfo>>>,
}

#[derive(Debug, Clone, Copy)]
enum ReactionKind {
    Added,
    Removed,
}

struct StarboardEventHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    binding: Arc<RwLock<Option<Binding>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
}

impl StarboardEventHandler {
    async fn binding(&self) -> Option<Binding> {
        let binding = self.binding.read().await.clone();
        if binding.is_none() {
            debug!("ignoring discord event before starboard binding");
        }
        binding
    }

    async fn on_reaction(&self, ctx: &SerenityContext, reaction: Reaction, kind: ReactionKind) {
        let Some(binding) = self.binding().await else {
            return;
        };
        let Some(guild_id) = reaction.guild_id else {
            return;
        };
        let guild_id = guild_id.to_string();

        let policy = match binding.settings.get_policy(&guild_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return,
            Err(err) => {
                error!(guild_id, "failed to load starboard settings: {err}");
                return;
            }
        };
        let emote = policy.emote();
        if !reaction_matches(&emote, &reaction.emoji) {
            return;
        }

        let count = match star_count(&ctx.http, reaction.channel_id, reaction.message_id, &emote)
            .await
        {
            Ok(count) => count,
            // The engine purges state for vanished messages.
            Err(GatewayError::NotFound) => 0,
            Err(err) => {
                warn!(
                    channel_id = %reaction.channel_id,
                    message_id = %reaction.message_id,
                    "failed to read reaction count: {err}"
                );
                return;
            }
        };

        let target = MessageIdentity::new(
            reaction.channel_id.to_string(),
            reaction.message_id.to_string(),
        );
        let snapshot = ReactionSnapshot {
            actor_id: reaction
                .user_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            count,
        };
        let event = match kind {
            ReactionKind::Added => StarboardEvent::ReactionAdded {
                target,
                guild_id,
                snapshot,
            },
            ReactionKind::Removed => StarboardEvent::ReactionRemoved {
                target,
                guild_id,
                snapshot,
            },
        };
        binding.starboard.submit(event);
    }

    async fn on_message_deleted(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(binding) = self.binding().await else {
            return;
        };
        let Some(guild_id) = guild_id else {
            return;
        };
        binding.starboard.submit(StarboardEvent::MessageDeleted {
            target: MessageIdentity::new(channel_id.to_string(), message_id.to_string()),
            guild_id: guild_id.to_string(),
        });
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for StarboardEventHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            user = %ready.user.name,
            user_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
        *self.http.write().await = Some(ctx.http.clone());
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn reaction_add(&self, ctx: SerenityContext, add_reaction: Reaction) {
        self.on_reaction(&ctx, add_reaction, ReactionKind::Added)
            .await;
    }

    async fn reaction_remove(&self, ctx: SerenityContext, removed_reaction: Reaction) {
        self.on_reaction(&ctx, removed_reaction, ReactionKind::Removed)
            .await;
    }

    async fn reaction_remove_all(
        &self,
        ctx: SerenityContext,
        channel_id: ChannelId,
        removed_from_message_id: MessageId,
    ) {
        let Some(binding) = self.binding().await else {
            return;
        };
        let guild_id = ctx
            .cache
            .channel(channel_id)
            .map(|channel| channel.guild_id.to_string())
            .unwrap_or_default();
        binding.starboard.submit(StarboardEvent::AllReactionsCleared {
            target: MessageIdentity::new(
                channel_id.to_string(),
                removed_from_message_id.to_string(),
            ),
            guild_id,
        });
    }

    async fn reaction_remove_emoji(&self, _ctx: SerenityContext, removed_reactions: Reaction) {
        let Some(binding) = self.binding().await else {
            return;
        };
        let Some(guild_id) = removed_reactions.guild_id else {
            return;
        };
        let guild_id = guild_id.to_string();

        match binding.settings.get_policy(&guild_id).await {
            Ok(Some(policy)) if reaction_matches(&policy.emote(), &removed_reactions.emoji) => {}
            Ok(_) => return,
            Err(err) => {
                error!(guild_id, "failed to load starboard settings: {err}");
                return;
            }
        }

        binding.starboard.submit(StarboardEvent::AllReactionsCleared {
            target: MessageIdentity::new(
                removed_reactions.channel_id.to_string(),
                removed_reactions.message_id.to_string(),
            ),
            guild_id,
        });
    }

    async fn message_delete(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        self.on_message_deleted(channel_id, deleted_message_id, guild_id)
            .await;
    }

    async fn message_delete_bulk(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        multiple_deleted_messages_ids: Vec<MessageId>,
        guild_id: Option<GuildId>,
    ) {
        for message_id in unique_message_ids(multiple_deleted_messages_ids) {
            self.on_message_deleted(channel_id, message_id, guild_id)
                .await;
        }
    }

    async fn guild_create(&self, _ctx: SerenityContext, guild: Guild, _is_new: Option<bool>) {
        let Some(binding) = self.binding().await else {
            return;
        };
        if let Err(err) = binding
            .settings
            .ensure_guild(&guild.id.to_string(), &guild.name)
            .await
        {
            error!(guild_id = %guild.id, "failed to create starboard settings: {err}");
        }
    }

    async fn guild_delete(
        &self,
        _ctx: SerenityContext,
        incomplete: UnavailableGuild,
        _full: Option<Guild>,
    ) {
        // Outages also arrive as guild deletes; only a real leave drops settings.
        if incomplete.unavailable {
            return;
        }
        let Some(binding) = self.binding().await else {
            return;
        };
        if let Err(err) = binding
            .settings
            .remove_guild(&incomplete.id.to_string())
            .await
        {
            error!(guild_id = %incomplete.id, "failed to remove starboard settings: {err}");
        }
    }
}

fn unique_message_ids(ids: Vec<MessageId>) -> Vec<MessageId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn reaction_matches(emote: &StarEmote, reaction: &ReactionType) -> bool {
    match reaction {
        ReactionType::Unicode(emoji) => emote.matches_unicode(emoji),
        ReactionType::Custom { id, .. } => emote.matches_custom(id.get()),
        _ => false,
    }
}

fn reaction_type(emote: &StarEmote) -> Result<ReactionType, GatewayError> {
    match emote {
        StarEmote::Unicode(emoji) => Ok(ReactionType::Unicode(emoji.clone())),
        StarEmote::Custom { name, id, animated } => {
            if *id == 0 {
                return Err(GatewayError::InvalidId(emote.to_string()));
            }
            Ok(ReactionType::Custom {
                animated: *animated,
                id: EmojiId::new(*id),
                name: Some(name.clone()),
            })
        }
    }
}

fn parse_id(raw: &str) -> Result<u64, GatewayError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| GatewayError::InvalidId(raw.to_string()))
}

fn message_ids(id: &MessageIdentity) -> Result<(ChannelId, MessageId), GatewayError> {
    Ok((
        ChannelId::new(parse_id(&id.channel_id)?),
        MessageId::new(parse_id(&id.message_id)?),
    ))
}

fn gateway_error(err: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err
        && response.status_code.as_u16() == 404
    {
        return GatewayError::NotFound;
    }
    GatewayError::Platform(err.to_string())
}

async fn star_count(
    http: &Http,
    channel_id: ChannelId,
    message_id: MessageId,
    emote: &StarEmote,
) -> Result<u32, GatewayError> {
    let message = http
        .get_message(channel_id, message_id)
        .await
        .map_err(gateway_error)?;
    Ok(message
        .reactions
        .iter()
        .find(|reaction| reaction_matches(emote, &reaction.reaction_type))
        .map(|reaction| u32::try_from(reaction.count).unwrap_or(u32::MAX))
        .unwrap_or_default())
}

fn build_embed(post: &BoardPost) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(&post.author).url(&post.author_url);
    if let Some(icon) = &post.author_icon {
        author = author.icon_url(icon);
    }

    let mut footer = CreateEmbedFooter::new(&post.footer);
    if let Some(icon) = &post.footer_icon {
        footer = footer.icon_url(icon);
    }

    let mut embed = CreateEmbed::new()
        .author(author)
        .colour(post.colour)
        .footer(footer);

    if !post.description.is_empty() {
        embed = embed.description(&post.description);
    }
    for field in &post.fields {
        embed = embed.field(&field.name, &field.value, false);
    }
    if let Some(image) = &post.image_url {
        embed = embed.image(image);
    }
    if let Some(timestamp) = post
        .timestamp
        .as_deref()
        .and_then(|raw| Timestamp::parse(raw).ok())
    {
        embed = embed.timestamp(timestamp);
    }
    embed
}

fn to_chat_message(message: &SerenityMessage, channel: &ChannelInfo) -> ChatMessage {
    let first_embed = message.embeds.first();
    ChatMessage {
        identity: MessageIdentity::new(message.channel_id.to_string(), message.id.to_string()),
        guild_id: channel
            .guild_id
            .clone()
            .or_else(|| message.guild_id.map(|id| id.to_string())),
        author: MessageAuthor {
            id: message.author.id.to_string(),
            name: message.author.display_name().to_string(),
            avatar_url: message.author.avatar_url(),
            bot: message.author.bot,
        },
        channel_name: channel.name.clone(),
        channel_nsfw: channel.nsfw,
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| MessageAttachment {
                url: attachment.url.clone(),
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
            })
            .collect(),
        embed_image: first_embed.and_then(|embed| {
            embed
                .image
                .as_ref()
                .map(|image| image.url.clone())
                .or_else(|| embed.thumbnail.as_ref().map(|thumb| thumb.url.clone()))
        }),
        footer_text: first_embed
            .and_then(|embed| embed.footer.as_ref())
            .map(|footer| footer.text.clone()),
        reference: message.message_reference.as_ref().and_then(|reference| {
            reference.message_id.map(|id| {
                MessageIdentity::new(reference.channel_id.to_string(), id.to_string())
            })
        }),
        timestamp: Some(message.timestamp.to_string()),
    }
}

impl DiscordClient {
    pub fn new(config: Arc<Config>) -> Self {
        info!("initializing discord client");
        Self {
            config,
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            binding: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
            channel_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn bind(&self, starboard: Starboard, settings: Arc<GuildSettings>) {
        *self.binding.write().await = Some(Binding {
            starboard,
            settings,
        });
    }

    fn intents(&self) -> GatewayIntents {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MESSAGE_REACTIONS;
        if self.config.auth.use_privileged_intents {
            intents | GatewayIntents::MESSAGE_CONTENT
        } else {
            intents
        }
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = StarboardEventHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            binding: self.binding.clone(),
            http: self.http.clone(),
        };

        let mut gateway_client = SerenityClient::builder(
            self.config.auth.bot_token.expose_secret(),
            self.intents(),
        )
        .event_handler(event_handler)
        .await
        .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(
            std::time::Duration::from_secs(READY_TIMEOUT_SECONDS),
            ready_rx,
        )
        .await
        {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        *self.http.write().await = None;
        info!("discord client stopped");
        Ok(())
    }

    async fn http(&self) -> Result<Arc<Http>, GatewayError> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Platform("discord client is not connected".to_string()))
    }

    async fn channel_info(
        &self,
        http: &Http,
        channel_id: ChannelId,
    ) -> Result<ChannelInfo, GatewayError> {
        if let Some(info) = self.channel_cache.read().await.get(&channel_id.get()) {
            return Ok(info.clone());
        }

        let info = match http.get_channel(channel_id).await.map_err(gateway_error)? {
            Channel::Guild(channel) => ChannelInfo {
                guild_id: Some(channel.guild_id.to_string()),
                name: channel.name.clone(),
                nsfw: channel.nsfw,
            },
            _ => ChannelInfo {
                guild_id: None,
                name: String::new(),
                nsfw: false,
            },
        };
        self.channel_cache
            .write()
            .await
            .insert(channel_id.get(), info.clone());
        Ok(info)
    }

    async fn to_chat_message(
        &self,
        http: &Http,
        message: &SerenityMessage,
    ) -> Result<ChatMessage, GatewayError> {
        let channel = self.channel_info(http, message.channel_id).await?;
        Ok(to_chat_message(message, &channel))
    }
}

#[async_trait]
impl Gateway for DiscordClient {
    async fn fetch_message(&self, id: &MessageIdentity) -> Result<ChatMessage, GatewayError> {
        let http = self.http().await?;
        let (channel_id, message_id) = message_ids(id)?;
        let message = http
            .get_message(channel_id, message_id)
            .await
            .map_err(gateway_error)?;
        self.to_chat_message(&http, &message).await
    }

    async fn fetch_reactors(
        &self,
        id: &MessageIdentity,
        emote: &StarEmote,
    ) -> Result<Vec<String>, GatewayError> {
        let http = self.http().await?;
        let (channel_id, message_id) = message_ids(id)?;
        let reaction = reaction_type(emote)?;
        let users = http
            .get_reaction_users(
                channel_id,
                message_id,
                &reaction,
                self.config.starboard.reactor_fetch_limit,
                None,
            )
            .await
            .map_err(gateway_error)?;
        Ok(users.into_iter().map(|user| user.id.to_string()).collect())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError> {
        let http = self.http().await?;
        let channel_id = ChannelId::new(parse_id(channel_id)?);
        let message = channel_id
            .send_message(&*http, CreateMessage::new().embed(build_embed(post)))
            .await
            .map_err(gateway_error)?;
        debug!(channel_id = %channel_id, message_id = %message.id, "sent board post");
        self.to_chat_message(&http, &message).await
    }

    async fn edit_message(
        &self,
        id: &MessageIdentity,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError> {
        let http = self.http().await?;
        let (channel_id, message_id) = message_ids(id)?;
        let message = channel_id
            .edit_message(
                &*http,
                message_id,
                EditMessage::new().embed(build_embed(post)),
            )
            .await
            .map_err(gateway_error)?;
        self.to_chat_message(&http, &message).await
    }

    async fn delete_message(&self, id: &MessageIdentity) -> Result<(), GatewayError> {
        let http = self.http().await?;
        let (channel_id, message_id) = message_ids(id)?;
        http.delete_message(channel_id, message_id, None)
            .await
            .map_err(gateway_error)
    }
}
