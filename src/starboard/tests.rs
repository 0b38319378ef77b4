use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    BoardPost, ChatMessage, Gateway, GatewayError, MessageAuthor, MessageIdentity,
    ReactionSnapshot, RepostRecord, Starboard, StarboardEvent,
};
use crate::config::PolicyDefaults;
use crate::db::{DatabaseError, RepostStore};
use crate::guild::{GuildPolicy, GuildSettingsProvider, SettingsError, StarEmote};

const GUILD: &str = "g1";
const CHANNEL: &str = "100";
const BOARD_CHANNEL: &str = "900";
const AUTHOR: &str = "7";

#[derive(Default)]
struct FakeGateway {
    messages: Mutex<HashMap<MessageIdentity, ChatMessage>>,
    reactors: Mutex<HashMap<MessageIdentity, Vec<String>>>,
    calls: Mutex<Vec<String>>,
    next_id: Mutex<u64>,
}

impl FakeGateway {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn board_posts(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .values()
            .filter(|m| m.identity.channel_id == BOARD_CHANNEL)
            .cloned()
            .collect()
    }

    fn forget(&self, id: &MessageIdentity) {
        self.messages.lock().remove(id);
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn fetch_message(&self, id: &MessageIdentity) -> Result<ChatMessage, GatewayError> {
        self.messages
            .lock()
            .get(id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    async fn fetch_reactors(
        &self,
        id: &MessageIdentity,
        _emote: &StarEmote,
    ) -> Result<Vec<String>, GatewayError> {
        Ok(self.reactors.lock().get(id).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError> {
        let message_id = {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("b{}", *next)
        };
        let mut message = original(&message_id);
        message.identity = MessageIdentity::new(channel_id, message_id);
        message.footer_text = Some(post.footer.clone());
        self.calls.lock().push(format!("send {}", message.identity));
        self.messages
            .lock()
            .insert(message.identity.clone(), message.clone());
        Ok(message)
    }

    async fn edit_message(
        &self,
        id: &MessageIdentity,
        post: &BoardPost,
    ) -> Result<ChatMessage, GatewayError> {
        self.calls.lock().push(format!("edit {id}"));
        let mut messages = self.messages.lock();
        let message = messages.get_mut(id).ok_or(GatewayError::NotFound)?;
        message.footer_text = Some(post.footer.clone());
        Ok(message.clone())
    }

    async fn delete_message(&self, id: &MessageIdentity) -> Result<(), GatewayError> {
        self.calls.lock().push(format!("delete {id}"));
        self.messages
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or(GatewayError::NotFound)
    }
}

#[derive(Default)]
struct MemoryRepostStore {
    records: Mutex<HashMap<MessageIdentity, RepostRecord>>,
}

impl MemoryRepostStore {
    fn get(&self, original: &MessageIdentity) -> Option<RepostRecord> {
        self.records.lock().get(original).cloned()
    }
}

#[async_trait]
impl RepostStore for MemoryRepostStore {
    async fn get_repost(
        &self,
        original: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        Ok(self.get(original))
    }

    async fn get_repost_by_board(
        &self,
        board: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        Ok(self
            .records
            .lock()
            .values()
            .find(|record| &record.board == board)
            .cloned())
    }

    async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError> {
        self.records
            .lock()
            .insert(record.original.clone(), record.clone());
        Ok(())
    }

    async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError> {
        self.records.lock().remove(original);
        Ok(())
    }
}

struct FixedSettings {
    policy: Mutex<Option<Arc<GuildPolicy>>>,
}

impl FixedSettings {
    fn update(&self, change: impl FnOnce(&mut GuildPolicy)) {
        let mut slot = self.policy.lock();
        if let Some(current) = slot.as_ref() {
            let mut policy = GuildPolicy::clone(current);
            change(&mut policy);
            *slot = Some(Arc::new(policy));
        }
    }
}

#[async_trait]
impl GuildSettingsProvider for FixedSettings {
    async fn get_policy(&self, guild_id: &str) -> Result<Option<Arc<GuildPolicy>>, SettingsError> {
        Ok(self
            .policy
            .lock()
            .clone()
            .filter(|policy| policy.guild_id == guild_id))
    }
}

struct Harness {
    gateway: Arc<FakeGateway>,
    reposts: Arc<MemoryRepostStore>,
    settings: Arc<FixedSettings>,
    starboard: Starboard,
}

impl Harness {
    fn new(stars_required: u32) -> Self {
        let mut policy = GuildPolicy::with_defaults(GUILD, "Guild", &PolicyDefaults::default());
        policy.stars_required = stars_required;
        policy.starboard_channel_id = Some(BOARD_CHANNEL.to_string());

        let gateway = Arc::new(FakeGateway::default());
        let reposts = Arc::new(MemoryRepostStore::default());
        let settings = Arc::new(FixedSettings {
            policy: Mutex::new(Some(Arc::new(policy))),
        });
        let starboard = Starboard::new(gateway.clone(), reposts.clone(), settings.clone());

        let message = original("1");
        gateway
            .messages
            .lock()
            .insert(message.identity.clone(), message);

        Self {
            gateway,
            reposts,
            settings,
            starboard,
        }
    }

    async fn run(&self, events: impl IntoIterator<Item = StarboardEvent>) {
        for event in events {
            assert!(self.starboard.submit(event));
        }
        self.starboard.wait_idle().await;
    }

    fn record(&self) -> Option<RepostRecord> {
        self.reposts.get(&target())
    }
}

fn target() -> MessageIdentity {
    MessageIdentity::new(CHANNEL, "1")
}

fn original(message_id: &str) -> ChatMessage {
    ChatMessage {
        identity: MessageIdentity::new(CHANNEL, message_id),
        guild_id: Some(GUILD.to_string()),
        author: MessageAuthor {
            id: AUTHOR.to_string(),
            name: "alice".to_string(),
            avatar_url: None,
            bot: false,
        },
        channel_name: "general".to_string(),
        channel_nsfw: false,
        content: "look at this".to_string(),
        attachments: Vec::new(),
        embed_image: None,
        footer_text: None,
        reference: None,
        timestamp: None,
    }
}

fn snapshot(count: u32) -> ReactionSnapshot {
    ReactionSnapshot {
        actor_id: "55".to_string(),
        count,
    }
}

fn added(count: u32) -> StarboardEvent {
    StarboardEvent::ReactionAdded {
        target: target(),
        guild_id: GUILD.to_string(),
        snapshot: snapshot(count),
    }
}

fn removed(count: u32) -> StarboardEvent {
    StarboardEvent::ReactionRemoved {
        target: target(),
        guild_id: GUILD.to_string(),
        snapshot: snapshot(count),
    }
}

fn deleted(target: MessageIdentity) -> StarboardEvent {
    StarboardEvent::MessageDeleted {
        target,
        guild_id: GUILD.to_string(),
    }
}

#[tokio::test]
async fn board_post_created_once_threshold_is_reached() {
    let harness = Harness::new(3);

    harness.run([added(2)]).await;
    assert!(harness.gateway.calls().is_empty());
    assert!(harness.record().is_none());

    harness.run([added(3)]).await;
    assert_eq!(harness.gateway.calls(), ["send 900/b1"]);
    let record = harness.record().unwrap();
    assert_eq!(record.board, MessageIdentity::new(BOARD_CHANNEL, "b1"));
    assert_eq!(record.guild_id, GUILD);
    assert_eq!(
        harness.gateway.board_posts()[0].footer_text.as_deref(),
        Some("⭐ 3")
    );
}

#[tokio::test]
async fn board_post_removed_when_count_halves() {
    let harness = Harness::new(4);
    harness.run([added(4)]).await;
    assert!(harness.record().is_some());

    harness.run([removed(2)]).await;

    assert_eq!(harness.gateway.calls(), ["send 900/b1", "delete 900/b1"]);
    assert!(harness.record().is_none());
    assert!(harness.gateway.board_posts().is_empty());
}

#[tokio::test]
async fn deleting_the_original_removes_its_board_post() {
    let harness = Harness::new(3);
    harness.run([added(3)]).await;

    harness.gateway.forget(&target());
    harness.run([deleted(target())]).await;

    assert_eq!(harness.gateway.calls(), ["send 900/b1", "delete 900/b1"]);
    assert!(harness.record().is_none());
    assert_eq!(harness.starboard.active_workers(), 0);
}

#[tokio::test]
async fn manually_deleted_board_post_only_drops_the_record() {
    let harness = Harness::new(3);
    harness.run([added(3)]).await;

    let board = MessageIdentity::new(BOARD_CHANNEL, "b1");
    harness.gateway.forget(&board);
    harness.run([deleted(board)]).await;

    assert_eq!(harness.gateway.calls(), ["send 900/b1"]);
    assert!(harness.record().is_none());
}

#[tokio::test]
async fn recrossing_the_threshold_keeps_a_single_board_post() {
    let harness = Harness::new(3);

    harness
        .run([added(3), added(3), added(4), removed(1), added(2), added(3)])
        .await;

    assert_eq!(harness.gateway.count_calls("send"), 2);
    assert_eq!(harness.gateway.count_calls("delete"), 1);
    assert_eq!(harness.gateway.board_posts().len(), 1);
    assert_eq!(
        harness.record().map(|r| r.board),
        Some(MessageIdentity::new(BOARD_CHANNEL, "b2"))
    );
}

#[tokio::test]
async fn unchanged_count_does_not_edit() {
    let harness = Harness::new(3);
    harness.run([added(3), added(3), removed(3)]).await;
    assert_eq!(harness.gateway.count_calls("edit"), 0);

    harness.run([added(4)]).await;
    assert_eq!(harness.gateway.count_calls("edit"), 1);
    assert_eq!(
        harness.gateway.board_posts()[0].footer_text.as_deref(),
        Some("⭐ 4")
    );
}

#[tokio::test]
async fn edit_and_removal_follow_the_half_threshold() {
    let harness = Harness::new(10);

    harness.run([added(10), removed(6)]).await;
    assert_eq!(harness.gateway.count_calls("edit"), 1);
    assert!(harness.record().is_some());

    harness.run([removed(5)]).await;
    assert_eq!(harness.gateway.count_calls("delete"), 1);
    assert!(harness.record().is_none());
}

#[tokio::test]
async fn own_reaction_does_not_count_when_self_star_is_off() {
    let harness = Harness::new(5);
    harness.settings.update(|policy| policy.allow_self_star = false);
    harness
        .gateway
        .reactors
        .lock()
        .insert(target(), vec![AUTHOR.to_string(), "55".to_string()]);

    harness.run([added(5)]).await;
    assert!(harness.gateway.calls().is_empty());

    harness.run([added(6)]).await;
    assert_eq!(harness.gateway.count_calls("send"), 1);
    assert_eq!(
        harness.gateway.board_posts()[0].footer_text.as_deref(),
        Some("⭐ 5")
    );
}

#[tokio::test]
async fn allowed_self_star_is_noted_in_the_footer() {
    let harness = Harness::new(2);
    harness
        .gateway
        .reactors
        .lock()
        .insert(target(), vec![AUTHOR.to_string()]);

    harness.run([added(2)]).await;

    assert_eq!(
        harness.gateway.board_posts()[0].footer_text.as_deref(),
        Some("⭐ 2 | self-starred")
    );
}

#[tokio::test]
async fn vanished_board_post_purges_the_record() {
    let harness = Harness::new(3);
    harness.run([added(3)]).await;
    harness
        .gateway
        .forget(&MessageIdentity::new(BOARD_CHANNEL, "b1"));

    harness.run([added(5)]).await;

    assert!(harness.record().is_none());
    assert_eq!(harness.gateway.count_calls("edit"), 0);
}

#[tokio::test]
async fn vanished_original_purges_the_record() {
    let harness = Harness::new(3);
    harness.run([added(3)]).await;
    harness.gateway.forget(&target());

    harness.run([added(4)]).await;

    assert!(harness.record().is_none());
    assert_eq!(harness.gateway.count_calls("edit"), 0);
}

#[tokio::test]
async fn cleared_reactions_remove_the_board_post() {
    let harness = Harness::new(3);
    harness.run([added(3)]).await;

    harness
        .run([StarboardEvent::AllReactionsCleared {
            target: target(),
            guild_id: GUILD.to_string(),
        }])
        .await;

    assert!(harness.record().is_none());
    assert!(harness.gateway.board_posts().is_empty());
}

#[tokio::test]
async fn disabled_guild_ignores_reactions() {
    let harness = Harness::new(1);
    harness.settings.update(|policy| policy.enabled = false);

    harness.run([added(5)]).await;

    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn unknown_guild_ignores_reactions() {
    let harness = Harness::new(1);
    *harness.settings.policy.lock() = None;

    harness.run([added(5)]).await;

    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn shutdown_refuses_further_events() {
    let harness = Harness::new(1);
    harness.run([added(1)]).await;

    harness.starboard.shutdown().await;

    assert!(!harness.starboard.submit(added(2)));
    assert_eq!(harness.gateway.count_calls("send"), 1);
}
