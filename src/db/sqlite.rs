use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::schema_sqlite::{guild_settings, reposts};
use crate::guild::GuildPolicy;
use crate::starboard::{MessageIdentity, RepostRecord};

use super::{DatabaseError, models::GuildColumns};

const BUSY_TIMEOUT_MS: u32 = 5_000;

fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid datetime format: {}", e)))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reposts)]
struct DbRepost {
    #[allow(dead_code)]
    id: i32,
    original_channel_id: String,
    original_message_id: String,
    board_channel_id: String,
    board_message_id: String,
    guild_id: String,
    created_at: String,
}

impl DbRepost {
    fn to_record(&self) -> Result<RepostRecord, DatabaseError> {
        Ok(RepostRecord {
            original: MessageIdentity::new(&self.original_channel_id, &self.original_message_id),
            board: MessageIdentity::new(&self.board_channel_id, &self.board_message_id),
            guild_id: self.guild_id.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = reposts)]
struct NewRepost<'a> {
    original_channel_id: &'a str,
    original_message_id: &'a str,
    board_channel_id: &'a str,
    board_message_id: &'a str,
    guild_id: &'a str,
    created_at: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = reposts)]
struct UpdateRepost<'a> {
    board_channel_id: &'a str,
    board_message_id: &'a str,
    guild_id: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = guild_settings)]
struct DbGuild {
    guild_id: String,
    name: String,
    star_emote: String,
    stars_required: i32,
    channel_stars: String,
    allow_self_star: bool,
    ignore_bots: bool,
    blacklisted_users: String,
    banned_channels: String,
    starboard_channel_id: Option<String>,
    nsfw_starboard_channel_id: Option<String>,
    enabled: bool,
    embed_colour: i32,
}

impl DbGuild {
    fn into_policy(self) -> Result<GuildPolicy, DatabaseError> {
        GuildColumns {
            guild_id: self.guild_id,
            name: self.name,
            star_emote: self.star_emote,
            stars_required: self.stars_required,
            channel_stars: self.channel_stars,
            allow_self_star: self.allow_self_star,
            ignore_bots: self.ignore_bots,
            blacklisted_users: self.blacklisted_users,
            banned_channels: self.banned_channels,
            starboard_channel_id: self.starboard_channel_id,
            nsfw_starboard_channel_id: self.nsfw_starboard_channel_id,
            enabled: self.enabled,
            embed_colour: self.embed_colour,
        }
        .into_policy()
    }
}

#[derive(Insertable)]
#[diesel(table_name = guild_settings)]
struct NewGuild<'a> {
    guild_id: &'a str,
    name: &'a str,
    star_emote: &'a str,
    stars_required: i32,
    channel_stars: &'a str,
    allow_self_star: bool,
    ignore_bots: bool,
    blacklisted_users: &'a str,
    banned_channels: &'a str,
    starboard_channel_id: Option<&'a str>,
    nsfw_starboard_channel_id: Option<&'a str>,
    enabled: bool,
    embed_colour: i32,
    updated_at: String,
}

impl<'a> NewGuild<'a> {
    fn from_columns(columns: &'a GuildColumns) -> Self {
        Self {
            guild_id: &columns.guild_id,
            name: &columns.name,
            star_emote: &columns.star_emote,
            stars_required: columns.stars_required,
            channel_stars: &columns.channel_stars,
            allow_self_star: columns.allow_self_star,
            ignore_bots: columns.ignore_bots,
            blacklisted_users: &columns.blacklisted_users,
            banned_channels: &columns.banned_channels,
            starboard_channel_id: columns.starboard_channel_id.as_deref(),
            nsfw_starboard_channel_id: columns.nsfw_starboard_channel_id.as_deref(),
            enabled: columns.enabled,
            embed_colour: columns.embed_colour,
            updated_at: datetime_to_string(&Utc::now()),
        }
    }
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    // Workers for different messages write concurrently through separate connections.
    conn.batch_execute(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"))
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

pub struct SqliteRepostStore {
    db_path: Arc<String>,
}

impl SqliteRepostStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::RepostStore for SqliteRepostStore {
    async fn get_repost(
        &self,
        original: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        let original = original.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::reposts::dsl::*;
            reposts
                .filter(original_channel_id.eq(&original.channel_id))
                .filter(original_message_id.eq(&original.message_id))
                .select(DbRepost::as_select())
                .first::<DbRepost>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|r| r.to_record())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_repost_by_board(
        &self,
        board: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        let board = board.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::reposts::dsl::*;
            reposts
                .filter(board_channel_id.eq(&board.channel_id))
                .filter(board_message_id.eq(&board.message_id))
                .select(DbRepost::as_select())
                .first::<DbRepost>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|r| r.to_record())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError> {
        let record = record.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::reposts::dsl::*;

            let existing = reposts
                .filter(original_channel_id.eq(&record.original.channel_id))
                .filter(original_message_id.eq(&record.original.message_id))
                .select(id)
                .first::<i32>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if let Some(existing_id) = existing {
                let changes = UpdateRepost {
                    board_channel_id: &record.board.channel_id,
                    board_message_id: &record.board.message_id,
                    guild_id: &record.guild_id,
                };

                diesel::update(reposts.filter(id.eq(existing_id)))
                    .set(changes)
                    .execute(&mut conn)
                    .map(|_| ())
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            } else {
                let new_repost = NewRepost {
                    original_channel_id: &record.original.channel_id,
                    original_message_id: &record.original.message_id,
                    board_channel_id: &record.board.channel_id,
                    board_message_id: &record.board.message_id,
                    guild_id: &record.guild_id,
                    created_at: datetime_to_string(&record.created_at),
                };

                diesel::insert_into(reposts)
                    .values(new_repost)
                    .execute(&mut conn)
                    .map(|_| ())
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            }
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError> {
        let original = original.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::reposts::dsl::*;
            diesel::delete(
                reposts
                    .filter(original_channel_id.eq(&original.channel_id))
                    .filter(original_message_id.eq(&original.message_id)),
            )
            .execute(&mut conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

pub struct SqliteGuildStore {
    db_path: Arc<String>,
}

impl SqliteGuildStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::GuildStore for SqliteGuildStore {
    async fn get_guild(&self, id_param: &str) -> Result<Option<GuildPolicy>, DatabaseError> {
        let id_param = id_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::guild_settings::dsl::*;
            guild_settings
                .filter(guild_id.eq(id_param))
                .select(DbGuild::as_select())
                .first::<DbGuild>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(DbGuild::into_policy)
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn upsert_guild(&self, policy: &GuildPolicy) -> Result<(), DatabaseError> {
        let columns = GuildColumns::from_policy(policy)?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::replace_into(guild_settings::table)
                .values(NewGuild::from_columns(&columns))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_guild(&self, id_param: &str) -> Result<(), DatabaseError> {
        let id_param = id_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::guild_settings::dsl::*;
            diesel::delete(guild_settings.filter(guild_id.eq(id_param)))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
