use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::schema::{guild_settings, reposts};
use crate::guild::GuildPolicy;
use crate::starboard::{MessageIdentity, RepostRecord};

use super::{DatabaseError, models::GuildColumns};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reposts)]
struct DbRepost {
    #[allow(dead_code)]
    id: i64,
    original_channel_id: String,
    original_message_id: String,
    board_channel_id: String,
    board_message_id: String,
    guild_id: String,
    created_at: DateTime<Utc>,
}

impl From<DbRepost> for RepostRecord {
    fn from(value: DbRepost) -> Self {
        Self {
            original: MessageIdentity::new(value.original_channel_id, value.original_message_id),
            board: MessageIdentity::new(value.board_channel_id, value.board_message_id),
            guild_id: value.guild_id,
            created_at: value.created_at,
        }
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
    created_at: &'a DateTime<Utc>,
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

impl From<DbGuild> for GuildColumns {
    fn from(value: DbGuild) -> Self {
        Self {
            guild_id: value.guild_id,
            name: value.name,
            star_emote: value.star_emote,
            stars_required: value.stars_required,
            channel_stars: value.channel_stars,
            allow_self_star: value.allow_self_star,
            ignore_bots: value.ignore_bots,
            blacklisted_users: value.blacklisted_users,
            banned_channels: value.banned_channels,
            starboard_channel_id: value.starboard_channel_id,
            nsfw_starboard_channel_id: value.nsfw_starboard_channel_id,
            enabled: value.enabled,
            embed_colour: value.embed_colour,
        }
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = guild_settings, treat_none_as_null = true)]
struct GuildRow<'a> {
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
    updated_at: DateTime<Utc>,
}

impl<'a> GuildRow<'a> {
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
            updated_at: Utc::now(),
        }
    }
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresRepostStore {
    pool: Pool,
}

impl PostgresRepostStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::RepostStore for PostgresRepostStore {
    async fn get_repost(
        &self,
        original: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        let original = original.clone();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::reposts::dsl::*;
            reposts
                .filter(original_channel_id.eq(&original.channel_id))
                .filter(original_message_id.eq(&original.message_id))
                .select(DbRepost::as_select())
                .first::<DbRepost>(conn)
                .optional()
                .map(|r| r.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_repost_by_board(
        &self,
        board: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        let board = board.clone();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::reposts::dsl::*;
            reposts
                .filter(board_channel_id.eq(&board.channel_id))
                .filter(board_message_id.eq(&board.message_id))
                .select(DbRepost::as_select())
                .first::<DbRepost>(conn)
                .optional()
                .map(|r| r.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError> {
        let record = record.clone();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::reposts::dsl::*;
            let new_repost = NewRepost {
                original_channel_id: &record.original.channel_id,
                original_message_id: &record.original.message_id,
                board_channel_id: &record.board.channel_id,
                board_message_id: &record.board.message_id,
                guild_id: &record.guild_id,
                created_at: &record.created_at,
            };
            let changes = UpdateRepost {
                board_channel_id: &record.board.channel_id,
                board_message_id: &record.board.message_id,
                guild_id: &record.guild_id,
            };

            diesel::insert_into(reposts)
                .values(&new_repost)
                .on_conflict((original_channel_id, original_message_id))
                .do_update()
                .set(&changes)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError> {
        let original = original.clone();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::reposts::dsl::*;
            diesel::delete(
                reposts
                    .filter(original_channel_id.eq(&original.channel_id))
                    .filter(original_message_id.eq(&original.message_id)),
            )
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresGuildStore {
    pool: Pool,
}

impl PostgresGuildStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::GuildStore for PostgresGuildStore {
    async fn get_guild(&self, id_param: &str) -> Result<Option<GuildPolicy>, DatabaseError> {
        let id_param = id_param.to_string();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::guild_settings::dsl::*;
            guild_settings
                .filter(guild_id.eq(id_param))
                .select(DbGuild::as_select())
                .first::<DbGuild>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|row| GuildColumns::from(row).into_policy())
                .transpose()
        })
        .await
    }

    async fn upsert_guild(&self, policy: &GuildPolicy) -> Result<(), DatabaseError> {
        let columns = GuildColumns::from_policy(policy)?;
        with_connection(self.pool.clone(), move |conn| {
            let row = GuildRow::from_columns(&columns);
            diesel::insert_into(guild_settings::table)
                .values(&row)
                .on_conflict(guild_settings::guild_id)
                .do_update()
                .set(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_guild(&self, id_param: &str) -> Result<(), DatabaseError> {
        let id_param = id_param.to_string();
        with_connection(self.pool.clone(), move |conn| {
            use crate::db::schema::guild_settings::dsl::*;
            diesel::delete(guild_settings.filter(guild_id.eq(id_param)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
