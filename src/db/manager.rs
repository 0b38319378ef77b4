use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{DatabaseError, GuildStore, RepostStore};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{PostgresGuildStore, PostgresRepostStore};
#[cfg(feature = "postgres")]
use diesel::RunQueryDsl;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteGuildStore, SqliteRepostStore, establish_connection};

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    repost_store: Arc<dyn RepostStore>,
    guild_store: Arc<dyn GuildStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let connection_string = config.connection_string();
                let max_connections = config.max_connections();
                let min_connections = config.min_connections();

                let manager = ConnectionManager::<PgConnection>::new(connection_string);

                let builder = r2d2::Pool::builder()
                    .max_size(max_connections.unwrap_or(10))
                    .min_idle(Some(min_connections.unwrap_or(1)));

                let pool = builder
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                let repost_store = Arc::new(PostgresRepostStore::new(pool.clone()));
                let guild_store = Arc::new(PostgresGuildStore::new(pool.clone()));

                Ok(Self {
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    repost_store,
                    guild_store,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite database path is not configured".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                let repost_store = Arc::new(SqliteRepostStore::new(path_arc.clone()));
                let guild_store = Arc::new(SqliteGuildStore::new(path_arc));

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    sqlite_path: Some(path),
                    repost_store,
                    guild_store,
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let pool = self.postgres_pool.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("postgres pool is not initialised".to_string())
                })?;
                Self::migrate_postgres(pool).await
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = self.sqlite_path.as_ref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path is not initialised".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS reposts (
                    id BIGSERIAL PRIMARY KEY,
                    original_channel_id TEXT NOT NULL,
                    original_message_id TEXT NOT NULL,
                    board_channel_id TEXT NOT NULL,
                    board_message_id TEXT NOT NULL,
                    guild_id TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                    UNIQUE (original_channel_id, original_message_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS guild_settings (
                    guild_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    star_emote TEXT NOT NULL,
                    stars_required INTEGER NOT NULL,
                    channel_stars TEXT NOT NULL DEFAULT '{}',
                    allow_self_star BOOLEAN NOT NULL,
                    ignore_bots BOOLEAN NOT NULL,
                    blacklisted_users TEXT NOT NULL DEFAULT '[]',
                    banned_channels TEXT NOT NULL DEFAULT '[]',
                    starboard_channel_id TEXT,
                    nsfw_starboard_channel_id TEXT,
                    enabled BOOLEAN NOT NULL,
                    embed_colour INTEGER NOT NULL,
                    updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_reposts_board ON reposts(board_channel_id, board_message_id)",
                "CREATE INDEX IF NOT EXISTS idx_reposts_guild ON reposts(guild_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        use diesel::RunQueryDsl;

        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS reposts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    original_channel_id TEXT NOT NULL,
                    original_message_id TEXT NOT NULL,
                    board_channel_id TEXT NOT NULL,
                    board_message_id TEXT NOT NULL,
                    guild_id TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (original_channel_id, original_message_id)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS guild_settings (
                    guild_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    star_emote TEXT NOT NULL,
                    stars_required INTEGER NOT NULL,
                    channel_stars TEXT NOT NULL DEFAULT '{}',
                    allow_self_star BOOLEAN NOT NULL,
                    ignore_bots BOOLEAN NOT NULL,
                    blacklisted_users TEXT NOT NULL DEFAULT '[]',
                    banned_channels TEXT NOT NULL DEFAULT '[]',
                    starboard_channel_id TEXT,
                    nsfw_starboard_channel_id TEXT,
                    enabled BOOLEAN NOT NULL,
                    embed_colour INTEGER NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_reposts_board ON reposts(board_channel_id, board_message_id)",
                "CREATE INDEX IF NOT EXISTS idx_reposts_guild ON reposts(guild_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn repost_store(&self) -> Arc<dyn RepostStore> {
        self.repost_store.clone()
    }

    pub fn guild_store(&self) -> Arc<dyn GuildStore> {
        self.guild_store.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}
