use super::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub starboard: StarboardConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub bot_token: SecretString,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub conn_string: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("sqlite://") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref conn) = self.conn_string {
            conn.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

/// Runtime knobs for the starboard core plus the policy handed to newly
/// joined guilds.
#[derive(Debug, Clone, Deserialize)]
pub struct StarboardConfig {
    #[serde(default = "default_repost_cache_ttl_secs")]
    pub repost_cache_ttl_secs: u64,
    #[serde(default = "default_guild_cache_ttl_secs")]
    pub guild_cache_ttl_secs: u64,
    #[serde(default = "default_reactor_fetch_limit")]
    pub reactor_fetch_limit: u8,
    #[serde(default)]
    pub defaults: PolicyDefaults,
}

impl Default for StarboardConfig {
    fn default() -> Self {
        Self {
            repost_cache_ttl_secs: default_repost_cache_ttl_secs(),
            guild_cache_ttl_secs: default_guild_cache_ttl_secs(),
            reactor_fetch_limit: default_reactor_fetch_limit(),
            defaults: PolicyDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyDefaults {
    #[serde(default = "default_star_emote")]
    pub star_emote: String,
    #[serde(default = "default_stars_required")]
    pub stars_required: u32,
    #[serde(default = "default_allow_self_star")]
    pub allow_self_star: bool,
    #[serde(default)]
    pub ignore_bots: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_embed_colour")]
    pub embed_colour: u32,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            star_emote: default_star_emote(),
            stars_required: default_stars_required(),
            allow_self_star: default_allow_self_star(),
            ignore_bots: false,
            enabled: default_enabled(),
            embed_colour: default_embed_colour(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(ToString::to_string)
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bot_token.expose_secret().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.starboard.defaults.stars_required == 0 {
            return Err(ConfigError::InvalidConfig(
                "starboard.defaults.stars_required must be at least 1".to_string(),
            ));
        }

        if self.starboard.defaults.star_emote.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "starboard.defaults.star_emote cannot be empty".to_string(),
            ));
        }

        if self.starboard.repost_cache_ttl_secs == 0 || self.starboard.guild_cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "starboard cache ttls must be greater than zero".to_string(),
            ));
        }

        if self.starboard.reactor_fetch_limit == 0 || self.starboard.reactor_fetch_limit > 100 {
            return Err(ConfigError::InvalidConfig(
                "starboard.reactor_fetch_limit must be between 1 and 100".to_string(),
            ));
        }

        if self.web.enabled && self.web.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "web.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("STARBOARD_BOT_TOKEN") {
            self.auth.bot_token = SecretString::from(value);
        }
        if let Ok(value) = std::env::var("STARBOARD_DATABASE_URL") {
            self.database.url = Some(value);
        }
    }
}

fn default_use_privileged_intents() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_repost_cache_ttl_secs() -> u64 {
    10 * 60 * 60
}

fn default_guild_cache_ttl_secs() -> u64 {
    300
}

fn default_reactor_fetch_limit() -> u8 {
    100
}

fn default_star_emote() -> String {
    "⭐".to_string()
}

fn default_stars_required() -> u32 {
    5
}

fn default_allow_self_star() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn default_embed_colour() -> u32 {
    4431601
}

fn default_port() -> u16 {
    9005
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
