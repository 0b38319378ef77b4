pub use self::parser::{
    AuthConfig, Config, DatabaseConfig, DbType, LoggingConfig, PolicyDefaults, StarboardConfig,
    WebConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
