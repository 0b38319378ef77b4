mod policy;
mod settings;

pub use policy::{GuildPolicy, StarEmote};
pub use settings::{GuildSettings, GuildSettingsProvider, SettingChange, SettingsError};
