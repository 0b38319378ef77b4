use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "starboard-bot", version, about = "Discord starboard bot")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    /// Overrides `logging.level` from the configuration file.
    #[arg(long, env = "STARBOARD_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_config_and_log_level() {
        let cli = Cli::parse_from(["starboard-bot", "--config", "bot.yaml", "--log-level", "debug"]);
        assert_eq!(cli.config.as_deref(), Some("bot.yaml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
