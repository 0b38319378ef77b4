#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

mod cli;
mod config;
mod db;
mod discord;
mod guild;
mod starboard;
mod utils;
mod web;

use cli::Cli;
use config::Config;
use guild::GuildSettings;
use starboard::{CachedRepostStore, Starboard};
use web::{Metrics, WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    utils::logging::init_tracing(&config.logging);
    Metrics::mark_started();

    let config = Arc::new(config);
    info!("starboard bot starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!(db_type = ?db_manager.db_type(), "database ready");

    let settings = Arc::new(GuildSettings::new(
        db_manager.guild_store(),
        config.starboard.defaults.clone(),
        Duration::from_secs(config.starboard.guild_cache_ttl_secs),
    ));
    let reposts = Arc::new(CachedRepostStore::new(
        db_manager.repost_store(),
        Duration::from_secs(config.starboard.repost_cache_ttl_secs),
    ));

    let discord_client = discord::DiscordClient::new(config.clone());
    let starboard = Starboard::new(
        Arc::new(discord_client.clone()),
        reposts,
        settings.clone(),
    );
    discord_client.bind(starboard.clone(), settings).await;

    let web_handle = config.web.enabled.then(|| {
        let web_server = WebServer::new(Arc::new(config.web.clone()), starboard.clone());
        tokio::spawn(async move {
            if let Err(e) = web_server.start().await {
                error!("web server error: {}", e);
            }
        })
    });

    let client = discord_client.clone();
    let discord_handle = tokio::spawn(async move {
        if let Err(e) = client.start().await {
            error!("discord client error: {}", e);
        }
    });

    let web_stopped = async {
        match web_handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("failed to listen for shutdown signal: {}", e),
        },
        _ = web_stopped => warn!("web server exited"),
    }

    discord_handle.abort();
    discord_client.stop().await?;
    starboard.shutdown().await;

    info!("starboard bot shutting down");
    Ok(())
}
