use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::{info, warn};

use crate::config::WebConfig;
use crate::starboard::Starboard;

mod handlers;
mod metrics;

pub use self::metrics::{Metrics, format_prometheus, uptime_seconds};

#[derive(Clone)]
pub struct WebState {
    pub starboard: Starboard,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> Option<&'static WebState> {
    WEB_STATE.get()
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(handlers::health::health_check))
        .push(Router::with_path("metrics").get(handlers::metrics::metrics))
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<WebConfig>,
}

impl WebServer {
    pub fn new(config: Arc<WebConfig>, starboard: Starboard) -> Self {
        if WEB_STATE
            .set(WebState {
                starboard,
                started_at: Instant::now(),
            })
            .is_err()
        {
            warn!("web state already initialized, keeping the first one");
        }

        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}
