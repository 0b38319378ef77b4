use salvo::prelude::*;
use serde_json::{Value, json};

use crate::web::{WebState, uptime_seconds, web_state};

fn health_payload(state: &WebState) -> Value {
    json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "process_uptime_seconds": uptime_seconds(),
        "active_workers": state.starboard.active_workers(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

#[handler]
pub async fn health_check(res: &mut Response) {
    match web_state() {
        Some(state) => res.render(Json(health_payload(state))),
        None => {
            res.status_code(StatusCode::SERVICE_UNAVAILABLE);
            res.render(Json(json!({ "status": "starting" })));
        }
    }
}
