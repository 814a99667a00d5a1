use std::time::Duration;

use anyhow::Context;
use locator::config::Settings;
use locator::server::{serve as serve_http, ServerState};

use super::util::start_service;

pub async fn serve(settings: Settings, bind: String, timeout_secs: u64) -> anyhow::Result<()> {
    let running = start_service(&settings)?;
    let state = ServerState {
        handle: running.handle,
        metrics: running.metrics,
        resolve_timeout: Duration::from_secs(timeout_secs),
    };
    serve_http(state, &bind).await.with_context(|| format!("bind {bind}"))
}
