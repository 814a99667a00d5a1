use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use locator::config::Settings;
use locator::engine::Engine;
use locator::metrics::Metrics;
use locator::service::{Service, ServiceHandle};
use locator::transport::HttpLookups;
use tracing::info;

/// Command-line values that win over the settings file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub marathon_url: Option<String>,
    pub leader_url: Option<String>,
    pub framework_id: Option<String>,
}

pub fn load_settings(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path).context("load settings")?;
    if let Some(url) = overrides.marathon_url {
        settings.marathon_url = url;
    }
    if overrides.leader_url.is_some() {
        settings.leader_url = overrides.leader_url;
    }
    if overrides.framework_id.is_some() {
        settings.framework_id = overrides.framework_id;
    }
    Ok(settings)
}

pub fn http_lookups(settings: &Settings) -> anyhow::Result<HttpLookups> {
    HttpLookups::new(&settings.marathon_url, &settings.scheme, settings.request_timeout())
        .context("build http client")
}

pub struct Running {
    pub handle: ServiceHandle,
    pub metrics: Arc<Metrics>,
    pub lookups: HttpLookups,
}

/// Build the engine from settings and spawn its loop.
pub fn start_service(settings: &Settings) -> anyhow::Result<Running> {
    let engine = match settings.static_config() {
        Some(config) => {
            info!(leader = %config.leader_url, "using static cluster configuration");
            Engine::with_config(settings.engine_settings(), config)
        }
        None => Engine::new(settings.engine_settings()),
    };
    let lookups = http_lookups(settings)?;
    let metrics = Arc::new(Metrics::new());
    let (service, handle) = Service::new(engine, settings.backoff(), Arc::new(lookups.clone()), metrics.clone());
    service.spawn();
    Ok(Running { handle, metrics, lookups })
}
