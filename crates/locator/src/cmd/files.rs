use std::time::Duration;

use locator::config::Settings;
use locator::download::wait_for_listing;

use super::util::start_service;

pub async fn files(settings: Settings, agent: String, task: String, timeout_secs: u64) -> anyhow::Result<()> {
    let running = start_service(&settings)?;
    let files = wait_for_listing(&running.handle, &agent, &task, Duration::from_secs(timeout_secs)).await?;
    println!("{}", serde_json::to_string_pretty(&files)?);
    Ok(())
}
