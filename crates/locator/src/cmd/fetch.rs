use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use locator::config::Settings;
use locator::download::TaskFileDownload;
use tracing::info;

use super::util::start_service;

pub async fn fetch(
    settings: Settings,
    agent: String,
    task: String,
    file: String,
    out: Option<PathBuf>,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let running = start_service(&settings)?;
    let entry = TaskFileDownload::new(agent, task, file)
        .locate(&running.handle, Duration::from_secs(timeout_secs))
        .await?;
    println!("{}", running.lookups.absolute(&entry.download_uri));

    if let Some(dest) = out {
        let written = running
            .lookups
            .fetch_to(&entry, &dest)
            .await
            .with_context(|| format!("download {}", entry.path))?;
        info!(path = %dest.display(), bytes = written, "file written");
    }
    Ok(())
}
