use anyhow::Context;
use locator::config::Settings;

use super::util::http_lookups;

pub async fn queue(settings: Settings, app: Option<String>) -> anyhow::Result<()> {
    let queue = http_lookups(&settings)?
        .launch_queue()
        .await
        .context("fetch launch queue")?;
    match app {
        Some(app_id) => println!("{}", queue.delay_by_app_id(&app_id)),
        None => {
            for entry in &queue.queue {
                let delay = entry.delay.as_ref().map(|d| d.time_left_seconds).unwrap_or(0);
                println!("{}\tcount={}\tdelay={}s", entry.app.id, entry.count, delay);
            }
        }
    }
    Ok(())
}
