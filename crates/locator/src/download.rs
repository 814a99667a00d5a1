//! Client flow for "give me this file of that task": look the listing up,
//! queue the request when it's missing, and wait for the listing to land.

use std::time::Duration;

use common::FileEntry;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::events::EngineEvent;
use crate::service::ServiceHandle;

const REFRESH_BASE: Duration = Duration::from_millis(250);
const REFRESH_MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("timed out after {after:?} waiting for files of {task_id}")]
    Timeout { task_id: String, after: Duration },
    #[error("{task_id} still has no file named {file_name} after {after:?}")]
    Missing {
        task_id: String,
        file_name: String,
        after: Duration,
    },
    #[error("resolver loop stopped before {0} resolved")]
    Stopped(String),
}

/// Resolve the listing of `task_id` on `agent_id`, queueing the request if the
/// cache can't answer yet. The engine keeps no per-request deadline, so the
/// caller supplies one.
pub async fn wait_for_listing(
    handle: &ServiceHandle,
    agent_id: &str,
    task_id: &str,
    timeout: Duration,
) -> Result<Vec<FileEntry>, DownloadError> {
    listing_until(handle, agent_id, task_id, Instant::now() + timeout)
        .await
        .map_err(|e| match e {
            DownloadError::Timeout { task_id, .. } => DownloadError::Timeout { task_id, after: timeout },
            other => other,
        })
}

async fn listing_until(
    handle: &ServiceHandle,
    agent_id: &str,
    task_id: &str,
    deadline: Instant,
) -> Result<Vec<FileEntry>, DownloadError> {
    let stopped = || DownloadError::Stopped(task_id.to_string());
    // Subscribe before looking so a listing that lands in between is not missed.
    let mut events = handle.subscribe();
    if let Some(files) = handle.task_files(task_id).await {
        return Ok(files);
    }
    handle.enqueue(agent_id, task_id).map_err(|_| stopped())?;

    let wait = async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::TaskFileChanged { task_id: changed }) if changed == task_id => {
                    if let Some(files) = handle.task_files(task_id).await {
                        return Ok(files);
                    }
                }
                Ok(EngineEvent::TaskFileError { task_id: failed, detail }) if failed == task_id => {
                    warn!(task = %task_id, error = %detail, "file listing failed; still waiting");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event stream lagged; rechecking cache");
                    if let Some(files) = handle.task_files(task_id).await {
                        return Ok(files);
                    }
                }
                Err(RecvError::Closed) => return Err(stopped()),
            }
        }
    };
    match tokio::time::timeout_at(deadline, wait).await {
        Ok(result) => result,
        Err(_) => Err(DownloadError::Timeout {
            task_id: task_id.to_string(),
            after: Duration::ZERO,
        }),
    }
}

/// One named file in a task's sandbox.
#[derive(Debug, Clone)]
pub struct TaskFileDownload {
    pub agent_id: String,
    pub task_id: String,
    pub file_name: String,
}

impl TaskFileDownload {
    pub fn new(agent_id: impl Into<String>, task_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            file_name: file_name.into(),
        }
    }

    /// Wait until the task's listing contains the file. A listing without it
    /// is dropped and fetched again, with growing pauses, until `timeout`.
    pub async fn locate(&self, handle: &ServiceHandle, timeout: Duration) -> Result<FileEntry, DownloadError> {
        let deadline = Instant::now() + timeout;
        let missing = || DownloadError::Missing {
            task_id: self.task_id.clone(),
            file_name: self.file_name.clone(),
            after: timeout,
        };
        let mut pacing = Backoff::new(REFRESH_BASE, Some(REFRESH_MAX));
        let mut listed = false;
        loop {
            let files = match listing_until(handle, &self.agent_id, &self.task_id, deadline).await {
                Ok(files) => files,
                Err(DownloadError::Timeout { .. }) if listed => return Err(missing()),
                Err(DownloadError::Timeout { task_id, .. }) => {
                    return Err(DownloadError::Timeout { task_id, after: timeout })
                }
                Err(e) => return Err(e),
            };
            if let Some(entry) = files.into_iter().find(|f| f.name == self.file_name) {
                return Ok(entry);
            }
            listed = true;

            let pause = pacing.next_delay();
            if Instant::now() + pause >= deadline {
                return Err(missing());
            }
            debug!(task = %self.task_id, file = %self.file_name, pause_ms = pause.as_millis() as u64, "file not listed yet; refreshing");
            tokio::time::sleep(pause).await;
            handle
                .refresh_task_files(&self.task_id)
                .map_err(|_| DownloadError::Stopped(self.task_id.clone()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::{Engine, EngineSettings};
    use crate::metrics::Metrics;
    use crate::service::Service;
    use crate::testing::FakeLookups;

    fn start(fake: Arc<FakeLookups>) -> ServiceHandle {
        let backoff = Backoff::new(Duration::from_millis(100), None);
        let (service, handle) = Service::new(Engine::new(EngineSettings::default()), backoff, fake, Arc::new(Metrics::new()));
        service.spawn();
        handle
    }

    fn listings(fake: &FakeLookups) -> usize {
        fake.calls().iter().filter(|c| *c == "files:t1").count()
    }

    #[tokio::test(start_paused = true)]
    async fn locates_a_file_and_answers_from_cache_afterwards() {
        let fake = Arc::new(FakeLookups::new());
        let handle = start(fake.clone());

        let download = TaskFileDownload::new("a1", "t1", "stderr");
        let entry = download.locate(&handle, Duration::from_secs(30)).await.unwrap();
        assert_eq!(entry.path, "/var/exec/t1/stderr");
        assert_eq!(entry.host, "//h:5051");

        let lookups = fake.calls().len();
        download.locate(&handle, Duration::from_secs(30)).await.unwrap();
        assert_eq!(fake.calls().len(), lookups);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_listing_without_the_file_is_fetched_again() {
        let fake = Arc::new(FakeLookups::new());
        let handle = start(fake.clone());
        TaskFileDownload::new("a1", "t1", "stdout")
            .locate(&handle, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(listings(&fake), 1);

        fake.add_file("core");
        let entry = TaskFileDownload::new("a1", "t1", "core")
            .locate(&handle, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(entry.path, "/var/exec/t1/core");
        assert_eq!(listings(&fake), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn file_that_never_shows_up_fails_at_the_deadline() {
        let fake = Arc::new(FakeLookups::new());
        let handle = start(fake.clone());
        let started = Instant::now();
        let err = TaskFileDownload::new("a1", "t1", "core")
            .locate(&handle, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Missing { ref file_name, .. } if file_name == "core"));
        assert!(started.elapsed() > Duration::from_secs(3));
        assert!(started.elapsed() <= Duration::from_secs(10));
        assert!(listings(&fake) > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_timeout() {
        let handle = start(Arc::new(FakeLookups::failing_master()));
        let err = wait_for_listing(&handle, "a1", "t1", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, DownloadError::Timeout { after, .. } if after == Duration::from_secs(5)));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(handle.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn stopped_loop_is_reported() {
        let (service, handle) = Service::new(
            Engine::new(EngineSettings::default()),
            Backoff::new(Duration::from_millis(100), None),
            Arc::new(FakeLookups::new()),
            Arc::new(Metrics::new()),
        );
        drop(service);
        let err = wait_for_listing(&handle, "a1", "t1", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DownloadError::Stopped(_)));
    }
}
