//! Single-owner processing loop around the [`Engine`]. Signals arrive on an
//! mpsc channel, lookups run as spawned tasks that post their result back
//! into the same channel, and events fan out on a broadcast channel.

use std::sync::Arc;

use common::{ClusterConfig, ClusterState, FileEntry, PendingRequest, RawFile};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backoff::Backoff;
use crate::engine::{Engine, Lookup};
use crate::events::{Changes, EngineEvent};
use crate::metrics::Metrics;
use crate::transport::Lookups;

const EVENTS_CAP: usize = 256;

/// Inbound signal consumed by the loop.
#[derive(Debug)]
pub enum Signal {
    Enqueue(PendingRequest),
    ConfigurationAvailable(ClusterConfig),
    ConfigurationFailed(String),
    VersionLookupComplete(String),
    VersionLookupFailed(String),
    StateLookupComplete { node_id: String, state: ClusterState },
    StateLookupFailed { node_id: String, detail: String },
    FileListingComplete { task_id: String, host: String, files: Vec<RawFile> },
    FileListingFailed { task_id: String, detail: String },
    /// Forget a cached listing, e.g. when it lacks a file that should be there.
    InvalidateTaskFiles(String),
    Query(Query),
}

/// Read-only requests answered from inside the loop.
#[derive(Debug)]
pub enum Query {
    NodeState { node_id: String, resp: oneshot::Sender<Option<ClusterState>> },
    TaskFiles { task_id: String, resp: oneshot::Sender<Option<Vec<FileEntry>>> },
    Pending { resp: oneshot::Sender<Vec<PendingRequest>> },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("resolver loop has stopped")]
    Closed,
}

enum Trigger {
    Now,
    Throttled,
    Idle,
}

/// Cloneable front door to a running [`Service`].
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<EngineEvent>,
}

impl ServiceHandle {
    pub fn enqueue(&self, agent_id: impl Into<String>, task_id: impl Into<String>) -> Result<(), ServiceError> {
        self.inject(Signal::Enqueue(PendingRequest::new(agent_id, task_id)))
    }

    /// Deliver a completion or error signal, exactly as a lookup task would.
    pub fn inject(&self, signal: Signal) -> Result<(), ServiceError> {
        self.tx.send(signal).map_err(|_| ServiceError::Closed)
    }

    pub fn refresh_task_files(&self, task_id: &str) -> Result<(), ServiceError> {
        self.inject(Signal::InvalidateTaskFiles(task_id.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn node_state(&self, node_id: &str) -> Option<ClusterState> {
        let (resp, rx) = oneshot::channel();
        let query = Query::NodeState { node_id: node_id.to_string(), resp };
        self.inject(Signal::Query(query)).ok()?;
        rx.await.ok().flatten()
    }

    pub async fn task_files(&self, task_id: &str) -> Option<Vec<FileEntry>> {
        let (resp, rx) = oneshot::channel();
        let query = Query::TaskFiles { task_id: task_id.to_string(), resp };
        self.inject(Signal::Query(query)).ok()?;
        rx.await.ok().flatten()
    }

    pub async fn pending(&self) -> Vec<PendingRequest> {
        let (resp, rx) = oneshot::channel();
        if self.inject(Signal::Query(Query::Pending { resp })).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

pub struct Service {
    engine: Engine,
    backoff: Backoff,
    lookups: Arc<dyn Lookups>,
    metrics: Arc<Metrics>,
    // Weak so the loop ends once handles and in-flight lookups are gone.
    tx: mpsc::WeakUnboundedSender<Signal>,
    rx: mpsc::UnboundedReceiver<Signal>,
    events: broadcast::Sender<EngineEvent>,
}

impl Service {
    pub fn new(engine: Engine, backoff: Backoff, lookups: Arc<dyn Lookups>, metrics: Arc<Metrics>) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENTS_CAP);
        let service = Self {
            engine,
            backoff,
            lookups,
            metrics,
            tx: tx.downgrade(),
            rx,
            events: events.clone(),
        };
        let handle = ServiceHandle { tx, events };
        (service, handle)
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every handle and every in-flight lookup has been dropped.
    pub async fn run(mut self) {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                signal = self.rx.recv() => {
                    let Some(signal) = signal else { break };
                    match self.apply(signal) {
                        Trigger::Now => {
                            deadline = None;
                            self.run_pass();
                        }
                        Trigger::Throttled => {
                            if deadline.is_none() {
                                let delay = self.backoff.next_delay();
                                self.metrics.set_backoff_attempt(self.backoff.attempt());
                                debug!(delay_ms = delay.as_millis() as u64, attempt = self.backoff.attempt(), "pass scheduled");
                                deadline = Some(Instant::now() + delay);
                            }
                        }
                        Trigger::Idle => {}
                    }
                }
                _ = wait_until(deadline) => {
                    deadline = None;
                    self.run_pass();
                }
            }
        }
        info!("resolver loop stopped");
    }

    fn apply(&mut self, signal: Signal) -> Trigger {
        let changes = match signal {
            Signal::Enqueue(request) => {
                self.metrics.inc_enqueued();
                self.backoff.reset();
                self.metrics.set_backoff_attempt(0);
                self.engine.enqueue(request.agent_id, request.task_id);
                return Trigger::Now;
            }
            Signal::ConfigurationAvailable(config) => self.engine.configuration_available(config),
            Signal::ConfigurationFailed(detail) => {
                self.metrics.inc_lookup_errors();
                self.engine.configuration_failed(&detail)
            }
            Signal::VersionLookupComplete(version) => self.engine.version_lookup_complete(version),
            Signal::VersionLookupFailed(detail) => {
                self.metrics.inc_lookup_errors();
                debug!(error = %detail, "version lookup failed");
                self.engine.version_lookup_failed()
            }
            Signal::StateLookupComplete { node_id, state } => self.engine.state_lookup_complete(&node_id, state),
            Signal::StateLookupFailed { node_id, detail } => {
                self.metrics.inc_lookup_errors();
                self.engine.state_lookup_failed(&node_id, &detail)
            }
            Signal::FileListingComplete { task_id, host, files } => {
                self.engine.file_listing_complete(&task_id, &host, files)
            }
            Signal::FileListingFailed { task_id, detail } => {
                self.metrics.inc_lookup_errors();
                self.engine.file_listing_failed(&task_id, &detail)
            }
            Signal::InvalidateTaskFiles(task_id) => {
                self.engine.invalidate_task_files(&task_id);
                return Trigger::Idle;
            }
            Signal::Query(query) => {
                self.answer(query);
                return Trigger::Idle;
            }
        };
        self.publish(changes);
        Trigger::Throttled
    }

    fn answer(&mut self, query: Query) {
        // A dropped receiver just means the asker went away.
        match query {
            Query::NodeState { node_id, resp } => {
                let _ = resp.send(self.engine.node_state(&node_id).cloned());
            }
            Query::TaskFiles { task_id, resp } => {
                let _ = resp.send(self.engine.task_files(&task_id).map(<[FileEntry]>::to_vec));
            }
            Query::Pending { resp } => {
                let _ = resp.send(self.engine.pending().to_vec());
            }
        }
    }

    fn run_pass(&mut self) {
        let pass = self.engine.resolve();
        self.metrics
            .record_pass(pass.restarts, pass.resolved.len(), self.engine.pending().len());
        self.metrics.inc_lookups_issued(pass.lookups.len() as u64);
        self.publish(Changes::with(pass.events));
        for lookup in pass.lookups {
            self.dispatch(lookup);
        }
        if pass.drained {
            self.backoff.reset();
            self.metrics.set_backoff_attempt(0);
        }
    }

    fn publish(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        for event in changes.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn dispatch(&self, lookup: Lookup) {
        let Some(tx) = self.tx.upgrade() else { return };
        let lookups = self.lookups.clone();
        tokio::spawn(async move {
            let signal = perform(lookups.as_ref(), lookup).await;
            let _ = tx.send(signal);
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run one lookup and turn its outcome into the matching completion signal.
async fn perform(lookups: &dyn Lookups, lookup: Lookup) -> Signal {
    match lookup {
        Lookup::Configuration => match lookups.configuration().await {
            Ok(config) => Signal::ConfigurationAvailable(config),
            Err(e) => Signal::ConfigurationFailed(e.to_string()),
        },
        Lookup::VersionInfo { endpoint_url } => match lookups.version_info(&endpoint_url).await {
            Ok(version) => Signal::VersionLookupComplete(version),
            Err(e) => Signal::VersionLookupFailed(e.to_string()),
        },
        Lookup::NodeState { node_id, url, version } => match lookups.node_state(&node_id, &url, &version).await {
            Ok(state) => Signal::StateLookupComplete { node_id, state },
            Err(e) => Signal::StateLookupFailed { node_id, detail: e.to_string() },
        },
        Lookup::FileListing { task_id, url, directory, version } => {
            match lookups.file_listing(&task_id, &url, &directory, &version).await {
                Ok(files) => Signal::FileListingComplete { task_id, host: url, files },
                Err(e) => Signal::FileListingFailed { task_id, detail: e.to_string() },
            }
        }
    }
}
