//! The resolution engine: owns both caches, the request queue and the
//! negotiated version. Every inbound signal is a method that mutates state
//! and hands back the events it produced; [`Engine::resolve`] runs one pass
//! over the queue and returns the lookups to issue. Nothing here does I/O.

use std::collections::HashSet;
use std::time::Duration;

use common::{ClusterConfig, ClusterState, FileEntry, PendingRequest, RawFile};
use tracing::{debug, info, warn};

use crate::cache::TimedCache;
use crate::events::{Changes, EngineEvent};
use crate::queue::RequestQueue;
use crate::version::VersionNegotiator;

mod resolve;


pub use resolve::Pass;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub state_ttl: Duration,
    pub files_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            state_ttl: Duration::from_secs(60),
            files_ttl: Duration::from_secs(60),
        }
    }
}

/// What an outbound lookup is trying to populate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupTarget {
    Configuration,
    Version,
    NodeState(String),
    FileListing(String),
}

/// One outbound call on a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Configuration,
    VersionInfo {
        endpoint_url: String,
    },
    NodeState {
        node_id: String,
        url: String,
        version: String,
    },
    FileListing {
        task_id: String,
        url: String,
        directory: String,
        version: String,
    },
}

impl Lookup {
    pub fn target(&self) -> LookupTarget {
        match self {
            Lookup::Configuration => LookupTarget::Configuration,
            Lookup::VersionInfo { .. } => LookupTarget::Version,
            Lookup::NodeState { node_id, .. } => LookupTarget::NodeState(node_id.clone()),
            Lookup::FileListing { task_id, .. } => LookupTarget::FileListing(task_id.clone()),
        }
    }
}

pub struct Engine {
    settings: EngineSettings,
    config: Option<ClusterConfig>,
    version: VersionNegotiator,
    node_states: TimedCache<ClusterState>,
    task_files: TimedCache<Vec<FileEntry>>,
    queue: RequestQueue,
    in_flight: HashSet<LookupTarget>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            config: None,
            version: VersionNegotiator::new(),
            node_states: TimedCache::new("node_state"),
            task_files: TimedCache::new("task_files"),
            queue: RequestQueue::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Start with the cluster endpoint already known; no configuration lookup is ever issued.
    pub fn with_config(settings: EngineSettings, config: ClusterConfig) -> Self {
        let mut engine = Self::new(settings);
        engine.config = Some(config);
        engine
    }

    // ---------------- inbound signals ----------------

    pub fn enqueue(&mut self, agent_id: impl Into<String>, task_id: impl Into<String>) -> Changes {
        let request = PendingRequest::new(agent_id, task_id);
        debug!(agent = %request.agent_id, task = %request.task_id, "request queued");
        self.queue.push(request);
        Changes::none()
    }

    pub fn configuration_available(&mut self, config: ClusterConfig) -> Changes {
        self.in_flight.remove(&LookupTarget::Configuration);
        info!(leader = %config.leader_url, framework = %config.framework_id, "cluster configuration available");
        self.config = Some(config);
        Changes::none()
    }

    /// Configuration stays unknown; the next pass asks again.
    pub fn configuration_failed(&mut self, detail: &str) -> Changes {
        self.in_flight.remove(&LookupTarget::Configuration);
        warn!(error = %detail, "cluster configuration unavailable");
        Changes::none()
    }

    pub fn version_lookup_complete(&mut self, version: impl Into<String>) -> Changes {
        self.in_flight.remove(&LookupTarget::Version);
        self.version.record_success(version);
        Changes::none()
    }

    pub fn version_lookup_failed(&mut self) -> Changes {
        self.in_flight.remove(&LookupTarget::Version);
        self.version.record_failure();
        Changes::none()
    }

    pub fn state_lookup_complete(&mut self, node_id: &str, state: ClusterState) -> Changes {
        self.in_flight.remove(&LookupTarget::NodeState(node_id.to_string()));
        if !self.node_states.put(node_id, state) {
            return Changes::none();
        }
        info!(node = %node_id, "node state cached");
        Changes::with(vec![
            EngineEvent::Change,
            EngineEvent::NodeStateChanged {
                node_id: node_id.to_string(),
            },
        ])
    }

    pub fn state_lookup_failed(&mut self, node_id: &str, detail: &str) -> Changes {
        self.in_flight.remove(&LookupTarget::NodeState(node_id.to_string()));
        self.node_states.invalidate(node_id);
        warn!(node = %node_id, error = %detail, "node state lookup failed");
        Changes::with(vec![EngineEvent::NodeStateError {
            node_id: node_id.to_string(),
            detail: detail.to_string(),
        }])
    }

    /// Enrich every raw entry with its name and version-appropriate download URI, then cache.
    pub fn file_listing_complete(&mut self, task_id: &str, host: &str, files: Vec<RawFile>) -> Changes {
        self.in_flight.remove(&LookupTarget::FileListing(task_id.to_string()));
        let version = self.version.effective().to_string();
        let entries: Vec<FileEntry> = files
            .into_iter()
            .map(|raw| FileEntry::from_raw(raw, host, &version))
            .collect();
        let count = entries.len();
        if !self.task_files.put(task_id, entries) {
            return Changes::none();
        }
        info!(task = %task_id, host = %host, files = count, "task file listing cached");
        Changes::with(vec![
            EngineEvent::Change,
            EngineEvent::TaskFileChanged {
                task_id: task_id.to_string(),
            },
        ])
    }

    pub fn file_listing_failed(&mut self, task_id: &str, detail: &str) -> Changes {
        self.in_flight.remove(&LookupTarget::FileListing(task_id.to_string()));
        self.task_files.invalidate(task_id);
        warn!(task = %task_id, error = %detail, "file listing lookup failed");
        Changes::with(vec![EngineEvent::TaskFileError {
            task_id: task_id.to_string(),
            detail: detail.to_string(),
        }])
    }

    /// Drop a cached listing so the next pass fetches it again. Leaves any
    /// in-flight listing lookup alone.
    pub fn invalidate_task_files(&mut self, task_id: &str) -> Changes {
        if self.task_files.invalidate(task_id) {
            debug!(task = %task_id, "task file listing dropped on request");
        }
        Changes::none()
    }

    // ---------------- queries ----------------

    pub fn node_state(&mut self, node_id: &str) -> Option<&ClusterState> {
        self.node_states.get(node_id, self.settings.state_ttl)
    }

    pub fn task_files(&mut self, task_id: &str) -> Option<&[FileEntry]> {
        self.task_files
            .get(task_id, self.settings.files_ttl)
            .map(Vec::as_slice)
    }

    pub fn pending(&self) -> &[PendingRequest] {
        self.queue.items()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.current()
    }

    pub fn is_in_flight(&self, target: &LookupTarget) -> bool {
        self.in_flight.contains(target)
    }
}
