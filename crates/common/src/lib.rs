use serde::{Deserialize, Serialize};

pub mod queue;

pub use queue::{LaunchQueue, QueueApp, QueueDelay, QueueEntry};

/// Node id under which the cluster leader's state is cached.
pub const MASTER_ID: &str = "master";

/// Version committed to when negotiation fails; selects the legacy request shapes.
pub const SENTINEL_VERSION: &str = "0.0.0";

/// First cluster manager version that serves the extension-less routes.
pub const SHORT_ROUTE_VERSION: &str = "0.26.0";

/// Where the cluster leader lives and which framework's executors we look for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub leader_url: String,
    pub framework_id: String,
}

impl ClusterConfig {
    /// Leader URL with any trailing slash replaced by `/master`.
    pub fn master_url(&self) -> String {
        format!("{}/master", self.leader_url.trim_end_matches('/'))
    }
}

/// Subset of the cluster-info provider's `/v2/info` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarathonInfo {
    #[serde(default, rename = "frameworkId")]
    pub framework_id: Option<String>,
    #[serde(default)]
    pub marathon_config: Option<MarathonConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarathonConfig {
    #[serde(default)]
    pub mesos_leader_ui_url: Option<String>,
}

impl MarathonInfo {
    /// Both the leader URL and the framework id are required; anything less is "not yet known".
    pub fn into_config(self) -> Option<ClusterConfig> {
        let leader_url = self.marathon_config?.mesos_leader_ui_url?;
        let framework_id = self.framework_id?;
        if leader_url.is_empty() || framework_id.is_empty() {
            return None;
        }
        Some(ClusterConfig { leader_url, framework_id })
    }
}

/// Body of the `/version` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// State snapshot of either the leader (`slaves` populated) or one agent
/// (`frameworks` / `completed_frameworks` populated). Everything the path
/// resolution does not need is dropped at decode time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterState {
    #[serde(default)]
    pub slaves: Vec<AgentInfo>,
    #[serde(default)]
    pub frameworks: Vec<FrameworkInfo>,
    #[serde(default)]
    pub completed_frameworks: Vec<FrameworkInfo>,
}

impl ClusterState {
    pub fn agent(&self, agent_id: &str) -> Option<&AgentInfo> {
        self.slaves.iter().find(|agent| agent.id == agent_id)
    }

    /// Active frameworks are searched before completed ones.
    pub fn framework(&self, framework_id: &str) -> Option<&FrameworkInfo> {
        self.frameworks
            .iter()
            .find(|f| f.id == framework_id)
            .or_else(|| self.completed_frameworks.iter().find(|f| f.id == framework_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInfo {
    pub id: String,
    pub hostname: String,
    /// Process id of the agent, e.g. `slave(1)@10.0.0.1:5051`; the port follows the last colon.
    pub pid: String,
}

impl AgentInfo {
    pub fn port(&self) -> &str {
        match self.pid.rfind(':') {
            Some(idx) => &self.pid[idx + 1..],
            None => &self.pid,
        }
    }

    /// Protocol-relative base URL of the agent.
    pub fn url(&self) -> String {
        format!("//{}:{}", self.hostname, self.port())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameworkInfo {
    pub id: String,
    #[serde(default)]
    pub executors: Vec<ExecutorInfo>,
    #[serde(default)]
    pub completed_executors: Vec<ExecutorInfo>,
}

impl FrameworkInfo {
    pub fn executor(&self, executor_id: &str) -> Option<&ExecutorInfo> {
        self.executors
            .iter()
            .find(|e| e.id == executor_id)
            .or_else(|| self.completed_executors.iter().find(|e| e.id == executor_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorInfo {
    pub id: String,
    /// Absolute sandbox path on the agent.
    pub directory: String,
}

/// One element of a `/files/browse` listing as it comes off the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawFile {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub mtime: Option<f64>,
}

/// A listing entry enriched at ingest time with its display name and download URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub host: String,
    pub name: String,
    #[serde(rename = "downloadUri")]
    pub download_uri: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn from_raw(raw: RawFile, host: &str, version: &str) -> Self {
        let name = file_name(&raw.path).to_string();
        let download_uri = format!(
            "{}{}?path={}",
            host,
            download_route(version),
            encode_component(&raw.path)
        );
        Self {
            path: raw.path,
            host: host.to_string(),
            name,
            download_uri,
            size: raw.size,
        }
    }
}

/// Last path segment; a trailing slash stays attached, as on directory entries.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let start = trimmed.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    &path[start..]
}

pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// A queued `(agentId, taskId)` pair. Duplicates are allowed and resolved independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PendingRequest {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
}

impl PendingRequest {
    pub fn new(agent_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into(), task_id: task_id.into() }
    }
}

// ===================== Version-gated request shapes =====================

/// Lenient semantic-version parse: `0.26` is read as `0.26.0`; garbage reads as the sentinel.
pub fn parse_version(version: &str) -> semver::Version {
    let version = version.trim().trim_start_matches('v');
    if let Ok(v) = semver::Version::parse(version) {
        return v;
    }
    let mut padded = version.to_string();
    for _ in 0..2 {
        padded.push_str(".0");
        if let Ok(v) = semver::Version::parse(&padded) {
            return v;
        }
    }
    semver::Version::new(0, 0, 0)
}

pub fn uses_short_routes(version: &str) -> bool {
    parse_version(version) >= parse_version(SHORT_ROUTE_VERSION)
}

pub fn download_route(version: &str) -> &'static str {
    if uses_short_routes(version) { "/files/download" } else { "/files/download.json" }
}

pub fn state_route(version: &str) -> &'static str {
    if uses_short_routes(version) { "/state" } else { "/state.json" }
}

pub fn browse_route(version: &str) -> &'static str {
    if uses_short_routes(version) { "/files/browse" } else { "/files/browse.json" }
}

pub fn deserialize_message<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> anyhow::Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
