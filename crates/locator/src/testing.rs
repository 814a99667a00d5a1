//! Scripted in-memory cluster used by the loop and client tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{ClusterConfig, ClusterState, RawFile, MASTER_ID};
use tokio::time::Instant;

use crate::transport::{LookupError, Lookups};

pub fn config() -> ClusterConfig {
    ClusterConfig {
        leader_url: "http://leader:5050/".into(),
        framework_id: "f1".into(),
    }
}

pub fn leader_state() -> ClusterState {
    serde_json::from_value(serde_json::json!({
        "slaves": [{"id": "a1", "hostname": "h", "pid": "foo@h:5051"}]
    }))
    .unwrap()
}

pub fn agent_state() -> ClusterState {
    serde_json::from_value(serde_json::json!({
        "frameworks": [{"id": "f1", "executors": [{"id": "t1", "directory": "/var/exec/t1"}], "completed_executors": []}],
        "completed_frameworks": []
    }))
    .unwrap()
}

pub struct FakeLookups {
    started: Instant,
    pub fail_master: bool,
    calls: Mutex<Vec<(Duration, String)>>,
    files: Mutex<Vec<String>>,
}

impl FakeLookups {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            fail_master: false,
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(vec!["stdout".into(), "stderr".into()]),
        }
    }

    pub fn failing_master() -> Self {
        Self { fail_master: true, ..Self::new() }
    }

    /// Make later listings include `name`.
    pub fn add_file(&self, name: &str) {
        self.files.lock().unwrap().push(name.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push((self.started.elapsed(), call));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Milliseconds since construction at which `call` was made.
    pub fn times_of(&self, call: &str) -> Vec<u128> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c == call)
            .map(|(at, _)| at.as_millis())
            .collect()
    }
}

#[async_trait]
impl Lookups for FakeLookups {
    async fn configuration(&self) -> Result<ClusterConfig, LookupError> {
        self.record("configuration".into());
        Ok(config())
    }

    async fn version_info(&self, _endpoint_url: &str) -> Result<String, LookupError> {
        self.record("version".into());
        Ok("0.26.1".into())
    }

    async fn node_state(&self, node_id: &str, url: &str, _version: &str) -> Result<ClusterState, LookupError> {
        self.record(format!("node:{node_id}"));
        match node_id {
            MASTER_ID if self.fail_master => Err(LookupError::Status {
                url: url.to_string(),
                status: 503,
                body: "leader unavailable".into(),
            }),
            MASTER_ID => Ok(leader_state()),
            _ => Ok(agent_state()),
        }
    }

    async fn file_listing(
        &self,
        task_id: &str,
        _url: &str,
        directory: &str,
        _version: &str,
    ) -> Result<Vec<RawFile>, LookupError> {
        self.record(format!("files:{task_id}"));
        let names = self.files.lock().unwrap().clone();
        Ok(names
            .iter()
            .map(|name| RawFile {
                path: format!("{directory}/{name}"),
                size: Some(64),
                mode: None,
                mtime: None,
            })
            .collect())
    }
}
