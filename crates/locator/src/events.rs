use serde::Serialize;

/// Notifications published after the engine mutates its state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Some cache entry was written.
    Change,
    NodeStateChanged { node_id: String },
    TaskFileChanged { task_id: String },
    NodeStateError { node_id: String, detail: String },
    TaskFileError { task_id: String, detail: String },
    /// A queued request had every dependency cached and left the queue.
    RequestResolved { agent_id: String, task_id: String },
}

/// What a mutation produced, handed back to the caller for publishing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub events: Vec<EngineEvent>,
}

impl Changes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(events: Vec<EngineEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
