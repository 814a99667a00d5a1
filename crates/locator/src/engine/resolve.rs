use common::{ClusterConfig, PendingRequest, MASTER_ID};
use tracing::{debug, info, warn};

use super::{Engine, Lookup};
use crate::events::EngineEvent;

/// Result of one resolver pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pass {
    /// Lookups to issue, at most one per unmet dependency.
    pub lookups: Vec<Lookup>,
    /// Requests that had everything cached and were removed from the queue.
    pub resolved: Vec<PendingRequest>,
    pub events: Vec<EngineEvent>,
    /// Times the pass started over after invalidating a stale layer.
    pub restarts: u32,
    /// Queue empty once the pass finished.
    pub drained: bool,
}

enum Step {
    Done,
    Restart,
}

impl Engine {
    /// Walk every queued request down the dependency chain
    /// configuration → version → leader state → agent state → file listing,
    /// stopping at the first gap.
    pub fn resolve(&mut self) -> Pass {
        let mut pass = Pass::default();
        // Each restart drops one cached entry, so this terminates.
        while let Step::Restart = self.resolve_once(&mut pass) {
            pass.restarts += 1;
        }
        pass.drained = self.queue.is_empty();
        if pass.drained && !pass.resolved.is_empty() {
            info!(resolved = pass.resolved.len(), "request queue drained");
        }
        pass
    }

    fn resolve_once(&mut self, pass: &mut Pass) -> Step {
        let Some(config) = self.config.clone() else {
            self.issue(pass, Lookup::Configuration);
            return Step::Done;
        };

        let Some(version) = self.version.current().map(str::to_string) else {
            self.issue(
                pass,
                Lookup::VersionInfo {
                    endpoint_url: config.leader_url.clone(),
                },
            );
            return Step::Done;
        };

        let state_ttl = self.settings.state_ttl;
        let files_ttl = self.settings.files_ttl;

        if !self.node_states.contains(MASTER_ID, state_ttl) {
            self.issue(
                pass,
                Lookup::NodeState {
                    node_id: MASTER_ID.to_string(),
                    url: config.master_url(),
                    version,
                },
            );
            return Step::Done;
        }

        let mut satisfied = Vec::new();
        let requests = self.queue.items().to_vec();
        for (index, request) in requests.iter().enumerate() {
            if !self.node_states.contains(&request.agent_id, state_ttl) {
                let Some(url) = self.node_url(&request.agent_id) else {
                    warn!(agent = %request.agent_id, "agent missing from leader state; refreshing leader");
                    self.node_states.invalidate(MASTER_ID);
                    return Step::Restart;
                };
                self.issue(
                    pass,
                    Lookup::NodeState {
                        node_id: request.agent_id.clone(),
                        url,
                        version: version.clone(),
                    },
                );
                continue;
            }

            if !self.task_files.contains(&request.task_id, files_ttl) {
                // The leader may have dropped the agent since its state was cached.
                let Some(url) = self.node_url(&request.agent_id) else {
                    warn!(agent = %request.agent_id, "agent missing from leader state; refreshing leader");
                    self.node_states.invalidate(MASTER_ID);
                    return Step::Restart;
                };
                let Some(directory) = self.executor_directory(&request.agent_id, &config, &request.task_id) else {
                    warn!(agent = %request.agent_id, task = %request.task_id, "executor missing from agent state; refreshing agent");
                    self.node_states.invalidate(&request.agent_id);
                    return Step::Restart;
                };
                self.issue(
                    pass,
                    Lookup::FileListing {
                        task_id: request.task_id.clone(),
                        url,
                        directory,
                        version: version.clone(),
                    },
                );
                continue;
            }

            satisfied.push(index);
        }

        for request in self.queue.take_indices(&satisfied) {
            pass.events.push(EngineEvent::RequestResolved {
                agent_id: request.agent_id.clone(),
                task_id: request.task_id.clone(),
            });
            pass.resolved.push(request);
        }
        Step::Done
    }

    /// Issue `lookup` unless a lookup for the same target is already outstanding.
    fn issue(&mut self, pass: &mut Pass, lookup: Lookup) {
        if !self.in_flight.insert(lookup.target()) {
            debug!(lookup = ?lookup, "lookup already in flight");
            return;
        }
        debug!(?lookup, "lookup issued");
        pass.lookups.push(lookup);
    }

    fn node_url(&mut self, agent_id: &str) -> Option<String> {
        let leader = self.node_states.get(MASTER_ID, self.settings.state_ttl)?;
        leader.agent(agent_id).map(|agent| agent.url())
    }

    fn executor_directory(&mut self, agent_id: &str, config: &ClusterConfig, task_id: &str) -> Option<String> {
        let agent_state = self.node_states.get(agent_id, self.settings.state_ttl)?;
        let framework = agent_state.framework(&config.framework_id)?;
        framework.executor(task_id).map(|executor| executor.directory.clone())
    }
}
