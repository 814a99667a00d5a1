//! Display-only projection of the cluster-info provider's launch queue.
//! Nothing here feeds path resolution.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueApp {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueDelay {
    #[serde(default)]
    pub time_left_seconds: u64,
    #[serde(default)]
    pub overdue: bool,
}

/// A queue entry merged over the default schema: missing fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    #[serde(default)]
    pub app: QueueApp,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub delay: Option<QueueDelay>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaunchQueue {
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
}

impl LaunchQueue {
    pub fn from_json(body: &[u8]) -> anyhow::Result<Self> {
        crate::deserialize_message(body)
    }

    /// Seconds left on the first delayed entry for `app_id`, or 0.
    pub fn delay_by_app_id(&self, app_id: &str) -> u64 {
        self.queue
            .iter()
            .find(|entry| entry.app.id == app_id && entry.delay.is_some())
            .and_then(|entry| entry.delay.as_ref())
            .map(|delay| delay.time_left_seconds)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_merged_with_defaults() {
        let q = LaunchQueue::from_json(br#"{"queue": [{"app": {"id": "/web"}}, {}]}"#).unwrap();
        assert_eq!(q.queue.len(), 2);
        assert_eq!(q.queue[0].count, 0);
        assert!(q.queue[0].delay.is_none());
        assert_eq!(q.queue[1].app.id, "");
    }

    #[test]
    fn delay_is_taken_from_first_delayed_match() {
        let q = LaunchQueue::from_json(br#"{"queue": [
            {"app": {"id": "/web"}, "count": 2},
            {"app": {"id": "/web"}, "delay": {"timeLeftSeconds": 17, "overdue": false}},
            {"app": {"id": "/db"}, "delay": {"timeLeftSeconds": 3}}
        ]}"#).unwrap();
        assert_eq!(q.delay_by_app_id("/web"), 17);
        assert_eq!(q.delay_by_app_id("/db"), 3);
        assert_eq!(q.delay_by_app_id("/missing"), 0);
    }

    #[test]
    fn missing_queue_key_is_empty() {
        let q = LaunchQueue::from_json(b"{}").unwrap();
        assert!(q.queue.is_empty());
    }
}
