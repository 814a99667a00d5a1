use common::SENTINEL_VERSION;
use tracing::{info, warn};

/// Remembers the cluster manager's API version for the life of the process.
/// Once a value is recorded, success or sentinel, it is never replaced.
#[derive(Debug, Default)]
pub struct VersionNegotiator {
    version: Option<String>,
}

impl VersionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Version used to shape requests: the sentinel until something is negotiated.
    pub fn effective(&self) -> &str {
        self.current().unwrap_or(SENTINEL_VERSION)
    }

    pub fn record_success(&mut self, version: impl Into<String>) -> bool {
        if self.version.is_some() {
            return false;
        }
        let version = version.into();
        info!(version = %version, "cluster api version negotiated");
        self.version = Some(version);
        true
    }

    /// Commit to the oldest request shapes for good.
    pub fn record_failure(&mut self) -> bool {
        if self.version.is_some() {
            return false;
        }
        warn!(version = SENTINEL_VERSION, "version negotiation failed; using legacy routes");
        self.version = Some(SENTINEL_VERSION.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_until_recorded() {
        let v = VersionNegotiator::new();
        assert_eq!(v.current(), None);
        assert_eq!(v.effective(), SENTINEL_VERSION);
    }

    #[test]
    fn success_is_permanent() {
        let mut v = VersionNegotiator::new();
        assert!(v.record_success("0.26.1"));
        assert!(!v.record_success("1.2.0"));
        assert!(!v.record_failure());
        assert_eq!(v.current(), Some("0.26.1"));
    }

    #[test]
    fn failure_commits_to_sentinel() {
        let mut v = VersionNegotiator::new();
        assert!(v.record_failure());
        assert!(!v.record_success("0.26.1"));
        assert_eq!(v.current(), Some(SENTINEL_VERSION));
    }
}
