use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use common::{
    browse_route, encode_component, state_route, ClusterConfig, ClusterState, FileEntry, LaunchQueue,
    MarathonInfo, RawFile, VersionInfo,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cluster info at {0} lacks the leader url or framework id")]
    IncompleteConfiguration(String),
    #[error("building http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outbound calls the engine makes on the cluster. Implementations must
/// always return: a lookup that never completes stalls its target forever.
#[async_trait]
pub trait Lookups: Send + Sync {
    async fn configuration(&self) -> Result<ClusterConfig, LookupError>;

    async fn version_info(&self, endpoint_url: &str) -> Result<String, LookupError>;

    async fn node_state(&self, node_id: &str, url: &str, version: &str) -> Result<ClusterState, LookupError>;

    async fn file_listing(
        &self,
        task_id: &str,
        url: &str,
        directory: &str,
        version: &str,
    ) -> Result<Vec<RawFile>, LookupError>;
}

/// JSON-over-HTTP lookups against the cluster-info provider, the leader and its agents.
#[derive(Clone)]
pub struct HttpLookups {
    client: reqwest::Client,
    marathon_url: String,
    scheme: String,
}

impl HttpLookups {
    pub fn new(marathon_url: impl Into<String>, scheme: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            marathon_url: marathon_url.into(),
            scheme: scheme.into(),
        })
    }

    /// Agent URLs are protocol-relative (`//host:port`); give them our scheme.
    pub fn absolute(&self, url: &str) -> String {
        if url.starts_with("//") {
            format!("{}{}", self.scheme, url)
        } else {
            url.to_string()
        }
    }

    fn marathon(&self, route: &str) -> String {
        format!("{}{}", self.marathon_url.trim_end_matches('/'), route)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, LookupError> {
        debug!(url = %url, "GET");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(LookupError::Http { url, source }),
        };
        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(source) => return Err(LookupError::Http { url, source }),
        };
        if !status.is_success() {
            return Err(LookupError::Status {
                url,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body).map_err(|source| LookupError::Decode { url, source })
    }

    pub async fn launch_queue(&self) -> Result<LaunchQueue, LookupError> {
        self.get_json(self.marathon("/v2/queue")).await
    }

    /// Stream `entry`'s download URI into `dest`; returns the bytes written.
    pub async fn fetch_to(&self, entry: &FileEntry, dest: &Path) -> Result<u64, LookupError> {
        let url = self.absolute(&entry.download_uri);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(LookupError::Http { url, source }),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Status { url, status: status.as_u16(), body });
        }
        let io_err = |source| LookupError::Io { path: dest.to_path_buf(), source };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| LookupError::Http { url: url.clone(), source })?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }
}

#[async_trait]
impl Lookups for HttpLookups {
    async fn configuration(&self) -> Result<ClusterConfig, LookupError> {
        let url = self.marathon("/v2/info");
        let info: MarathonInfo = self.get_json(url.clone()).await?;
        info.into_config()
            .ok_or(LookupError::IncompleteConfiguration(url))
    }

    async fn version_info(&self, endpoint_url: &str) -> Result<String, LookupError> {
        let url = format!("{}/version", self.absolute(endpoint_url).trim_end_matches('/'));
        let info: VersionInfo = self.get_json(url).await?;
        Ok(info.version)
    }

    async fn node_state(&self, node_id: &str, url: &str, version: &str) -> Result<ClusterState, LookupError> {
        let url = format!("{}{}", self.absolute(url).trim_end_matches('/'), state_route(version));
        debug!(node = %node_id, url = %url, "node state lookup");
        self.get_json(url).await
    }

    async fn file_listing(
        &self,
        task_id: &str,
        url: &str,
        directory: &str,
        version: &str,
    ) -> Result<Vec<RawFile>, LookupError> {
        let url = format!(
            "{}{}?path={}",
            self.absolute(url).trim_end_matches('/'),
            browse_route(version),
            encode_component(directory)
        );
        debug!(task = %task_id, url = %url, "file listing lookup");
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_relative_urls_get_the_scheme() {
        let lookups = HttpLookups::new("http://marathon:8080/", "https:", Duration::from_secs(1)).unwrap();
        assert_eq!(lookups.absolute("//h:5051"), "https://h:5051");
        assert_eq!(lookups.absolute("http://leader:5050"), "http://leader:5050");
        assert_eq!(lookups.marathon("/v2/info"), "http://marathon:8080/v2/info");
    }
}
