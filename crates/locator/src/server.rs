//! Minimal HTTP front: `/metrics` and `/files?agent=&task=`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::download::{wait_for_listing, DownloadError};
use crate::metrics::Metrics;
use crate::service::ServiceHandle;

#[derive(Clone)]
pub struct ServerState {
    pub handle: ServiceHandle,
    pub metrics: Arc<Metrics>,
    /// How long `/files` waits for a listing before answering 504.
    pub resolve_timeout: Duration,
}

pub async fn serve(state: ServerState, bind_addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(address = %bind_addr, "http server listening");
    serve_listener(state, listener).await;
    Ok(())
}

pub async fn serve_listener(state: ServerState, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((mut stream, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 2048];
                    let _ = tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await;
                    let req = String::from_utf8_lossy(&buf);
                    let path = req
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    debug!(peer = %peer, path = %path, "request");

                    let (status_line, content_type, body) = route(&state, &path).await;
                    let resp = format!(
                        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(resp.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

async fn route(state: &ServerState, path: &str) -> (&'static str, &'static str, String) {
    let (route, query) = path.split_once('?').unwrap_or((path, ""));
    match route {
        "/metrics" => ("HTTP/1.1 200 OK", "text/plain; version=0.0.4", state.metrics.render_prometheus()),
        "/files" => {
            let mut agent = None;
            let mut task = None;
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                match k.as_ref() {
                    "agent" if !v.is_empty() => agent = Some(v.into_owned()),
                    "task" if !v.is_empty() => task = Some(v.into_owned()),
                    _ => {}
                }
            }
            let (Some(agent), Some(task)) = (agent, task) else {
                return ("HTTP/1.1 400 Bad Request", TEXT, "agent and task are required\n".into());
            };
            match wait_for_listing(&state.handle, &agent, &task, state.resolve_timeout).await {
                Ok(files) => match serde_json::to_string(&files) {
                    Ok(body) => ("HTTP/1.1 200 OK", JSON, body),
                    Err(e) => ("HTTP/1.1 500 Internal Server Error", TEXT, format!("{e}\n")),
                },
                Err(e @ DownloadError::Stopped(_)) => ("HTTP/1.1 503 Service Unavailable", TEXT, format!("{e}\n")),
                Err(e) => ("HTTP/1.1 504 Gateway Timeout", TEXT, format!("{e}\n")),
            }
        }
        _ => ("HTTP/1.1 404 Not Found", TEXT, "not found\n".into()),
    }
}
