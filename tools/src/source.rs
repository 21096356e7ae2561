//! Snapshot source: fetches each node's exporter document.
//!
//! `http(s)://` endpoints go through reqwest; `file://` endpoints are read
//! from disk, which is handy for replaying captured snapshots.

use fleet_accounting_core::{config::NodeConfig, cycle::FetchedSnapshot, error::FetchError};
use futures::future::join_all;
use std::time::Duration;

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, node: &NodeConfig) -> Result<String, FetchError> {
        if let Some(path) = node.url.strip_prefix("file://") {
            return tokio::fs::read_to_string(path)
                .await
                .map_err(|e| FetchError::Transport(format!("{path}: {e}")));
        }

        let response = self.client.get(&node.url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { code: status.as_u16() });
        }
        response.text().await.map_err(transport)
    }

    /// Fetch every node concurrently. Order follows `nodes`.
    pub async fn fetch_all(&self, nodes: &[NodeConfig]) -> Vec<FetchedSnapshot> {
        join_all(nodes.iter().map(|node| async move {
            let result = self.fetch(node).await;
            if let Err(e) = &result {
                log::warn!("node {}: fetch from {} failed: {e}", node.name, node.url);
            }
            FetchedSnapshot { node: node.clone(), result }
        }))
        .await
    }
}

fn transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}
