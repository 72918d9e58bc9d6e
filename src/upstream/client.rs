// Chain node HTTP client: Tendermint RPC for status/block/block_results, Cosmos REST gateway for
// the latest block header.

use anyhow::{Context, Result as AnyResult};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

use crate::error::{IndexerError, Result};
use crate::schemas::BlockIdentity;
use crate::upstream::{ChainSource, parse};

/// REST route serving the latest block header.
pub const LATEST_BLOCK_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks/latest";

/// Longest slice of an error body echoed into error messages.
const MAX_ERROR_BODY: usize = 256;

#[derive(Clone)]
pub struct ChainClient {
    rpc_url: String,
    rest_url: String,
    http: HttpClient,
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl ChainClient {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(rpc_url: &str, rest_url: &str, timeout: Option<Duration>) -> AnyResult<Self> {
        let mut builder = HttpClient::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build().context("failed to create HTTP client")?;
        Ok(Self { rpc_url: trim_base(rpc_url), rest_url: trim_base(rest_url), http })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    async fn get_json(&self, url: &str, context: &str) -> Result<Value> {
        let resp = self.http.get(url).send().await.map_err(|e| IndexerError::network(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body: String =
                resp.text().await.unwrap_or_default().chars().take(MAX_ERROR_BODY).collect();
            return Err(IndexerError::network(url, format!("HTTP {status}: {body}")));
        }

        let body = resp.text().await.map_err(|e| IndexerError::network(url, e))?;
        serde_json::from_str(&body).map_err(|e| IndexerError::parse(context, e))
    }
}

impl ChainSource for ChainClient {
    async fn latest_height_from_status(&self) -> Result<u64> {
        let url = format!("{}/status", self.rpc_url);
        let body = self.get_json(&url, "status").await?;
        parse::status_height(&body)
    }

    async fn latest_height_from_rest(&self) -> Result<u64> {
        let url = format!("{}{}", self.rest_url, LATEST_BLOCK_PATH);
        let body = self.get_json(&url, "latest block").await?;
        parse::latest_block_height(&body)
    }

    async fn block_tx_count(&self, height: u64) -> Result<u64> {
        let url = format!("{}/block_results?height={height}", self.rpc_url);
        let body = self.get_json(&url, "block_results").await?;
        parse::tx_count(&body)
    }

    async fn block_identity(&self, height: u64) -> Result<BlockIdentity> {
        let url = format!("{}/block?height={height}", self.rpc_url);
        let body = self.get_json(&url, "block").await?;
        parse::block_identity(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_are_trimmed() {
        let c = ChainClient::new(" http://rpc.local/ ", "http://rest.local//", None).unwrap();
        assert_eq!(c.rpc_url(), "http://rpc.local");
        assert_eq!(c.rest_url(), "http://rest.local");
    }
}
