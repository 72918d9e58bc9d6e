pub mod client;
pub mod parse;

use std::future::Future;

use crate::error::Result;
use crate::schemas::BlockIdentity;

pub use client::ChainClient;

/// Read-only view of the chain node: two tip sources and the two per-height calls the fetch
/// pipeline merges.
pub trait ChainSource: Send + Sync + 'static {
    /// Tip as reported by the node's sync status.
    fn latest_height_from_status(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Tip as reported by the latest block header on the REST gateway.
    fn latest_height_from_rest(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Number of transaction results at `height`.
    fn block_tx_count(&self, height: u64) -> impl Future<Output = Result<u64>> + Send;

    /// Hash and proposer of the block at `height`.
    fn block_identity(&self, height: u64) -> impl Future<Output = Result<BlockIdentity>> + Send;
}
