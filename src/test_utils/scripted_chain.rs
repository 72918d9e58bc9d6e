use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{IndexerError, Result};
use crate::schemas::BlockIdentity;
use crate::upstream::ChainSource;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process chain source with scripted answers.
///
/// Every height serves the same block (see [`ScriptedChain::with_block`]) unless it was marked
/// failing. Calls to `block_tx_count` are counted per height and the number of calls running at
/// once is tracked, so tests can assert on fan-out and coalescing.
pub struct ScriptedChain {
    tip: AtomicU64,
    status_tip: Option<u64>,
    tip_failing: AtomicBool,
    block: Option<(String, String, u64)>,
    delay: Duration,
    failing: Mutex<HashSet<u64>>,
    failing_identity: Mutex<HashSet<u64>>,
    visits: Mutex<HashMap<u64, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedChain {
    /// Tip 0, no delay, and a generated block per height.
    pub fn new() -> Self {
        Self {
            tip: AtomicU64::new(0),
            status_tip: None,
            tip_failing: AtomicBool::new(false),
            block: None,
            delay: Duration::ZERO,
            failing: Mutex::new(HashSet::new()),
            failing_identity: Mutex::new(HashSet::new()),
            visits: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Height reported by the REST latest-block route (and by status unless overridden).
    pub fn with_tip(self, tip: u64) -> Self {
        self.tip.store(tip, Ordering::SeqCst);
        self
    }

    pub fn with_status_tip(mut self, tip: u64) -> Self {
        self.status_tip = Some(tip);
        self
    }

    /// Serve this hash, proposer and tx count at every height.
    pub fn with_block(mut self, block_id: &str, proposer: &str, txs: u64) -> Self {
        self.block = Some((block_id.to_string(), proposer.to_string(), txs));
        self
    }

    /// Latency added to each `block_tx_count` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `block_tx_count` at `height` fail with a network error.
    pub fn fail_height(&self, height: u64) {
        guard(&self.failing).insert(height);
    }

    /// Make `block_identity` at `height` fail with a missing proposer field.
    pub fn fail_identity(&self, height: u64) {
        guard(&self.failing_identity).insert(height);
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn set_tip_failing(&self, failing: bool) {
        self.tip_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `block_tx_count` calls made for `height`.
    pub fn visits(&self, height: u64) -> usize {
        guard(&self.visits).get(&height).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        guard(&self.visits).values().sum()
    }

    /// Most `block_tx_count` calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn tip_or_fail(&self, tip: u64, route: &str) -> Result<u64> {
        if self.tip_failing.load(Ordering::SeqCst) {
            return Err(IndexerError::network(route, "scripted tip failure"));
        }
        Ok(tip)
    }
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainSource for ScriptedChain {
    async fn latest_height_from_status(&self) -> Result<u64> {
        let tip = self.status_tip.unwrap_or_else(|| self.tip.load(Ordering::SeqCst));
        self.tip_or_fail(tip, "scripted://status")
    }

    async fn latest_height_from_rest(&self) -> Result<u64> {
        self.tip_or_fail(self.tip.load(Ordering::SeqCst), "scripted://blocks/latest")
    }

    async fn block_tx_count(&self, height: u64) -> Result<u64> {
        *guard(&self.visits).entry(height).or_insert(0) += 1;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if guard(&self.failing).contains(&height) {
            return Err(IndexerError::network(
                format!("scripted://block_results?height={height}"),
                "HTTP 500 Internal Server Error",
            ));
        }
        Ok(self.block.as_ref().map_or(height % 4, |(_, _, txs)| *txs))
    }

    async fn block_identity(&self, height: u64) -> Result<BlockIdentity> {
        if guard(&self.failing_identity).contains(&height) {
            return Err(IndexerError::field_missing(
                "block",
                "block.header.proposer_address",
            ));
        }
        Ok(match &self.block {
            Some((block_id, proposer, _)) => {
                BlockIdentity { block_id: block_id.clone(), proposer: proposer.clone() }
            }
            None => BlockIdentity {
                block_id: format!("{height:064X}"),
                proposer: "PROPOSER".to_string(),
            },
        })
    }
}
