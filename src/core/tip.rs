use serde::Serialize;
use tracing::{debug, info, warn};

use crate::upstream::ChainSource;

/// Upper bound of a scan: the configured ceiling, raised to the tip when the tip is higher.
#[inline]
pub fn effective_max(ceiling: u64, tip: u64) -> u64 {
    ceiling.max(tip)
}

/// Re-resolve the tip from the REST latest-block route and merge it with `ceiling`.
/// The status endpoint is not consulted here; a failed lookup keeps the ceiling.
pub async fn resolve_scan_ceiling<S: ChainSource>(source: &S, ceiling: u64) -> u64 {
    match source.latest_height_from_rest().await {
        Ok(tip) => {
            if tip > ceiling {
                info!(
                    tip,
                    ceiling, "[tip] latest block height is above the configured max, raising it"
                );
            }
            effective_max(ceiling, tip)
        }
        Err(e) => {
            warn!(error = %e, ceiling, "[tip] failed to fetch latest block height");
            ceiling
        }
    }
}

/// Both tip readings side by side.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TipReport {
    pub status_height: Option<u64>,
    pub latest_block_height: Option<u64>,
    pub errors: Vec<String>,
}

impl TipReport {
    /// Distance between the two sources when both answered.
    pub fn drift(&self) -> Option<u64> {
        match (self.status_height, self.latest_block_height) {
            (Some(a), Some(b)) => Some(a.abs_diff(b)),
            _ => None,
        }
    }
}

pub async fn tip_report<S: ChainSource>(source: &S) -> TipReport {
    let (status, rest) =
        tokio::join!(source.latest_height_from_status(), source.latest_height_from_rest());

    let mut report = TipReport::default();
    match status {
        Ok(h) => report.status_height = Some(h),
        Err(e) => report.errors.push(e.to_string()),
    }
    match rest {
        Ok(h) => report.latest_block_height = Some(h),
        Err(e) => report.errors.push(e.to_string()),
    }
    if let Some(drift) = report.drift().filter(|d| *d > 0) {
        debug!(
            drift,
            status = ?report.status_height,
            rest = ?report.latest_block_height,
            "[tip] tip sources disagree"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedChain;

    #[test]
    fn merge_law_takes_the_larger_bound() {
        assert_eq!(effective_max(100, 50), 100);
        assert_eq!(effective_max(100, 100), 100);
        assert_eq!(effective_max(100, 150), 150);
        assert_eq!(effective_max(0, 0), 0);
    }

    #[tokio::test]
    async fn ceiling_raised_only_by_higher_tip() {
        let chain = ScriptedChain::new().with_tip(120);
        assert_eq!(resolve_scan_ceiling(&chain, 100).await, 120);
        assert_eq!(resolve_scan_ceiling(&chain, 500).await, 500);
    }

    #[tokio::test]
    async fn ceiling_kept_when_tip_lookup_fails() {
        let chain = ScriptedChain::new().with_tip(900);
        chain.set_tip_failing(true);
        assert_eq!(resolve_scan_ceiling(&chain, 100).await, 100);
    }

    #[tokio::test]
    async fn report_carries_both_sources() {
        let chain = ScriptedChain::new().with_tip(120).with_status_tip(118);
        let report = tip_report(&chain).await;
        assert_eq!(report.status_height, Some(118));
        assert_eq!(report.latest_block_height, Some(120));
        assert_eq!(report.drift(), Some(2));
        assert!(report.errors.is_empty());
    }
}
