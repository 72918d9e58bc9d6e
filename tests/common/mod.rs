// Common utilities for integration tests

mod test_harness;

// Re-export test utilities for convenience in integration tests
#[allow(unused_imports)]
pub use blockmirror::test_utils::{MockBlock, MockChainNode, TestConfigBuilder};

// Re-export the full test harness
pub use test_harness::IndexerHarness;
