// Test doubles for the chain node and config, shared by unit and integration tests

pub use tempfile::TempDir;

pub mod config_builder;
pub mod mock_node;
pub mod scripted_chain;

pub use config_builder::TestConfigBuilder;
pub use mock_node::{MockBlock, MockChainNode};
pub use scripted_chain::ScriptedChain;
