pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod schemas;
pub mod upstream;
pub mod utils;

// Test doubles used by unit tests and by the integration tests under tests/
pub mod test_utils;
