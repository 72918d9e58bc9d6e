use crate::config::AppConfig;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test AppConfig instances with temporary directories
pub struct TestConfigBuilder {
    config: AppConfig,
    temp_dirs: Vec<TempDir>,
}

impl TestConfigBuilder {
    /// Small scan window, low concurrency, no pass delay, and a fresh DB directory.
    pub fn new() -> Self {
        let db_temp = TempDir::new().expect("create temp db");
        let db_path = db_temp.path().to_string_lossy().to_string();

        let config = AppConfig {
            rpc_url: "http://127.0.0.1:26657".to_string(), // Placeholder
            rest_url: "http://127.0.0.1:1317".to_string(), // Placeholder
            db_path,
            port: 0, // Let OS assign port
            min_height: 1,
            max_height: 10,
            concurrency: 4,
            pass_delay_ms: 0,
            write_queue_capacity: 64,
            upstream_timeout_ms: Some(5_000),
            view_only: true, // Default to view-only for tests
        };

        Self { config, temp_dirs: vec![db_temp] }
    }

    /// Point both the RPC and REST bases at one server (e.g. a `MockChainNode`).
    pub fn with_node_url(mut self, url: &str) -> Self {
        self.config.rpc_url = url.to_string();
        self.config.rest_url = url.to_string();
        self
    }

    pub fn with_range(mut self, min_height: u64, max_height: u64) -> Self {
        self.config.min_height = min_height;
        self.config.max_height = max_height;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn with_view_only(mut self, view_only: bool) -> Self {
        self.config.view_only = view_only;
        self
    }

    /// Create a new temporary directory and return its path
    pub fn create_temp_dir(&mut self) -> PathBuf {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().to_path_buf();
        self.temp_dirs.push(temp_dir);
        path
    }

    /// Build and return the config along with temp directory handles
    /// The caller must keep the TempDir handles alive to prevent cleanup
    pub fn build(self) -> (AppConfig, Vec<TempDir>) {
        (self.config, self.temp_dirs)
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_defaults() {
        let (config, _temp_dirs) = TestConfigBuilder::new().build();

        assert!(config.view_only);
        assert_eq!(config.pass_delay_ms, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_customization() {
        let (config, _temp_dirs) = TestConfigBuilder::new()
            .with_node_url("http://127.0.0.1:9999")
            .with_range(10, 12)
            .with_concurrency(100)
            .with_view_only(false)
            .build();

        assert_eq!(config.rpc_url, config.rest_url);
        assert_eq!((config.min_height, config.max_height), (10, 12));
        assert_eq!(config.indexer_config().concurrency, 100);
        assert!(!config.view_only);
    }

    #[test]
    fn test_temp_dirs_exist() {
        let mut builder = TestConfigBuilder::new();
        let extra = builder.create_temp_dir();
        let (config, temp_dirs) = builder.build();

        assert!(std::path::Path::new(&config.db_path).exists());
        assert!(extra.exists());
        assert_eq!(temp_dirs.len(), 2);
    }
}
