use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::{fs, time::Duration};

use crate::core::IndexerConfig;
use crate::core::scanner::DEFAULT_CONCURRENCY;

fn default_db_path() -> String {
    "./db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_min_height() -> u64 {
    6_341_001
}

fn default_max_height() -> u64 {
    11_553_690
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_pass_delay_ms() -> u64 {
    2000
}

fn default_write_queue_capacity() -> usize {
    1024
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Tendermint RPC base (serves /status, /block, /block_results).
    pub rpc_url: String,
    /// Cosmos REST gateway base (serves the latest block header).
    pub rest_url: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_min_height")]
    pub min_height: u64,
    #[serde(default = "default_max_height")]
    pub max_height: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_pass_delay_ms")]
    pub pass_delay_ms: u64,
    #[serde(default = "default_write_queue_capacity")]
    pub write_queue_capacity: usize,
    #[serde(default)]
    pub upstream_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: String,
    pub rest_url: String,
    pub db_path: String,
    pub port: u16,
    pub min_height: u64,
    pub max_height: u64,
    pub concurrency: usize,
    pub pass_delay_ms: u64,
    pub write_queue_capacity: usize,
    pub upstream_timeout_ms: Option<u64>,
    pub view_only: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Path to JSON config file.
    #[arg(long, default_value = "./config.json")]
    pub config_path: String,

    /// Serve stored blocks without running backfill passes.
    #[arg(long, default_value_t = false)]
    pub view_only: bool,
}

fn load_config_file(path: &str) -> Result<ConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {path}"))?;
    serde_json::from_str(&raw).context("failed to parse config JSON")
}

impl AppConfig {
    pub fn from_file(file: ConfigFile, view_only: bool) -> Result<Self> {
        let cfg = Self {
            rpc_url: normalize_url(&file.rpc_url),
            rest_url: normalize_url(&file.rest_url),
            db_path: file.db_path,
            port: file.port,
            min_height: file.min_height,
            max_height: file.max_height,
            concurrency: file.concurrency,
            pass_delay_ms: file.pass_delay_ms,
            write_queue_capacity: file.write_queue_capacity,
            upstream_timeout_ms: file.upstream_timeout_ms.filter(|ms| *ms > 0),
            view_only,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants and make sure `db_path` exists as a directory.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            anyhow::bail!("rpc_url must be provided");
        }
        if self.rest_url.is_empty() {
            anyhow::bail!("rest_url must be provided");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }
        if self.write_queue_capacity == 0 {
            anyhow::bail!("write_queue_capacity must be greater than 0");
        }
        if self.min_height > self.max_height {
            anyhow::bail!(
                "min_height ({}) must not exceed max_height ({})",
                self.min_height,
                self.max_height
            );
        }

        let db_root = Path::new(&self.db_path);
        if !db_root.exists() {
            fs::create_dir_all(db_root)
                .with_context(|| format!("failed to create db_path {}", self.db_path))?;
        } else if !db_root.is_dir() {
            anyhow::bail!("db_path is not a directory: {}", self.db_path);
        }
        Ok(())
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            concurrency: self.concurrency,
            write_queue_capacity: self.write_queue_capacity,
        }
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_ms.map(Duration::from_millis)
    }

    pub fn pass_delay(&self) -> Duration {
        Duration::from_millis(self.pass_delay_ms)
    }

    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

pub fn load_config() -> Result<AppConfig> {
    let cli = CliArgs::parse();
    let file = load_config_file(&cli.config_path)?;
    AppConfig::from_file(file, cli.view_only)
}
