//! Configuration types and loading
//!
//! Key material resolution order: WILDFIRE_API_KEYS env var (comma-separated)
//! > api_key_file (one key per line) > inline api_keys list. Inline keys are
//! for lab setups; real deployments should use the env var or key file so the
//! TOML stays free of secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub wildfire: WildfireConfig,
    pub daemon: DaemonConfig,
}

/// Remote analysis service settings
#[derive(Debug, Deserialize)]
pub struct WildfireConfig {
    /// Base URL the endpoint paths (/submit, /verdict, /report) hang off.
    pub base_url: String,
    #[serde(default)]
    pub api_keys: Vec<Secret<String>>,
    /// Path to a file with one API key per line (alternative to the
    /// WILDFIRE_API_KEYS env var and the inline list)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Cumulative request ceiling before the quota gate closes. Absent =
    /// unlimited.
    #[serde(default)]
    pub request_quota: Option<u64>,
    /// Requests-per-minute ceiling. Absent = no throttling.
    #[serde(default)]
    pub throttle_per_minute: Option<u32>,
    /// How long the quota gate stays closed after a breach.
    #[serde(default = "default_quota_reset_secs")]
    pub quota_reset_secs: u64,
    /// Where retrieved report artifacts land, one file per sample hash.
    pub report_dir: PathBuf,
}

/// Daemon settings
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Status endpoint (/health, /metrics) bind address.
    pub listen_addr: SocketAddr,
    /// Directory scanned for binaries to analyze.
    pub spool_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_verify_tls() -> bool {
    true
}

fn default_quota_reset_secs() -> u64 {
    3600
}

fn default_workers() -> usize {
    4
}

fn default_scan_interval_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables and validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.wildfire.base_url.starts_with("http://")
            && !config.wildfire.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.wildfire.base_url
            )));
        }

        if config.daemon.workers == 0 {
            return Err(common::Error::Config(
                "workers must be greater than 0".into(),
            ));
        }

        if config.daemon.scan_interval_secs == 0 {
            return Err(common::Error::Config(
                "scan_interval_secs must be greater than 0".into(),
            ));
        }

        if config.wildfire.quota_reset_secs == 0 {
            return Err(common::Error::Config(
                "quota_reset_secs must be greater than 0".into(),
            ));
        }

        // Resolve key material: env var takes precedence over key file,
        // which takes precedence over inline keys.
        if let Ok(keys) = std::env::var("WILDFIRE_API_KEYS") {
            config.wildfire.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| Secret::new(k.to_string()))
                .collect();
        } else if let Some(ref key_file) = config.wildfire.api_key_file {
            let contents = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            config.wildfire.api_keys = contents
                .lines()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| Secret::new(k.to_string()))
                .collect();
        }

        if config.wildfire.api_keys.is_empty() {
            return Err(common::Error::Config(
                "no API keys configured (set api_keys, api_key_file, or WILDFIRE_API_KEYS)".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("wildfire-connector.toml")
    }
}
