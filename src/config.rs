use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{DEFAULT_ORIGIN, DEFAULT_WARMUP_FRAMES, SCAN_INTERVAL_MS};
use crate::capture::Facing;

/// Runtime configuration, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Origin own code urls start with, e.g. `https://tickets.example`
    pub origin: String,
    pub scan_interval_ms: u64,
    pub facing: Facing,
    /// JSON code store; `None` keeps codes in memory
    pub store_path: Option<PathBuf>,
    pub warmup_frames: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            origin: DEFAULT_ORIGIN.to_string(),
            scan_interval_ms: SCAN_INTERVAL_MS,
            facing: Facing::default(),
            store_path: None,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        let origin = config.origin.clone();
        config.set_origin(&origin);
        config.validate()?;
        Ok(config)
    }

    /// Set the origin, dropping trailing slashes
    pub fn set_origin(&mut self, origin: &str) {
        self.origin = origin.trim().trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.is_empty() {
            bail!("origin must not be empty");
        }
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            bail!("origin must be an http(s) url, got '{}'", self.origin);
        }
        if self.scan_interval_ms == 0 {
            bail!("scan interval must be greater than zero");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
