// src/config/mod.rs
//! Service configuration: one TOML file, every key optional.
//!
//! Path comes from `NBA_CONFIG_PATH` (default `config/nba.toml`). A missing file means
//! defaults; a malformed one is an error. `NBA_BIND` / `NBA_EXTRACTOR` override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rl::LearningParams;

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/nba.toml";
pub const ENV_CONFIG_PATH: &str = "NBA_CONFIG_PATH";
pub const ENV_BIND: &str = "NBA_BIND";
pub const ENV_EXTRACTOR: &str = "NBA_EXTRACTOR";

/// Upper bound for either batching window (one week).
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NbaConfig {
    pub server: ServerConfig,
    pub learning: LearningParams,
    pub batching: BatchingConfig,
    pub extractor: ExtractorConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Debounce windows for inbound message threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub quiet_period_secs: u64,
    pub max_accumulation_secs: u64,
    pub max_buffered_messages: usize,
    pub sweep_interval_secs: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: 5 * 60,
            max_accumulation_secs: 15 * 60,
            max_buffered_messages: 6,
            sweep_interval_secs: 60,
        }
    }
}

impl BatchingConfig {
    pub fn quiet_period(&self) -> chrono::Duration {
        window(self.quiet_period_secs)
    }
    pub fn max_accumulation(&self) -> chrono::Duration {
        window(self.max_accumulation_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn window(secs: u64) -> chrono::Duration {
    // lossless: MAX_WINDOW_SECS fits in i64
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

/// Q-table warm start; no path means every entry starts at zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// "mock" | "openai" | "disabled" (case-insensitive)
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 10,
            max_tokens: 800,
        }
    }
}

impl NbaConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: NbaConfig = toml::from_str(s).context("parsing nba config")?;
        cfg.normalize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading nba config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// `$NBA_CONFIG_PATH` or the default path; defaults when the file does not exist.
    /// Env overrides applied last.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.server.bind = bind.trim().to_string();
            }
        }
        if let Ok(p) = std::env::var(ENV_EXTRACTOR) {
            if !p.trim().is_empty() {
                self.extractor.provider = p;
            }
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.extractor.provider = self.extractor.provider.trim().to_lowercase();
        if self.batching.max_buffered_messages == 0 {
            self.batching.max_buffered_messages = BatchingConfig::default().max_buffered_messages;
        }
        self.batching.quiet_period_secs = self.batching.quiet_period_secs.min(MAX_WINDOW_SECS);
        self.batching.max_accumulation_secs =
            self.batching.max_accumulation_secs.min(MAX_WINDOW_SECS);
        self.learning = self.learning.sanitized();
    }
}
