// Runtime configuration, loaded once at startup from config.toml.
use crate::context::AppContext;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_api_base() -> String {
    "https://ctf.hackthebox.com/api/public/ctfs".to_string()
}
fn default_user_agent() -> String {
    format!("ctfwatch/{}", env!("CARGO_PKG_VERSION"))
}
fn default_detail_delay() -> f64 {
    1.0
}
fn default_http_timeout() -> u64 {
    20
}
fn default_remind_window() -> i64 {
    72
}

/// SMTP transport settings. All fields are required; emptiness is caught by
/// `Config::validate` so the process fails fast instead of discovering a
/// half-configured mailer mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Fixed recipient of every notification.
    pub to: String,
    /// Fixed sender identity, e.g. `CTF Watcher <watcher@example.com>`.
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Identification header sent with every catalog request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Explicit cache file location; defaults to ctf_cache.json in the data dir.
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
    /// Politeness pause before each detail fetch during discovery.
    #[serde(default = "default_detail_delay")]
    pub detail_delay_secs: f64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Reminder look-ahead window.
    #[serde(default = "default_remind_window")]
    pub remind_window_hours: i64,
    pub smtp: SmtpConfig,
}

impl Config {
    /// Load the configuration from the context's standard location.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        Self::load_from(&ctx.get_config_file_path()?)
    }

    /// Load the configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Reject configurations with blank required fields, naming all of them
    /// at once so a fresh setup needs a single round trip.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("smtp.server", &self.smtp.server),
            ("smtp.username", &self.smtp.username),
            ("smtp.password", &self.smtp.password),
            ("smtp.to", &self.smtp.to),
            ("smtp.from", &self.smtp.from),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            bail!("Missing required configuration values: {}", missing.join(", "));
        }
        if self.smtp.port == 0 {
            bail!("smtp.port must be non-zero");
        }
        if !self.detail_delay_secs.is_finite() || self.detail_delay_secs < 0.0 {
            bail!("detail_delay_secs must be a non-negative number");
        }
        if self.remind_window_hours < 0 {
            bail!("remind_window_hours must be non-negative");
        }
        Ok(())
    }
}
