//! Environment-based configuration.
//!
//! Everything is read from the process environment (after `.env` loading),
//! so deployment is a matter of setting variables on the scheduler entry.
//! Per-source credentials are optional: a missing key turns that adapter
//! into a logged skip rather than an error.

use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Courtesy delay before each adapter call within a collector run.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Per-adapter record limit.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default)]
    pub govinfo_api_key: Option<String>,
    #[serde(default)]
    pub lens_api_token: Option<String>,
    #[serde(default)]
    pub patentsview_api_key: Option<String>,
    /// Opt-in for the heuristic EUR-Lex scrape.
    #[serde(default)]
    pub enable_eurlex: bool,
    /// Minutes between cycles in interval mode.
    #[serde(default = "default_import_interval_minutes")]
    pub import_interval_minutes: u64,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_request_delay_ms() -> u64 {
    1500
}

fn default_fetch_limit() -> u32 {
    20
}

fn default_import_interval_minutes() -> u64 {
    30
}

impl Config {
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }
}
