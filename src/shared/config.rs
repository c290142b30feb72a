//! Application configuration. Bot token, store path, schedule tuning.

use chrono::NaiveTime;
use serde::Deserialize;

use crate::domain::DomainError;

/// Max concurrent deliveries per fan-out.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 20;

/// Minutes between full active-event reminder scans.
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 20;

/// Seconds between process startup and the first reminder scan.
pub const DEFAULT_SCAN_INITIAL_DELAY_SECS: u64 = 10;

/// Daily wall-clock slots (host-local) at which one broadcast entry is drained.
pub const DEFAULT_BROADCAST_TIMES: &str = "09:00,10:00,19:00";

/// Per-request transport timeout so a stuck delivery cannot hold a fan-out
/// slot indefinitely.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Telegram Bot API token. Read from TG_NOTIFY_BOT_TOKEN.
    pub bot_token: Option<String>,

    /// Directory holding the SQLite store. Read from TG_NOTIFY_DATA_DIR.
    pub data_dir: Option<String>,

    /// Minutes between reminder scans. Read from TG_NOTIFY_SCAN_INTERVAL_MINUTES.
    #[serde(default)]
    pub scan_interval_minutes: Option<u64>,

    /// Delay in seconds before the first scan. Read from TG_NOTIFY_SCAN_INITIAL_DELAY_SECS.
    #[serde(default)]
    pub scan_initial_delay_secs: Option<u64>,

    /// Comma-separated HH:MM local times for broadcast drains. Read from TG_NOTIFY_BROADCAST_TIMES.
    #[serde(default)]
    pub broadcast_times: Option<String>,

    /// Max concurrent deliveries per fan-out. Read from TG_NOTIFY_FANOUT_CONCURRENCY.
    #[serde(default)]
    pub fanout_concurrency: Option<usize>,

    /// Per-request transport timeout in seconds. Read from TG_NOTIFY_SEND_TIMEOUT_SECS.
    #[serde(default)]
    pub send_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("TG_NOTIFY"));
        if let Ok(path) = std::env::var("TG_NOTIFY_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    /// Returns the scan interval in minutes. Defaults to 20 if unset.
    pub fn scan_interval_minutes_or_default(&self) -> u64 {
        self.scan_interval_minutes
            .unwrap_or(DEFAULT_SCAN_INTERVAL_MINUTES)
    }

    /// Returns the initial scan delay in seconds. Defaults to 10 if unset.
    pub fn scan_initial_delay_secs_or_default(&self) -> u64 {
        self.scan_initial_delay_secs
            .unwrap_or(DEFAULT_SCAN_INITIAL_DELAY_SECS)
    }

    /// Returns the fan-out concurrency cap. Defaults to 20 if unset.
    pub fn fanout_concurrency_or_default(&self) -> usize {
        self.fanout_concurrency
            .unwrap_or(DEFAULT_FANOUT_CONCURRENCY)
    }

    /// Returns the transport timeout in seconds. Defaults to 30 if unset.
    pub fn send_timeout_secs_or_default(&self) -> u64 {
        self.send_timeout_secs.unwrap_or(DEFAULT_SEND_TIMEOUT_SECS)
    }

    /// Parse the configured daily drain times. An unparseable entry is a
    /// startup error, not a skipped slot.
    pub fn broadcast_times_or_default(&self) -> Result<Vec<NaiveTime>, DomainError> {
        parse_times(
            self.broadcast_times
                .as_deref()
                .unwrap_or(DEFAULT_BROADCAST_TIMES),
        )
    }
}

fn parse_times(spec: &str) -> Result<Vec<NaiveTime>, DomainError> {
    let times: Vec<NaiveTime> = spec
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|e| DomainError::Config(format!("invalid broadcast time '{}': {}", s, e)))
        })
        .collect::<Result<_, _>>()?;
    if times.is_empty() {
        return Err(DomainError::Config(
            "broadcast times list is empty".to_string(),
        ));
    }
    Ok(times)
}
