use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "FEEDHUB_DATA_DIR";
/// Environment variable overriding the default fetch interval (e.g. "3m")
pub const ENV_TIMER_INTERVAL: &str = "CLI_APP_TIMER_INTERVAL";
/// Environment variable overriding the default worker count
pub const ENV_WORKERS_COUNT: &str = "CLI_APP_WORKERS_COUNT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Dispatch interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Number of fetch workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of pending fetch jobs
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How often the running process polls for reconfiguration commands
    #[serde(default = "default_command_poll")]
    pub command_poll_ms: u64,
    /// Lease renewal period for the fetch lock
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    /// A lease not renewed for this long may be taken over by another process
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            command_poll_ms: default_command_poll(),
            heartbeat_secs: default_heartbeat(),
            lease_timeout_secs: default_lease_timeout(),
        }
    }
}

impl AggregatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn command_poll(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            proxy_url: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedhub")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> u64 {
    180 // 3 minutes
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_command_poll() -> u64 {
    2000
}

fn default_heartbeat() -> u64 {
    30
}

fn default_lease_timeout() -> u64 {
    300 // 5 minutes
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("feedhub/{}", env!("CARGO_PKG_VERSION"))
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Apply environment overrides on top of the loaded file.
    ///
    /// Values that fail to parse are ignored and the configured value is kept.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.general.data_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(ENV_TIMER_INTERVAL).filter(|v| !v.is_empty()) {
            match parse_duration(&raw) {
                Ok(d) if d.as_secs() > 0 => self.aggregator.interval_secs = d.as_secs(),
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_TIMER_INTERVAL, raw),
            }
        }

        if let Some(raw) = lookup(ENV_WORKERS_COUNT).filter(|v| !v.is_empty()) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.aggregator.workers = n,
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_WORKERS_COUNT, raw),
            }
        }
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let agg = &self.aggregator;
        if agg.workers == 0 {
            return Err(crate::Error::Config("aggregator.workers must be greater than 0".into()));
        }
        if agg.interval_secs == 0 {
            return Err(crate::Error::Config("aggregator.interval_secs must be greater than 0".into()));
        }
        if agg.queue_capacity == 0 {
            return Err(crate::Error::Config("aggregator.queue_capacity must be greater than 0".into()));
        }
        if agg.command_poll_ms == 0 {
            return Err(crate::Error::Config("aggregator.command_poll_ms must be greater than 0".into()));
        }
        if agg.heartbeat_secs == 0 || agg.heartbeat_secs * 2 > agg.lease_timeout_secs {
            return Err(crate::Error::Config(
                "aggregator.heartbeat_secs must be non-zero and at most half of lease_timeout_secs".into(),
            ));
        }
        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/feedhub/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("feedhub")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("feedhub.db")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

/// Parse a human duration such as "90s", "2m", "1h30m" or "500ms".
pub fn parse_duration(input: &str) -> crate::Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidArgument("empty duration".into()));
    }

    let invalid = || crate::Error::InvalidArgument(format!("invalid duration: {:?}", input));

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

/// Format a duration in the same notation `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let mut secs = d.as_secs();
    let mut out = String::new();
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;

    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 3m ").unwrap(), Duration::from_secs(180));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5 minutes").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_format_duration_parses_back() {
        for d in [
            Duration::from_secs(180),
            Duration::from_secs(5400),
            Duration::from_secs(3661),
            Duration::from_millis(1500),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
        assert_eq!(format_duration(Duration::from_secs(180)), "3m");
    }

    #[test]
    fn test_defaults_and_partial_toml() {
        let config = AppConfig::from_toml("[aggregator]\nworkers = 7\n").unwrap();
        assert_eq!(config.aggregator.workers, 7);
        assert_eq!(config.aggregator.interval_secs, 180);
        assert_eq!(config.aggregator.queue_capacity, 100);
        assert_eq!(config.aggregator.command_poll_ms, 2000);
        assert_eq!(config.http.request_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_TIMER_INTERVAL, "2m"),
            (ENV_WORKERS_COUNT, "5"),
            (ENV_DATA_DIR, "/tmp/feedhub-test"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.aggregator.interval_secs, 120);
        assert_eq!(config.aggregator.workers, 5);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/feedhub-test"));
    }

    #[test]
    fn test_invalid_env_overrides_keep_defaults() {
        let mut config = AppConfig::default();
        config.apply_overrides(|k| match k {
            ENV_TIMER_INTERVAL => Some("soon".to_string()),
            ENV_WORKERS_COUNT => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(config.aggregator.interval_secs, 180);
        assert_eq!(config.aggregator.workers, 3);
    }

    #[test]
    fn test_validate_rejects_bad_heartbeat() {
        let mut config = AppConfig::default();
        config.aggregator.heartbeat_secs = 200;
        assert!(config.validate().is_err());

        config.aggregator.heartbeat_secs = 30;
        config.aggregator.workers = 0;
        assert!(config.validate().is_err());
    }
}
