//! # Task queue configuration
//!
//! Settings arrive as plain string key/value pairs, the same shape DogRS
//! applications use for `app.set()` / `app.get()`. The keys are:
//!
//! | key | meaning |
//! | --- | --- |
//! | `REDIS_PREFIX` | key prefix handed to the backend |
//! | `REDIS_URI` | direct connection URI |
//! | `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB` | discrete connection settings |
//! | `REDIS_SENTINEL` | enable sentinel failover (flag) |
//! | `REDIS_SENTINEL_MASTER` | sentinel master name |
//! | `REDIS_SENTINEL_HOST` | comma separated sentinel hosts |
//! | `REDIS_SENTINEL_PORT` | comma separated sentinel ports |
//! | `START_PROCESSING` | bind consumers on registration (flag, default on) |
//! | `DEBUG` | log queue lifecycle events (set = on) |
//! | `UI_ENABLED` / `UI_PORT` | backend UI settings (port default 3050) |
//!
//! ```rust
//! use dog_tasks::config::{select_connection, ConnectionStrategy, TaskSettings};
//!
//! let settings = TaskSettings::from_pairs([
//!     ("REDIS_SENTINEL", "true"),
//!     ("REDIS_SENTINEL_MASTER", "mymaster"),
//!     ("REDIS_SENTINEL_HOST", "10.0.0.1,10.0.0.2"),
//!     ("REDIS_SENTINEL_PORT", "26379,26380"),
//! ]);
//!
//! let selection = select_connection(&settings);
//! assert!(matches!(selection.config.strategy, ConnectionStrategy::Sentinel { .. }));
//! assert!(selection.warnings.is_empty());
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

pub const DEFAULT_UI_PORT: u16 = 3050;

/// Parse a boolean flag against a fixed vocabulary.
///
/// Anything outside the vocabulary is `false`.
pub fn parse_flag(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" | "" => false,
        other => {
            warn!(value = %other, "Unrecognised boolean flag, treating as false");
            false
        }
    }
}

/// Settings for the task queue layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub prefix: Option<String>,
    pub uri: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub db: Option<String>,
    pub sentinel: bool,
    pub sentinel_master: Option<String>,
    pub sentinel_hosts: Option<String>,
    pub sentinel_ports: Option<String>,
    pub start_processing: bool,
    pub debug: bool,
    pub ui_enabled: bool,
    pub ui_port: u16,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            prefix: None,
            uri: None,
            host: None,
            port: None,
            db: None,
            sentinel: false,
            sentinel_master: None,
            sentinel_hosts: None,
            sentinel_ports: None,
            start_processing: true,
            debug: false,
            ui_enabled: false,
            ui_port: DEFAULT_UI_PORT,
        }
    }
}

impl TaskSettings {
    /// Build settings from key/value pairs. Empty values count as unset.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            prefix: get("REDIS_PREFIX"),
            uri: get("REDIS_URI"),
            host: get("REDIS_HOST"),
            port: get("REDIS_PORT"),
            db: get("REDIS_DB"),
            sentinel: get("REDIS_SENTINEL").is_some_and(|v| parse_flag(&v)),
            sentinel_master: get("REDIS_SENTINEL_MASTER"),
            sentinel_hosts: get("REDIS_SENTINEL_HOST"),
            sentinel_ports: get("REDIS_SENTINEL_PORT"),
            start_processing: get("START_PROCESSING").map_or(true, |v| parse_flag(&v)),
            debug: get("DEBUG").is_some(),
            ui_enabled: get("UI_ENABLED").is_some_and(|v| parse_flag(&v)),
            ui_port: get("UI_PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(DEFAULT_UI_PORT),
        }
    }

    /// Read settings from the process environment using the bare key names
    pub fn from_env() -> Self {
        Self::from_env_with_prefix("")
    }

    /// Read settings from environment variables named `{prefix}{KEY}`,
    /// e.g. `KUE_REDIS_URI` with prefix `"KUE_"`
    pub fn from_env_with_prefix(prefix: &str) -> Self {
        Self::from_pairs(std::env::vars().filter_map(|(key, value)| {
            key.strip_prefix(prefix).map(|k| (k.to_string(), value))
        }))
    }
}

/// One sentinel node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelEndpoint {
    pub host: String,
    pub port: u16,
}

/// How every queue in the process reaches the backend store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStrategy {
    Direct {
        uri: String,
    },
    /// Unset fields are left to the backend's defaults
    HostPortDb {
        host: Option<String>,
        port: Option<u16>,
        db: Option<u32>,
    },
    Sentinel {
        master: String,
        sentinels: Vec<SentinelEndpoint>,
    },
}

impl fmt::Display for ConnectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { uri } => write!(f, "direct({uri})"),
            Self::HostPortDb { host, port, db } => write!(
                f,
                "host({}:{}/{})",
                host.as_deref().unwrap_or("<default>"),
                port.map_or("<default>".to_string(), |p| p.to_string()),
                db.map_or("<default>".to_string(), |d| d.to_string()),
            ),
            Self::Sentinel { master, sentinels } => {
                let nodes: Vec<String> = sentinels
                    .iter()
                    .map(|s| format!("{}:{}", s.host, s.port))
                    .collect();
                write!(f, "sentinel({master} via {})", nodes.join(","))
            }
        }
    }
}

/// Connection settings shared by all queues of a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub prefix: Option<String>,
    pub strategy: ConnectionStrategy,
}

/// Non-fatal configuration problem that triggered a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationWarning {
    pub key: &'static str,
    pub message: String,
}

impl ConfigurationWarning {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Outcome of connection selection
#[derive(Debug, Clone)]
pub struct ConnectionSelection {
    pub config: ConnectionConfig,
    pub warnings: Vec<ConfigurationWarning>,
}

/// Pick the connection strategy: sentinel when requested and complete,
/// otherwise a direct URI, otherwise discrete host/port/db settings.
pub fn select_connection(settings: &TaskSettings) -> ConnectionSelection {
    let mut warnings = Vec::new();

    let sentinel = if settings.sentinel {
        match sentinel_strategy(settings) {
            Ok(strategy) => Some(strategy),
            Err(warning) => {
                warn!(key = warning.key, "{}, falling back to a plain connection", warning.message);
                warnings.push(warning);
                None
            }
        }
    } else {
        None
    };

    let strategy = match sentinel {
        Some(strategy) => strategy,
        None => plain_strategy(settings, &mut warnings),
    };

    ConnectionSelection {
        config: ConnectionConfig {
            prefix: settings.prefix.clone(),
            strategy,
        },
        warnings,
    }
}

fn sentinel_strategy(settings: &TaskSettings) -> Result<ConnectionStrategy, ConfigurationWarning> {
    let master = settings.sentinel_master.clone().ok_or_else(|| {
        ConfigurationWarning::new("REDIS_SENTINEL_MASTER", "sentinel mode requires a master name")
    })?;
    let hosts = settings.sentinel_hosts.as_deref().ok_or_else(|| {
        ConfigurationWarning::new("REDIS_SENTINEL_HOST", "sentinel mode requires sentinel hosts")
    })?;
    let ports = settings.sentinel_ports.as_deref().ok_or_else(|| {
        ConfigurationWarning::new("REDIS_SENTINEL_PORT", "sentinel mode requires sentinel ports")
    })?;

    let hosts: Vec<&str> = split_list(hosts);
    let ports = split_list(ports)
        .into_iter()
        .map(|p| {
            p.parse::<u16>().map_err(|_| {
                ConfigurationWarning::new("REDIS_SENTINEL_PORT", format!("invalid sentinel port `{p}`"))
            })
        })
        .collect::<Result<Vec<u16>, _>>()?;

    if hosts.is_empty() {
        return Err(ConfigurationWarning::new("REDIS_SENTINEL_HOST", "sentinel host list is empty"));
    }
    if ports.len() != 1 && ports.len() != hosts.len() {
        return Err(ConfigurationWarning::new(
            "REDIS_SENTINEL_PORT",
            format!("{} sentinel hosts but {} ports", hosts.len(), ports.len()),
        ));
    }

    let sentinels = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| SentinelEndpoint {
            host: host.to_string(),
            port: if ports.len() == 1 { ports[0] } else { ports[i] },
        })
        .collect();

    Ok(ConnectionStrategy::Sentinel { master, sentinels })
}

fn plain_strategy(settings: &TaskSettings, warnings: &mut Vec<ConfigurationWarning>) -> ConnectionStrategy {
    if let Some(uri) = &settings.uri {
        return ConnectionStrategy::Direct { uri: uri.clone() };
    }

    let port = settings.port.as_deref().and_then(|p| match p.parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            let warning = ConfigurationWarning::new("REDIS_PORT", format!("invalid port `{p}`, using backend default"));
            warn!(key = warning.key, "{}", warning.message);
            warnings.push(warning);
            None
        }
    });
    let db = settings.db.as_deref().and_then(|d| match d.parse::<u32>() {
        Ok(db) => Some(db),
        Err(_) => {
            let warning = ConfigurationWarning::new("REDIS_DB", format!("invalid db `{d}`, using backend default"));
            warn!(key = warning.key, "{}", warning.message);
            warnings.push(warning);
            None
        }
    });

    ConnectionStrategy::HostPortDb {
        host: settings.host.clone(),
        port,
        db,
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_parse_flag_vocabulary() {
        for on in ["true", "TRUE", "1", "yes", "On"] {
            assert!(parse_flag(on), "{on} should be true");
        }
        for off in ["false", "0", "no", "off", ""] {
            assert!(!parse_flag(off), "{off} should be false");
        }
        assert!(!parse_flag("process.exit(1)"));
        assert!(!parse_flag("maybe"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = TaskSettings::from_pairs(Vec::<(String, String)>::new());
        assert!(settings.start_processing);
        assert!(!settings.debug);
        assert!(!settings.ui_enabled);
        assert_eq!(settings.ui_port, 3050);
    }

    #[test]
    fn test_settings_flags() {
        let settings = TaskSettings::from_pairs([
            ("START_PROCESSING", "false"),
            ("DEBUG", "1"),
            ("UI_ENABLED", "yes"),
            ("UI_PORT", "not-a-port"),
        ]);
        assert!(!settings.start_processing);
        assert!(settings.debug);
        assert!(settings.ui_enabled);
        assert_eq!(settings.ui_port, 3050);

        let settings = TaskSettings::from_pairs([("START_PROCESSING", "garbage")]);
        assert!(!settings.start_processing);
    }

    #[test]
    fn test_sentinel_selected_when_complete() {
        let settings = TaskSettings::from_pairs([
            ("REDIS_SENTINEL", "true"),
            ("REDIS_SENTINEL_MASTER", "mymaster"),
            ("REDIS_SENTINEL_HOST", "a, b"),
            ("REDIS_SENTINEL_PORT", "26379,26380"),
            ("REDIS_PREFIX", "q"),
        ]);
        let selection = select_connection(&settings);

        assert!(selection.warnings.is_empty());
        assert_eq!(selection.config.prefix.as_deref(), Some("q"));
        assert_eq!(
            selection.config.strategy,
            ConnectionStrategy::Sentinel {
                master: "mymaster".to_string(),
                sentinels: vec![
                    SentinelEndpoint { host: "a".to_string(), port: 26379 },
                    SentinelEndpoint { host: "b".to_string(), port: 26380 },
                ],
            }
        );
    }

    #[test]
    fn test_single_sentinel_port_applies_to_all_hosts() {
        let settings = TaskSettings::from_pairs([
            ("REDIS_SENTINEL", "true"),
            ("REDIS_SENTINEL_MASTER", "m"),
            ("REDIS_SENTINEL_HOST", "a,b,c"),
            ("REDIS_SENTINEL_PORT", "26379"),
        ]);
        match select_connection(&settings).config.strategy {
            ConnectionStrategy::Sentinel { sentinels, .. } => {
                assert_eq!(sentinels.len(), 3);
                assert!(sentinels.iter().all(|s| s.port == 26379));
            }
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    #[traced_test]
    fn test_sentinel_without_master_falls_back() {
        let settings = TaskSettings::from_pairs([
            ("REDIS_SENTINEL", "true"),
            ("REDIS_SENTINEL_HOST", "a"),
            ("REDIS_SENTINEL_PORT", "26379"),
            ("REDIS_HOST", "cache.local"),
            ("REDIS_PORT", "6380"),
        ]);
        let selection = select_connection(&settings);

        assert_eq!(selection.warnings.len(), 1);
        assert_eq!(selection.warnings[0].key, "REDIS_SENTINEL_MASTER");
        assert_eq!(
            selection.config.strategy,
            ConnectionStrategy::HostPortDb {
                host: Some("cache.local".to_string()),
                port: Some(6380),
                db: None,
            }
        );
        assert!(logs_contain("falling back to a plain connection"));
    }

    #[test]
    fn test_sentinel_port_mismatch_falls_back_to_uri() {
        let settings = TaskSettings::from_pairs([
            ("REDIS_SENTINEL", "on"),
            ("REDIS_SENTINEL_MASTER", "m"),
            ("REDIS_SENTINEL_HOST", "a,b,c"),
            ("REDIS_SENTINEL_PORT", "1,2"),
            ("REDIS_URI", "redis://cache:6379/2"),
        ]);
        let selection = select_connection(&settings);

        assert_eq!(selection.warnings.len(), 1);
        assert_eq!(
            selection.config.strategy,
            ConnectionStrategy::Direct { uri: "redis://cache:6379/2".to_string() }
        );
    }

    #[test]
    fn test_uri_wins_over_discrete_settings() {
        let settings = TaskSettings::from_pairs([
            ("REDIS_URI", "redis://cache:6379"),
            ("REDIS_HOST", "ignored"),
        ]);
        assert_eq!(
            select_connection(&settings).config.strategy,
            ConnectionStrategy::Direct { uri: "redis://cache:6379".to_string() }
        );
    }

    #[test]
    fn test_discrete_settings_leave_unset_fields_to_backend() {
        let settings = TaskSettings::from_pairs([("REDIS_DB", "3"), ("REDIS_PORT", "x")]);
        let selection = select_connection(&settings);

        assert_eq!(
            selection.config.strategy,
            ConnectionStrategy::HostPortDb { host: None, port: None, db: Some(3) }
        );
        assert_eq!(selection.warnings.len(), 1);
        assert_eq!(selection.warnings[0].key, "REDIS_PORT");
    }

    #[test]
    fn test_sentinel_ignored_when_not_requested() {
        let settings = TaskSettings::from_pairs([("REDIS_SENTINEL_MASTER", "m")]);
        let selection = select_connection(&settings);
        assert!(matches!(selection.config.strategy, ConnectionStrategy::HostPortDb { .. }));
        assert!(selection.warnings.is_empty());
    }
}
