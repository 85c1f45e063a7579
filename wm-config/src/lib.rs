//! `EngineConfig`: the single TOML file the CLI binary accepts (SPEC_FULL
//! §10.3). Argument parsing is out of scope (spec.md §1's explicit
//! non-goal); every other knob lives here with a `Default` so a config
//! file only needs to name what it overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

/// Peer-certificate verification mode, mirrored here rather than
/// pulled from `wm-net` so this crate stays free of the network stack;
/// the engine maps this onto `wm_net::VerifyMode` at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerifyModeConfig {
    #[default]
    Full,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfigToml {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ProxyConfigToml {
    fn default() -> Self {
        Self { host: String::new(), port: 0, username: None, password: None }
    }
}

/// The full set of knobs the Engine, Processor, Web Client, and
/// connection pool are constructed from (spec.md §4.2-§4.10).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// URLs to seed the URL Table with on first run, read from this
    /// file; if empty the binary falls back to reading seeds from
    /// stdin (SPEC_FULL §10.3).
    pub seeds: Vec<String>,

    /// Directory the URL Table's SQLite file and mirrored output are
    /// written under.
    pub output_dir: PathBuf,

    /// Number of concurrent Engine workers (spec.md §4.10).
    pub concurrency: usize,

    /// Follow discovered links beyond the seed set.
    pub recursive: bool,
    /// Fetch page requisites (images, scripts, stylesheets) even when
    /// `recursive` is false.
    pub page_requisites: bool,
    /// Allow following links off the seed host(s).
    pub span_hosts: bool,
    /// Maximum recursion depth; `None` is unbounded.
    pub level: Option<u32>,
    /// Maximum attempts per URL; `0` means unlimited (SPEC_FULL §12).
    pub tries: u32,
    /// Schemes the `SchemeFilter` admits.
    pub allowed_schemes: Vec<String>,
    /// Extra hosts the `SpanHostsFilter` admits beyond the seed host(s)
    /// when `span_hosts` is set.
    pub allowed_hosts: Vec<String>,

    pub user_agent: String,
    pub robots: bool,
    pub compression: bool,
    pub keep_alive: bool,
    pub max_redirects: u32,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    /// Outer wall-clock budget for a full body read; `None` disables it.
    pub duration_timeout_secs: Option<u64>,
    pub robots_fetch_timeout_secs: u64,

    pub max_count: usize,
    pub max_host_count: usize,
    pub happy_eyeballs_ttl_secs: u64,
    pub verify_mode: VerifyModeConfig,
    pub proxy: Option<ProxyConfigToml>,

    pub waiter_base_millis: u64,
    pub waiter_max_millis: u64,
    pub retry_connrefused: bool,
    pub retry_dns_error: bool,

    pub spill_threshold_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            output_dir: PathBuf::from("./mirror"),
            concurrency: 4,
            recursive: true,
            page_requisites: true,
            span_hosts: false,
            level: None,
            tries: 3,
            allowed_schemes: vec!["http".into(), "https".into()],
            allowed_hosts: Vec::new(),
            user_agent: "wmirror/0.1".into(),
            robots: true,
            compression: true,
            keep_alive: true,
            max_redirects: 20,
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            duration_timeout_secs: None,
            robots_fetch_timeout_secs: 20,
            max_count: 200,
            max_host_count: 6,
            happy_eyeballs_ttl_secs: 600,
            verify_mode: VerifyModeConfig::Full,
            proxy: None,
            waiter_base_millis: 500,
            waiter_max_millis: 30_000,
            retry_connrefused: false,
            retry_dns_error: false,
            spill_threshold_bytes: 4 << 20,
        }
    }
}

impl EngineConfig {
    /// Loads and parses a TOML config file, falling back to
    /// [`Default`] values for anything the file doesn't set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_all_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.concurrency, 4);
        assert!(config.recursive);
        assert_eq!(config.tries, 3);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "concurrency = 16\ntries = 0\nseeds = [\"http://host/\"]\n").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.concurrency, 16);
        assert_eq!(config.tries, 0);
        assert_eq!(config.seeds, vec!["http://host/".to_string()]);
        assert_eq!(config.waiter_base_millis, 500);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = EngineConfig::load("/nonexistent/path/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "concurrency = not-a-number").unwrap();
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
