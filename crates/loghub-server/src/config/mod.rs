// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Server configuration.
//!
//! Configuration is a read-only snapshot for the ingestion core: global
//! policy flags, bulk limits, the known-logger table with per-logger
//! overrides, and the blacklist. It is loaded once from a JSON file and
//! shared behind an `Arc`.
//!
//! The one mutable corner is unknown-logger user learning: when unknown
//! loggers are admitted, the server records which client first used each
//! one, so later administrative tooling can assign ownership. That map
//! lives behind interior mutability and does not affect policy decisions.
//!
//! ## File shape
//!
//! ```json
//! {
//!   "listen_addr": "0.0.0.0:8777",
//!   "log_directory": "logs",
//!   "allow_plain_log_request": false,
//!   "allow_bulk_log_request": true,
//!   "allow_unknown_loggers": false,
//!   "compression": true,
//!   "max_items_in_bulk": 5,
//!   "dispatch_delay": 1,
//!   "known_loggers": [
//!     { "logger_id": "app", "allow_plain_log_request": true,
//!       "format": "%datetime %level %msg" }
//!   ],
//!   "blacklist": ["noisy"]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::ingest::LogRequest;

/// Global policy flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    /// Accept requests that are neither encrypted nor signed.
    AllowPlainLogRequest,
    /// Accept bulk (JSON array) requests.
    AllowBulkLogRequest,
    /// Accept loggers that are not declared in `known_loggers`.
    AllowUnknownLoggers,
    /// Attempt zstd decompression of incoming payloads.
    Compression,
}

/// Per-logger policy flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoggerFlag {
    /// This logger accepts plain requests even when the global flag is off,
    /// and its tokens are not checked.
    AllowPlainLogRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_listen_addr() -> String {
    "0.0.0.0:8777".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> String {
    "%datetime %level [%logger] [%client_id@%ip] %msg".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_items_in_bulk() -> u32 {
    5
}

fn default_dispatch_delay() -> u64 {
    1
}

fn default_client_age() -> u64 {
    259_200
}

fn default_integrity_interval() -> u64 {
    300
}

/// Declaration of a single known logger.
#[derive(Clone, Debug, Deserialize)]
pub struct KnownLogger {
    pub logger_id: String,

    /// Per-logger [`LoggerFlag::AllowPlainLogRequest`].
    #[serde(default)]
    pub allow_plain_log_request: bool,

    /// Line format overriding `default_log_format` for this logger.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,

    #[serde(default = "default_log_directory")]
    log_directory: PathBuf,

    #[serde(default = "default_log_format")]
    default_log_format: String,

    #[serde(default)]
    allow_plain_log_request: bool,

    #[serde(default = "default_true")]
    allow_bulk_log_request: bool,

    #[serde(default)]
    allow_unknown_loggers: bool,

    #[serde(default = "default_true")]
    compression: bool,

    #[serde(default = "default_max_items_in_bulk")]
    max_items_in_bulk: u32,

    /// Milliseconds slept before each dispatched item.
    #[serde(default = "default_dispatch_delay")]
    dispatch_delay: u64,

    /// Default maximum client lifetime in seconds (0 = unbounded).
    #[serde(default = "default_client_age")]
    client_age: u64,

    /// Seconds between client integrity sweeps.
    #[serde(default = "default_integrity_interval")]
    client_integrity_task_interval: u64,

    #[serde(default)]
    known_loggers: Vec<KnownLogger>,

    #[serde(default)]
    blacklist: Vec<String>,
}

impl Default for ConfigFile {
    // serde_json applies every field default on an empty object.
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults always deserialize")
    }
}

/// Read-only configuration snapshot shared across the server.
#[derive(Debug)]
pub struct Configuration {
    listen_addr: String,
    log_directory: PathBuf,
    default_log_format: String,

    allow_plain_log_request: bool,
    allow_bulk_log_request: bool,
    allow_unknown_loggers: bool,
    compression: bool,

    max_items_in_bulk: u32,
    dispatch_delay: u64,
    client_age: u64,
    client_integrity_task_interval: u64,

    known_loggers: HashMap<String, KnownLogger>,
    blacklist: HashSet<String>,

    /// logger id -> client id that first used it; see module docs.
    unknown_logger_users: RwLock<HashMap<String, String>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::from_parts(ConfigFile::default())
    }
}

impl Configuration {
    /// Loads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(contents)?;

        for logger in &file.known_loggers {
            if !logger_id_is_well_formed(&logger.logger_id) {
                return Err(ConfigError::Invalid(format!(
                    "malformed logger id in known_loggers: {:?}",
                    logger.logger_id
                )));
            }
        }
        if file.max_items_in_bulk == 0 {
            return Err(ConfigError::Invalid(
                "max_items_in_bulk must be at least 1".to_string(),
            ));
        }

        Ok(Self::from_parts(file))
    }

    fn from_parts(file: ConfigFile) -> Self {
        let known_loggers: HashMap<String, KnownLogger> = file
            .known_loggers
            .into_iter()
            .map(|l| (l.logger_id.clone(), l))
            .collect();

        // A blacklist entry for a declared logger is contradictory; the
        // declaration wins.
        let blacklist = file
            .blacklist
            .into_iter()
            .filter(|id| {
                if known_loggers.contains_key(id) {
                    warn!(logger_id = %id, "ignoring blacklist entry for known logger");
                    false
                } else {
                    true
                }
            })
            .collect();

        Self {
            listen_addr: file.listen_addr,
            log_directory: file.log_directory,
            default_log_format: file.default_log_format,
            allow_plain_log_request: file.allow_plain_log_request,
            allow_bulk_log_request: file.allow_bulk_log_request,
            allow_unknown_loggers: file.allow_unknown_loggers,
            compression: file.compression,
            max_items_in_bulk: file.max_items_in_bulk,
            dispatch_delay: file.dispatch_delay,
            client_age: file.client_age,
            client_integrity_task_interval: file.client_integrity_task_interval,
            known_loggers,
            blacklist,
            unknown_logger_users: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::AllowPlainLogRequest => self.allow_plain_log_request,
            Flag::AllowBulkLogRequest => self.allow_bulk_log_request,
            Flag::AllowUnknownLoggers => self.allow_unknown_loggers,
            Flag::Compression => self.compression,
        }
    }

    pub fn has_logger_flag(&self, logger_id: &str, flag: LoggerFlag) -> bool {
        match flag {
            LoggerFlag::AllowPlainLogRequest => self
                .known_loggers
                .get(logger_id)
                .map(|l| l.allow_plain_log_request)
                .unwrap_or(false),
        }
    }

    pub fn is_known_logger(&self, logger_id: &str) -> bool {
        self.known_loggers.contains_key(logger_id)
    }

    pub fn is_blacklisted(&self, logger_id: &str) -> bool {
        self.blacklist.contains(logger_id)
    }

    pub fn max_items_in_bulk(&self) -> u32 {
        self.max_items_in_bulk
    }

    /// Milliseconds slept before each dispatched item (0 disables).
    pub fn dispatch_delay(&self) -> u64 {
        self.dispatch_delay
    }

    /// Default maximum client lifetime in seconds (0 = unbounded).
    pub fn client_age(&self) -> u64 {
        self.client_age
    }

    pub fn client_integrity_task_interval(&self) -> u64 {
        self.client_integrity_task_interval
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    /// Line format for a logger: its declared override, or the default.
    pub fn log_format(&self, logger_id: &str) -> &str {
        self.known_loggers
            .get(logger_id)
            .and_then(|l| l.format.as_deref())
            .unwrap_or(&self.default_log_format)
    }

    /// Records the owning client for a hitherto-unknown logger. First
    /// writer wins; later requests for the same logger are ignored.
    pub fn update_unknown_logger_user_from_request(&self, logger_id: &str, request: &LogRequest) {
        if request.client_id().is_empty() {
            return;
        }
        if let Ok(mut users) = self.unknown_logger_users.write() {
            users
                .entry(logger_id.to_string())
                .or_insert_with(|| request.client_id().to_string());
        }
    }

    /// Client recorded as the user of an unknown logger, if any.
    pub fn unknown_logger_user(&self, logger_id: &str) -> Option<String> {
        self.unknown_logger_users
            .read()
            .ok()
            .and_then(|users| users.get(logger_id).cloned())
    }
}

/// Logger ids are path-safe tokens; the sink uses them as file names.
pub fn logger_id_is_well_formed(logger_id: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").unwrap());
    pattern.is_match(logger_id)
}
