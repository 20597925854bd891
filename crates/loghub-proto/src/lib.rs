// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire-level types for the loghub ingestion protocol.
//!
//! A log request travels as a JSON object (or, for bulk submissions, a JSON
//! array of such objects):
//!
//! ```json
//! { "logger_id": "app", "msg": "hello", "level": 128,
//!   "v": 0, "file": "main.rs", "line": 42, "func": "main",
//!   "token": "...", "client_id": "...", "_t": 1700000000000 }
//! ```
//!
//! Level integers keep the encoding long-lived client libraries already
//! emit: Trace=2, Debug=4, Fatal=8, Error=16, Warning=32, Verbose=64,
//! Info=128. `_t` is the client-side send time in epoch milliseconds and is
//! informational only; the server stamps its own receive time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Severity of a single log record, as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Fatal,
    Error,
    Warning,
    Verbose,
    Info,
}

impl LogLevel {
    /// Decodes a wire integer into a level. Unknown values are rejected,
    /// which makes a malformed `level` field detectable at decode time.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            2 => Some(Self::Trace),
            4 => Some(Self::Debug),
            8 => Some(Self::Fatal),
            16 => Some(Self::Error),
            32 => Some(Self::Warning),
            64 => Some(Self::Verbose),
            128 => Some(Self::Info),
            _ => None,
        }
    }

    /// Wire integer for this level.
    pub fn to_wire(self) -> u32 {
        match self {
            Self::Trace => 2,
            Self::Debug => 4,
            Self::Fatal => 8,
            Self::Error => 16,
            Self::Warning => 32,
            Self::Verbose => 64,
            Self::Info => 128,
        }
    }

    /// Upper-case display name used in formatted log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Verbose => "VERBOSE",
            Self::Info => "INFO",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        Self::from_wire(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown log level {value}")))
    }
}

/// One log request as submitted by a client.
///
/// Optional fields deserialize to their defaults so partially-filled
/// requests from older client libraries still parse; the server decides
/// validity separately (`logger_id`, `level` and `msg` must be present).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    #[serde(default)]
    pub logger_id: String,

    /// Absent (`None`) and empty message are distinct: the first marks the
    /// request invalid, the second is a legitimate blank line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    /// Verbosity for `Verbose`-level records.
    #[serde(default, rename = "v")]
    pub verbose_level: u32,

    #[serde(default)]
    pub file: String,

    #[serde(default)]
    pub line: u32,

    #[serde(default)]
    pub func: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub client_id: String,

    /// Client-side send time, epoch milliseconds. Never used for
    /// authorization decisions.
    #[serde(default, rename = "_t", skip_serializing_if = "Option::is_none")]
    pub client_time_ms: Option<u64>,
}

impl LogPayload {
    /// Parsed level, if present and well-formed.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.level.and_then(LogLevel::from_wire)
    }
}

/// Status written back on the session for an ingestion request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// Request accepted; processing continues asynchronously.
    StatusOk,
    /// Request could not be decoded and plain requests are disallowed.
    BadRequest,
    /// Decoded successfully; proceed to dispatch.
    Continue,
}

impl StatusCode {
    pub fn to_wire(self) -> u32 {
        match self {
            Self::StatusOk => 0,
            Self::BadRequest => 1,
            Self::Continue => 2,
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_wire_round_trip() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Verbose,
            LogLevel::Info,
        ] {
            assert_eq!(LogLevel::from_wire(level.to_wire()), Some(level));
        }
    }

    #[test]
    fn test_level_rejects_unknown_values() {
        assert_eq!(LogLevel::from_wire(0), None);
        assert_eq!(LogLevel::from_wire(3), None);
        assert_eq!(LogLevel::from_wire(256), None);
    }

    #[test]
    fn test_payload_parses_full_request() {
        let json = r#"{"logger_id":"app","msg":"hello","level":128,"v":2,
            "file":"main.rs","line":42,"func":"main","token":"T1",
            "client_id":"c1","_t":1700000000000}"#;

        let payload: LogPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.logger_id, "app");
        assert_eq!(payload.msg.as_deref(), Some("hello"));
        assert_eq!(payload.log_level(), Some(LogLevel::Info));
        assert_eq!(payload.verbose_level, 2);
        assert_eq!(payload.line, 42);
        assert_eq!(payload.client_time_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_payload_defaults_for_missing_fields() {
        let payload: LogPayload = serde_json::from_str(r#"{"logger_id":"app"}"#).unwrap();
        assert_eq!(payload.logger_id, "app");
        assert_eq!(payload.msg, None);
        assert_eq!(payload.level, None);
        assert_eq!(payload.log_level(), None);
        assert_eq!(payload.token, "");
        assert_eq!(payload.client_id, "");
    }

    #[test]
    fn test_payload_empty_msg_is_present() {
        let payload: LogPayload =
            serde_json::from_str(r#"{"logger_id":"app","msg":"","level":128}"#).unwrap();
        assert_eq!(payload.msg.as_deref(), Some(""));
    }

    #[test]
    fn test_status_code_wire_values() {
        assert_eq!(StatusCode::StatusOk.to_wire(), 0);
        assert_eq!(StatusCode::BadRequest.to_wire(), 1);
        assert_eq!(StatusCode::Continue.to_wire(), 2);
        assert_eq!(serde_json::to_string(&StatusCode::StatusOk).unwrap(), "0");
    }

    #[test]
    fn test_bulk_request_is_an_array_of_payloads() {
        let json = r#"[{"logger_id":"app","msg":"a","level":128},
                       {"logger_id":"app","msg":"b","level":16}]"#;
        let items: Vec<LogPayload> = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].log_level(), Some(LogLevel::Error));
    }
}
