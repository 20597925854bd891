// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The downstream log-writing contract.
//!
//! The ingestion core hands every authorized request to a [`LogSink`].
//! Besides the write itself, the contract carries a small specifier table:
//! the dispatcher installs per-request specifiers (`%client_id`, `%ip`)
//! immediately before a write and uninstalls them right after, so sink
//! format patterns can reference request identity without the sink knowing
//! about requests.
//!
//! Only the single dispatcher task mutates the table; the mutex exists
//! because the sink object itself is shared.

mod file;
mod inject;

pub use file::FileSink;
pub use inject::FormatInjector;

use loghub_proto::LogLevel;

/// Specifier name bound to the authoring client id during a dispatch.
pub const CLIENT_ID_SPECIFIER: &str = "client_id";

/// Specifier name bound to the request's source address during a dispatch.
pub const IP_SPECIFIER: &str = "ip";

/// Resolves a custom format specifier to its replacement text.
pub type FormatterFn = Box<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("refusing to write for malformed logger id {0:?}")]
    InvalidLoggerId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One record to be written, borrowed from the dispatched request.
#[derive(Debug, Clone, Copy)]
pub struct SinkRecord<'a> {
    pub logger_id: &'a str,
    pub level: LogLevel,
    pub verbose_level: u32,
    pub file: &'a str,
    pub line: u32,
    pub func: &'a str,
    pub msg: &'a str,
}

pub trait LogSink: Send + Sync {
    /// Writes one record through the logger's format pattern.
    fn write(&self, record: &SinkRecord<'_>) -> Result<(), SinkError>;

    /// Installs (or replaces) a custom format specifier.
    fn install_formatter(&self, name: &'static str, formatter: FormatterFn);

    /// Removes a custom format specifier; unknown names are a no-op.
    fn uninstall_formatter(&self, name: &str);

    /// True iff a specifier with this name is currently installed.
    fn has_formatter(&self, name: &str) -> bool;
}
