// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! File-backed sink: one append-only file per logger under the configured
//! log directory, each record formatted through the logger's pattern.
//!
//! Patterns are `%specifier` strings. Built-in specifiers: `%datetime`,
//! `%level`, `%vlevel`, `%logger`, `%file`, `%line`, `%func`, `%msg`.
//! `%%` emits a literal percent sign. Anything else is looked up in the
//! custom specifier table (where the dispatcher installs `%client_id` and
//! `%ip` per request) and otherwise emitted verbatim.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::config::{logger_id_is_well_formed, Configuration};
use crate::sink::{FormatterFn, LogSink, SinkError, SinkRecord};

pub struct FileSink {
    directory: PathBuf,
    configuration: Arc<Configuration>,
    files: Mutex<HashMap<String, File>>,
    formatters: Mutex<HashMap<String, FormatterFn>>,
}

impl FileSink {
    /// Creates the sink, ensuring the log directory exists.
    pub fn new(configuration: Arc<Configuration>) -> Result<Self, SinkError> {
        let directory = configuration.log_directory().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            configuration,
            files: Mutex::new(HashMap::new()),
            formatters: Mutex::new(HashMap::new()),
        })
    }

    fn format_line(&self, pattern: &str, record: &SinkRecord<'_>) -> String {
        let mut out = String::with_capacity(pattern.len() + record.msg.len() + 32);
        let formatters = match self.formatters.lock() {
            Ok(formatters) => formatters,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bytes = pattern.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'%' {
                let start = i;
                while i < bytes.len() && bytes[i] != b'%' {
                    i += 1;
                }
                out.push_str(&pattern[start..i]);
                continue;
            }
            if i + 1 < bytes.len() && bytes[i + 1] == b'%' {
                out.push('%');
                i += 2;
                continue;
            }

            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_lowercase()
                    || bytes[end].is_ascii_digit()
                    || bytes[end] == b'_')
            {
                end += 1;
            }
            let name = &pattern[start..end];
            match name {
                "datetime" => {
                    out.push_str(&Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
                }
                "level" => out.push_str(record.level.as_str()),
                "vlevel" => out.push_str(&record.verbose_level.to_string()),
                "logger" => out.push_str(record.logger_id),
                "file" => out.push_str(record.file),
                "line" => out.push_str(&record.line.to_string()),
                "func" => out.push_str(record.func),
                "msg" => out.push_str(record.msg),
                _ => match formatters.get(name) {
                    Some(formatter) => out.push_str(&formatter()),
                    // Unknown specifier stays visible in the output.
                    None => {
                        out.push('%');
                        out.push_str(name);
                    }
                },
            }
            i = end;
        }
        out
    }
}

impl LogSink for FileSink {
    fn write(&self, record: &SinkRecord<'_>) -> Result<(), SinkError> {
        // Logger ids become file names; the authorizer validates them, but
        // the sink does not rely on that.
        if !logger_id_is_well_formed(record.logger_id) {
            return Err(SinkError::InvalidLoggerId(record.logger_id.to_string()));
        }

        let line = self.format_line(self.configuration.log_format(record.logger_id), record);

        let mut files = match self.files.lock() {
            Ok(files) => files,
            Err(poisoned) => poisoned.into_inner(),
        };
        let file = match files.entry(record.logger_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self.directory.join(format!("{}.log", record.logger_id));
                entry.insert(OpenOptions::new().create(true).append(true).open(path)?)
            }
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    fn install_formatter(&self, name: &'static str, formatter: FormatterFn) {
        if let Ok(mut formatters) = self.formatters.lock() {
            formatters.insert(name.to_string(), formatter);
        }
    }

    fn uninstall_formatter(&self, name: &str) {
        if let Ok(mut formatters) = self.formatters.lock() {
            formatters.remove(name);
        }
    }

    fn has_formatter(&self, name: &str) -> bool {
        self.formatters
            .lock()
            .map(|formatters| formatters.contains_key(name))
            .unwrap_or(false)
    }
}
