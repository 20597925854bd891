// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-request specifier installation around a single write.

use crate::sink::{FormatterFn, LogSink, CLIENT_ID_SPECIFIER, IP_SPECIFIER};

/// Guard that installs the `%client_id` and `%ip` specifiers for one
/// dispatch and uninstalls them when dropped. Dropping covers every exit
/// path out of the dispatch, including panics and early returns.
pub struct FormatInjector<'a> {
    sink: &'a dyn LogSink,
}

impl<'a> FormatInjector<'a> {
    pub fn install(sink: &'a dyn LogSink, client_id: &str, ip_addr: &str) -> Self {
        let client_id = client_id.to_string();
        let ip_addr = ip_addr.to_string();
        sink.install_formatter(
            CLIENT_ID_SPECIFIER,
            Box::new(move || client_id.clone()) as FormatterFn,
        );
        sink.install_formatter(
            IP_SPECIFIER,
            Box::new(move || ip_addr.clone()) as FormatterFn,
        );
        Self { sink }
    }
}

impl Drop for FormatInjector<'_> {
    fn drop(&mut self) {
        self.sink.uninstall_formatter(CLIENT_ID_SPECIFIER);
        self.sink.uninstall_formatter(IP_SPECIFIER);
    }
}
