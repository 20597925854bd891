// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Custom tracing formatter for the server's own diagnostics.
//!
//! Every internal line is prefixed with `LOGHUB` so server diagnostics are
//! distinguishable from the user log files the sink produces:
//!
//! ```text
//! LOGHUB | INFO | intake listening addr=0.0.0.0:8777
//! LOGHUB | WARN | dispatch{cycle=12}: Ignoring log from unauthorized logger logger_id="secret"
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Formatter producing `LOGHUB | LEVEL | [span{fields}:] message`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGHUB | {} | ", metadata.level())?;

        // Include the active span hierarchy, root first, for context.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
