// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log-request ingestion and dispatch engine.
//!
//! Flow: a session hands a [`RawRequest`] to the
//! [`LogRequestHandler`], which acknowledges immediately and enqueues it
//! on the [`SwappingQueue`]. A single dispatcher task drains the queue on
//! a fixed cadence, decoding each request ([`RequestDecoder`]), unpacking
//! bulks, authorizing every item against the client registry, and writing
//! authorized records through the sink with per-request format specifiers
//! installed.

mod decoder;
mod handler;
mod queue;
mod raw;
mod request;

pub use decoder::{DecodeError, RequestDecoder};
pub use handler::LogRequestHandler;
pub use queue::SwappingQueue;
pub use raw::RawRequest;
pub use request::LogRequest;

use async_trait::async_trait;
use loghub_proto::StatusCode;

/// The session-layer surface the ingestion core needs: writing a status
/// code back to the submitting client.
#[async_trait]
pub trait Session: Send + Sync {
    async fn write_status(&self, status: StatusCode) -> std::io::Result<()>;
}
