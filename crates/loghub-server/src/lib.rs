// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # loghub server
//!
//! Centralized, authenticated log ingestion: remote clients submit
//! encrypted (or, where policy permits, plain) log requests, individually
//! or in bulk, which the server validates, normalises, and dispatches
//! through a pluggable sink that applies per-logger formatting and writes
//! to disk.
//!
//! ## Architecture
//!
//! ```text
//!   Sessions (N producers)
//!        │ handle()  (ack STATUS_OK first)
//!        v
//!   ┌───────────────┐
//!   │ SwappingQueue │  (double-buffered; producers touch only the
//!   └───────┬───────┘   active buffer)
//!           │ single dispatcher task, 100 ms cadence
//!           v
//!   ┌───────────────┐
//!   │    Decoder    │  (decrypt, decompress, parse; bulk unpack)
//!   └───────┬───────┘
//!           │ per item
//!           v
//!   ┌───────────────┐
//!   │  Authorizer   │  (client liveness, token, logger policy,
//!   └───────┬───────┘   integrity-sweep re-validation)
//!           │
//!           v
//!   ┌───────────────┐
//!   │    LogSink    │  (per-request %client_id / %ip specifiers
//!   └───────────────┘   installed around each write)
//! ```
//!
//! The library is organized into:
//! - [`config`]: server configuration and per-logger policy
//! - [`registry`]: client records, tokens, and the integrity sweep
//! - [`crypto`]: the injected payload-decryption capability
//! - [`ingest`]: the queue, decoder, and dispatch engine
//! - [`sink`]: the `LogSink` contract and the file-backed sink
//! - [`server`]: line-framed TCP intake

#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod ingest;
pub mod logger;
pub mod registry;
pub mod server;
pub mod sink;

/// Logger id reserved for the server's own diagnostics. Client requests
/// naming it are always rejected.
pub const SERVER_LOGGER_ID: &str = "loghub";
