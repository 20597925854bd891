// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client records and per-logger access tokens.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::clock;
use crate::config::{Configuration, LoggerFlag};

/// Time-bounded credential binding a client to one logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    /// Absolute expiry, epoch seconds. 0 = never expires.
    expiry: u64,
}

impl Token {
    pub fn new(value: impl Into<String>, expiry: u64) -> Self {
        Self {
            value: value.into(),
            expiry,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_valid_at(&self, timestamp: u64) -> bool {
        self.expiry == 0 || timestamp <= self.expiry
    }
}

/// An authenticated remote peer.
///
/// Clients are owned by the [`Registry`](crate::registry::Registry); the
/// ingestion core only holds `Arc` handles. A handle outliving an
/// integrity sweep stays memory-safe but must not be trusted; the core
/// re-resolves by id (see the dispatcher's bulk loop).
#[derive(Debug)]
pub struct Client {
    id: String,
    /// Symmetric key for payload decryption.
    key: Vec<u8>,
    date_created: u64,
    /// Maximum lifetime in seconds. 0 = never dies.
    age: u64,
    /// True iff the client was admitted over the authenticated channel.
    known: bool,
    tokens: RwLock<HashMap<String, Token>>,
}

impl Client {
    pub fn new(id: impl Into<String>, key: Vec<u8>, age: u64, known: bool) -> Self {
        Self {
            id: id.into(),
            key,
            date_created: clock::now(),
            age,
            known,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the creation stamp; for tests and registry restores.
    pub fn with_date_created(mut self, date_created: u64) -> Self {
        self.date_created = date_created;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn date_created(&self) -> u64 {
        self.date_created
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn is_known(&self) -> bool {
        self.known
    }

    pub fn is_alive(&self, timestamp: u64) -> bool {
        self.age == 0 || timestamp <= self.date_created + self.age
    }

    /// Installs (or replaces) the token for a logger.
    pub fn add_token(&self, logger_id: impl Into<String>, token: Token) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(logger_id.into(), token);
        }
    }

    /// Checks the presented token for a logger at `timestamp`. Loggers
    /// flagged for plain requests skip token possession entirely.
    pub fn is_valid_token(
        &self,
        logger_id: &str,
        presented: &str,
        configuration: &Configuration,
        timestamp: u64,
    ) -> bool {
        if configuration.has_logger_flag(logger_id, LoggerFlag::AllowPlainLogRequest) {
            return true;
        }
        match self.tokens.read() {
            Ok(tokens) => tokens
                .get(logger_id)
                .map(|token| token.value() == presented && token.is_valid_at(timestamp))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}
