// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded, structured log requests.

use std::sync::Arc;

use loghub_proto::{LogLevel, LogPayload, StatusCode};
use serde_json::Value;

use crate::config::logger_id_is_well_formed;
use crate::registry::Client;

/// One decoded request, scalar or bulk wrapper.
///
/// A request is *valid* iff `logger_id`, `level` and `msg` are present and
/// well-formed. A bulk wrapper is itself invalid (an array has no scalar
/// fields) yet still carries its items for per-item processing.
pub struct LogRequest {
    payload: LogPayload,
    level: Option<LogLevel>,
    ip_addr: String,
    /// Server receive stamp, epoch seconds. Authorization arithmetic uses
    /// this, never the client-supplied `_t`.
    date_received: u64,
    client: Option<Arc<Client>>,
    status: StatusCode,
    valid: bool,
    bulk: bool,
    bulk_items: Vec<Value>,
}

impl LogRequest {
    pub fn from_payload(payload: LogPayload, ip_addr: String, date_received: u64) -> Self {
        let level = payload.log_level();
        let valid =
            logger_id_is_well_formed(&payload.logger_id) && level.is_some() && payload.msg.is_some();
        Self {
            payload,
            level,
            ip_addr,
            date_received,
            client: None,
            status: StatusCode::Continue,
            valid,
            bulk: false,
            bulk_items: Vec::new(),
        }
    }

    /// Decodes one bulk item. A non-object or otherwise unreadable item
    /// yields an invalid request rather than an error.
    pub fn from_value(item: &Value, ip_addr: String, date_received: u64) -> Self {
        match serde_json::from_value::<LogPayload>(item.clone()) {
            Ok(payload) => Self::from_payload(payload, ip_addr, date_received),
            Err(_) => {
                let mut request = Self::from_payload(LogPayload::default(), ip_addr, date_received);
                request.valid = false;
                request
            }
        }
    }

    /// Wraps a parsed bulk array. The wrapper keeps the envelope's client
    /// binding so the first item starts from a resolved client.
    pub fn bulk_wrapper(
        items: Vec<Value>,
        client: Option<Arc<Client>>,
        ip_addr: String,
        date_received: u64,
    ) -> Self {
        let client_id = client.as_ref().map(|c| c.id().to_string()).unwrap_or_default();
        let mut request = Self::from_payload(LogPayload::default(), ip_addr, date_received);
        request.payload.client_id = client_id;
        request.client = client;
        request.valid = false;
        request.bulk = true;
        request.bulk_items = items;
        request
    }

    /// Marks an undecodable request.
    pub fn invalid(ip_addr: String, date_received: u64, status: StatusCode) -> Self {
        let mut request = Self::from_payload(LogPayload::default(), ip_addr, date_received);
        request.valid = false;
        request.status = status;
        request
    }

    pub fn logger_id(&self) -> &str {
        &self.payload.logger_id
    }

    pub fn msg(&self) -> &str {
        self.payload.msg.as_deref().unwrap_or("")
    }

    pub fn level(&self) -> Option<LogLevel> {
        self.level
    }

    pub fn verbose_level(&self) -> u32 {
        self.payload.verbose_level
    }

    pub fn file(&self) -> &str {
        &self.payload.file
    }

    pub fn line(&self) -> u32 {
        self.payload.line
    }

    pub fn func(&self) -> &str {
        &self.payload.func
    }

    pub fn token(&self) -> &str {
        &self.payload.token
    }

    pub fn client_id(&self) -> &str {
        &self.payload.client_id
    }

    pub fn set_client_id(&mut self, client_id: &str) {
        self.payload.client_id = client_id.to_string();
    }

    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.as_ref()
    }

    pub fn set_client(&mut self, client: Option<Arc<Client>>) {
        self.client = client;
    }

    pub fn ip_addr(&self) -> &str {
        &self.ip_addr
    }

    pub fn date_received(&self) -> u64 {
        self.date_received
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    pub fn bulk_items(&self) -> &[Value] {
        &self.bulk_items
    }
}
