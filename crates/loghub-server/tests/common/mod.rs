// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared mocks and helpers for the ingestion integration tests.

// Each integration test crate compiles this module independently and uses
// a different subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use loghub_proto::StatusCode;
use loghub_server::crypto::{CipherError, EncryptedEnvelope, PayloadCipher};
use loghub_server::ingest::Session;
use loghub_server::sink::{
    FormatterFn, LogSink, SinkError, SinkRecord, CLIENT_ID_SPECIFIER, IP_SPECIFIER,
};

/// One sink write together with the specifier values resolved at write
/// time (None = specifier was not installed).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub logger_id: String,
    pub msg: String,
    pub level: String,
    pub client_id: Option<String>,
    pub ip: Option<String>,
}

/// Sink double that records writes and can run a hook after each one.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<RecordedWrite>>,
    formatters: Mutex<HashMap<String, FormatterFn>>,
    after_write: Mutex<Option<Box<dyn FnMut(usize) + Send>>>,
}

impl RecordingSink {
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn set_after_write(&self, hook: impl FnMut(usize) + Send + 'static) {
        *self.after_write.lock().unwrap() = Some(Box::new(hook));
    }
}

impl LogSink for RecordingSink {
    fn write(&self, record: &SinkRecord<'_>) -> Result<(), SinkError> {
        let resolve = |name: &str| {
            self.formatters
                .lock()
                .unwrap()
                .get(name)
                .map(|formatter| formatter())
        };
        let write = RecordedWrite {
            logger_id: record.logger_id.to_string(),
            msg: record.msg.to_string(),
            level: record.level.to_string(),
            client_id: resolve(CLIENT_ID_SPECIFIER),
            ip: resolve(IP_SPECIFIER),
        };
        let count = {
            let mut writes = self.writes.lock().unwrap();
            writes.push(write);
            writes.len()
        };
        if let Some(hook) = self.after_write.lock().unwrap().as_mut() {
            hook(count);
        }
        Ok(())
    }

    fn install_formatter(&self, name: &'static str, formatter: FormatterFn) {
        self.formatters
            .lock()
            .unwrap()
            .insert(name.to_string(), formatter);
    }

    fn uninstall_formatter(&self, name: &str) {
        self.formatters.lock().unwrap().remove(name);
    }

    fn has_formatter(&self, name: &str) -> bool {
        self.formatters.lock().unwrap().contains_key(name)
    }
}

/// Session double recording every status written back.
#[derive(Default)]
pub struct CapturingSession {
    statuses: Mutex<Vec<StatusCode>>,
}

impl CapturingSession {
    pub fn statuses(&self) -> Vec<StatusCode> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for CapturingSession {
    async fn write_status(&self, status: StatusCode) -> std::io::Result<()> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

/// Reversible stand-in for the transport's symmetric cipher.
pub struct XorCipher;

impl PayloadCipher for XorCipher {
    fn decrypt(&self, key: &[u8], envelope: &EncryptedEnvelope) -> Result<Vec<u8>, CipherError> {
        if key.is_empty() {
            return Err(CipherError::Key("empty key".to_string()));
        }
        Ok(xor_bytes(key, &envelope.ciphertext))
    }
}

pub fn xor_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// Builds the `client_id:iv:ciphertext` wire envelope.
pub fn envelope_line(client_id: &str, ciphertext: &[u8]) -> Vec<u8> {
    let engine = base64::engine::general_purpose::STANDARD;
    format!(
        "{client_id}:{}:{}",
        engine.encode(b"0123456789abcdef"),
        engine.encode(ciphertext)
    )
    .into_bytes()
}

/// Polls `condition` until it holds or the timeout elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits until the sink has seen at least `count` writes.
pub async fn wait_for_writes(sink: &Arc<RecordingSink>, count: usize) -> bool {
    let sink = Arc::clone(sink);
    wait_for(Duration::from_secs(3), move || sink.write_count() >= count).await
}
