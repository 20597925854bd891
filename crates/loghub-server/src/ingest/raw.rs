// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw, undecoded requests as they leave the session layer.

/// Payload bytes plus ingress metadata. Immutable once enqueued: the
/// handler stamps the receive time before the push and nothing mutates the
/// request afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub bytes: Vec<u8>,
    pub ip_addr: String,
    /// Server receive stamp, epoch seconds. 0 = not yet stamped.
    pub date_received: u64,
}

impl RawRequest {
    pub fn new(bytes: Vec<u8>, ip_addr: impl Into<String>) -> Self {
        Self {
            bytes,
            ip_addr: ip_addr.into(),
            date_received: 0,
        }
    }

    /// Presets the receive stamp; for tests and replays.
    pub fn with_date_received(mut self, date_received: u64) -> Self {
        self.date_received = date_received;
        self
    }
}
