// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic client integrity sweep.
//!
//! The sweep evicts dead clients from the registry and records its last
//! execution time. The dispatcher compares that stamp against the time a
//! cached client handle was validated: once a sweep has run, the handle is
//! dropped and the client re-resolved by id. `last_execution()` is
//! monotonically non-decreasing, which is what makes the comparison sound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock;
use crate::registry::Registry;

pub struct ClientIntegrityTask {
    registry: Weak<Registry>,
    interval: Duration,
    /// Epoch seconds of the most recent sweep; 0 = never ran.
    last_execution: AtomicU64,
}

impl ClientIntegrityTask {
    pub fn new(registry: Weak<Registry>, interval_secs: u64) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(interval_secs.max(1)),
            last_execution: AtomicU64::new(0),
        }
    }

    /// Timestamp of the most recent sweep (epoch seconds; 0 = never ran).
    pub fn last_execution(&self) -> u64 {
        self.last_execution.load(Ordering::Acquire)
    }

    /// Runs one sweep now. Returns the number of evicted clients.
    pub fn execute(&self) -> usize {
        let now = clock::now();
        let evicted = match self.registry.upgrade() {
            Some(registry) => registry.sweep_dead_clients(now),
            None => 0,
        };
        // The stamp never moves backwards even if the clock does.
        self.last_execution.fetch_max(now, Ordering::AcqRel);
        if evicted > 0 {
            debug!(evicted, "client integrity sweep evicted dead clients");
        }
        evicted
    }

    /// Sweeps on the configured interval until cancelled.
    pub async fn run(&self, cancel_token: CancellationToken) {
        debug!(interval_secs = self.interval.as_secs(), "client integrity task started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {
                    self.execute();
                }
                () = cancel_token.cancelled() => {
                    debug!("client integrity task shutting down");
                    break;
                }
            }
        }
    }
}
