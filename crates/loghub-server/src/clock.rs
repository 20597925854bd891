// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Epoch-seconds clock used for receive stamps, client lifetimes and token
//! expiry. All authorization arithmetic works in whole seconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch seconds. A clock before the epoch reads as 0
/// rather than failing the caller.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
