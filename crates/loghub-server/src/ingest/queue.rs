// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Double-buffered request queue.
//!
//! Producers push onto the *active* buffer; the single consumer drains the
//! *frozen* buffer and swaps the roles once it is empty. Pushes therefore
//! contend only with each other, never with the drain, which keeps session
//! acknowledgement latency independent of dispatch work.
//!
//! Contract: exactly one consumer. `pull`, `len` and `switch_context` are
//! consumer-side; `push` and `backlog_size` are safe from any task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct SwappingQueue<T> {
    buffers: [Mutex<VecDeque<T>>; 2],
    active_index: AtomicUsize,
}

impl<T> Default for SwappingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SwappingQueue<T> {
    pub fn new() -> Self {
        Self {
            buffers: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            active_index: AtomicUsize::new(0),
        }
    }

    fn lock(&self, index: usize) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        match self.buffers[index].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends to the active buffer.
    ///
    /// The index is re-checked under the buffer lock: a swap observed
    /// between the load and the lock means this producer raced
    /// `switch_context` and must target the new active buffer instead.
    pub fn push(&self, item: T) {
        loop {
            let index = self.active_index.load(Ordering::Acquire);
            let mut buffer = self.lock(index);
            if self.active_index.load(Ordering::Acquire) != index {
                continue;
            }
            buffer.push_back(item);
            return;
        }
    }

    /// Pops the front of the frozen buffer.
    pub fn pull(&self) -> Option<T> {
        let index = self.active_index.load(Ordering::Acquire);
        self.lock(1 - index).pop_front()
    }

    /// Length of the frozen buffer (what the current drain cycle sees).
    pub fn len(&self) -> usize {
        let index = self.active_index.load(Ordering::Acquire);
        self.lock(1 - index).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the active buffer (items waiting for the next epoch).
    pub fn backlog_size(&self) -> usize {
        let index = self.active_index.load(Ordering::Acquire);
        self.lock(index).len()
    }

    /// Swaps the buffer roles. Must only run once the frozen buffer has
    /// been fully drained; holding the active-buffer lock across the store
    /// is what lets `push` re-check safely.
    pub fn switch_context(&self) {
        let index = self.active_index.load(Ordering::Acquire);
        let frozen = self.lock(1 - index);
        debug_assert!(frozen.is_empty(), "switch_context with undrained frozen buffer");
        drop(frozen);

        let _active = self.lock(index);
        self.active_index.store(1 - index, Ordering::Release);
    }
}
