// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::SCRATCH_POOL_CAPACITY;
use crate::utils::lock;
use std::sync::{Arc, Mutex, OnceLock};

/// Recycles float scratch buffers used once per step.
///
/// Streams share the process-wide pool unless built with their own.
#[derive(Debug)]
pub struct ScratchPool {
    free: Mutex<Vec<Vec<f32>>>,
    capacity: usize,
}

impl ScratchPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn shared() -> Arc<ScratchPool> {
        static POOL: OnceLock<Arc<ScratchPool>> = OnceLock::new();
        Arc::clone(POOL.get_or_init(|| Arc::new(ScratchPool::new(SCRATCH_POOL_CAPACITY))))
    }

    /// A buffer of exactly `len` NaNs.
    pub fn acquire(&self, len: usize) -> Vec<f32> {
        let mut buf = lock(&self.free).pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, f32::NAN);
        buf
    }

    pub fn release(&self, buf: Vec<f32>) {
        let mut free = lock(&self.free);
        if free.len() < self.capacity {
            free.push(buf);
        }
    }

    pub fn idle(&self) -> usize {
        lock(&self.free).len()
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(SCRATCH_POOL_CAPACITY)
    }
}
