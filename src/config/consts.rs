// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Upper bound on concurrently in-flight steps per stream
pub const DEFAULT_SIMULTANEOUS_STEPS: usize = 16;
/// Fraction of the measured period to wait before scheduling the next step
pub const DEFAULT_LOWBALL: f64 = 0.5;
pub const DEFAULT_MAX_RELAUNCH_ATTEMPTS: u32 = 32;
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 30_000;
/// A stream with agents that has not finished a step for this long is relaunched
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 15_000;
/// The stall timeout must stay under this many watchdog intervals
pub const STALL_INTERVAL_FACTOR: u64 = 4;
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_HOMEPAGE: &str = "about:blank";

/// Largest single field either protocol side accepts (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const MIN_PAYLOAD_BYTES: usize = 16;

/// Idle scratch buffers kept per pool
pub const SCRATCH_POOL_CAPACITY: usize = 32;
