// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stream lifecycle and scheduling events.
//!
//! This module contains message types for logging events related to:
//! * Stream open, relink, resize and close
//! * The step loop starting and stopping
//! * Watchdog stall detection
//! * Relaunch attempts and their outcome

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Stream finished opening and is ready.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use sensorium::observability::messages::stream::StreamOpened;
///
/// let msg = StreamOpened { stream_id: 1, interfaces: 4, reads: 10, writes: 2 };
/// assert_eq!(msg.to_string(), "Stream 1 opened: 4 interfaces, reads=10, writes=2");
/// ```
pub struct StreamOpened {
    pub stream_id: u64,
    pub interfaces: usize,
    pub reads: usize,
    pub writes: usize,
}

impl Display for StreamOpened {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} opened: {} interfaces, reads={}, writes={}",
            self.stream_id, self.interfaces, self.reads, self.writes
        )
    }
}

impl StructuredLog for StreamOpened {
    fn log(&self) {
        tracing::info!(
            stream_id = self.stream_id,
            interfaces = self.interfaces,
            reads = self.reads,
            writes = self.writes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stream_opened",
            span_name = name,
            stream_id = self.stream_id,
            interfaces = self.interfaces,
        )
    }
}

/// Interface set or buffer layout changed.
///
/// # Log Level
/// `debug!` - Happens on every relink
pub struct StreamRelinked {
    pub stream_id: u64,
    pub interfaces: usize,
    pub added: usize,
    pub removed: usize,
    pub reads: usize,
    pub writes: usize,
}

impl Display for StreamRelinked {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} relinked: {} interfaces (+{} -{}), reads={}, writes={}",
            self.stream_id, self.interfaces, self.added, self.removed, self.reads, self.writes
        )
    }
}

impl StructuredLog for StreamRelinked {
    fn log(&self) {
        tracing::debug!(
            stream_id = self.stream_id,
            interfaces = self.interfaces,
            added = self.added,
            removed = self.removed,
            reads = self.reads,
            writes = self.writes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stream_relink",
            span_name = name,
            stream_id = self.stream_id,
            interfaces = self.interfaces,
        )
    }
}

pub struct StreamResized {
    pub stream_id: u64,
    pub reads: usize,
    pub writes: usize,
}

impl Display for StreamResized {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} resized: reads={}, writes={}",
            self.stream_id, self.reads, self.writes
        )
    }
}

impl StructuredLog for StreamResized {
    fn log(&self) {
        tracing::debug!(
            stream_id = self.stream_id,
            reads = self.reads,
            writes = self.writes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("stream_resize", span_name = name, stream_id = self.stream_id)
    }
}

/// Stream closed; terminal.
///
/// # Log Level
/// `info!` - Important operational event
pub struct StreamClosed {
    pub stream_id: u64,
    pub interfaces: usize,
}

impl Display for StreamClosed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} closed, deinitialized {} interfaces",
            self.stream_id, self.interfaces
        )
    }
}

impl StructuredLog for StreamClosed {
    fn log(&self) {
        tracing::info!(
            stream_id = self.stream_id,
            interfaces = self.interfaces,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("stream_closed", span_name = name, stream_id = self.stream_id)
    }
}

/// The step loop was (re)started because agents are bound.
///
/// # Log Level
/// `debug!`
pub struct StepLoopStarted {
    pub stream_id: u64,
    pub agents: usize,
}

impl Display for StepLoopStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} step loop started with {} agents",
            self.stream_id, self.agents
        )
    }
}

impl StructuredLog for StepLoopStarted {
    fn log(&self) {
        tracing::debug!(stream_id = self.stream_id, agents = self.agents, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("step_loop", span_name = name, stream_id = self.stream_id)
    }
}

/// One step failed outside any interface hook (e.g. a `write` length mismatch).
///
/// # Log Level
/// `warn!`
pub struct StepFailed<'a> {
    pub stream_id: u64,
    pub error: &'a dyn std::error::Error,
}

impl Display for StepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stream {} step failed: {}", self.stream_id, self.error)
    }
}

impl StructuredLog for StepFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            stream_id = self.stream_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("step_failed", span_name = name, stream_id = self.stream_id)
    }
}

/// Watchdog found no completed step within the stall timeout.
///
/// # Log Level
/// `warn!` - Recovery is about to start
///
/// # Example
/// ```
/// use sensorium::observability::messages::stream::WatchdogStall;
/// use std::time::Duration;
///
/// let msg = WatchdogStall {
///     stream_id: 3,
///     since_last_step: Duration::from_secs(20),
///     stall_timeout: Duration::from_secs(15),
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct WatchdogStall {
    pub stream_id: u64,
    pub since_last_step: Duration,
    pub stall_timeout: Duration,
}

impl Display for WatchdogStall {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} stalled: no step completed in {:?} (limit {:?}), relaunching",
            self.stream_id, self.since_last_step, self.stall_timeout
        )
    }
}

impl StructuredLog for WatchdogStall {
    fn log(&self) {
        tracing::warn!(
            stream_id = self.stream_id,
            since_last_step_ms = self.since_last_step.as_millis() as u64,
            stall_timeout_ms = self.stall_timeout.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("watchdog", span_name = name, stream_id = self.stream_id)
    }
}

/// One relaunch attempt failed; more remain.
///
/// # Log Level
/// `error!`
pub struct RelaunchAttemptFailed<'a> {
    pub stream_id: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a anyhow::Error,
}

impl Display for RelaunchAttemptFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} relaunch attempt {}/{} failed: {:#}",
            self.stream_id, self.attempt, self.max_attempts, self.error
        )
    }
}

impl StructuredLog for RelaunchAttemptFailed<'_> {
    fn log(&self) {
        tracing::error!(
            stream_id = self.stream_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "relaunch_attempt",
            span_name = name,
            stream_id = self.stream_id,
            attempt = self.attempt,
        )
    }
}

pub struct RelaunchSucceeded {
    pub stream_id: u64,
    pub attempt: u32,
}

impl Display for RelaunchSucceeded {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} relaunched on attempt {}",
            self.stream_id, self.attempt
        )
    }
}

impl StructuredLog for RelaunchSucceeded {
    fn log(&self) {
        tracing::info!(stream_id = self.stream_id, attempt = self.attempt, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("relaunch", span_name = name, stream_id = self.stream_id)
    }
}

/// Every relaunch attempt failed; the external resource is being torn down.
///
/// # Log Level
/// `error!`
pub struct RelaunchExhausted<'a> {
    pub stream_id: u64,
    pub attempts: u32,
    pub error: &'a anyhow::Error,
}

impl Display for RelaunchExhausted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} gave up after {} relaunch attempts: {:#}",
            self.stream_id, self.attempts, self.error
        )
    }
}

impl StructuredLog for RelaunchExhausted<'_> {
    fn log(&self) {
        tracing::error!(
            stream_id = self.stream_id,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("relaunch_exhausted", span_name = name, stream_id = self.stream_id)
    }
}
