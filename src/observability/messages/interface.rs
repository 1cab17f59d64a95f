// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for interface hook failures and unlinking.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// An interface hook returned an error or panicked. The stream continues.
///
/// # Log Level
/// `warn!` - The interface's contribution to this step is discarded
///
/// # Example
/// ```
/// use sensorium::observability::messages::interface::HookFailed;
///
/// let error = anyhow::anyhow!("camera unplugged");
/// let msg = HookFailed {
///     stream_id: 2,
///     interface: "image_rect",
///     hook: "read",
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct HookFailed<'a> {
    pub stream_id: u64,
    pub interface: &'a str,
    pub hook: &'a str,
    pub error: &'a dyn Display,
}

impl Display for HookFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {}: interface '{}' {} hook failed: {}",
            self.stream_id, self.interface, self.hook, self.error
        )
    }
}

impl StructuredLog for HookFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            stream_id = self.stream_id,
            interface = self.interface,
            hook = self.hook,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "hook_failed",
            span_name = name,
            stream_id = self.stream_id,
            interface = self.interface,
            hook = self.hook,
        )
    }
}

/// An agent stopped asking to be scheduled and was removed from the stream.
///
/// # Log Level
/// `info!`
pub struct InterfaceUnlinked<'a> {
    pub stream_id: u64,
    pub interface: &'a str,
    pub reason: &'a str,
}

impl Display for InterfaceUnlinked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {}: unlinking interface '{}' ({})",
            self.stream_id, self.interface, self.reason
        )
    }
}

impl StructuredLog for InterfaceUnlinked<'_> {
    fn log(&self) {
        tracing::info!(
            stream_id = self.stream_id,
            interface = self.interface,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "interface_unlinked",
            span_name = name,
            stream_id = self.stream_id,
            interface = self.interface,
        )
    }
}
