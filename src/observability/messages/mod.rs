// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! * `stream` - stream lifecycle, step loop, watchdog and relaunch events
//! * `protocol` - wire handshakes, violations and peer connections
//! * `interface` - interface hook failures and unlinking
//! * `validation` - configuration validation results

pub mod interface;
pub mod protocol;
pub mod stream;
pub mod validation;

use tracing::Span;

/// A log event that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the event.
    fn log(&self);

    /// A span carrying the same fields, for wrapping the work the event describes.
    fn span(&self, name: &str) -> Span;
}
