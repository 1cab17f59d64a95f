// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors returned by [`crate::stream::Stream`] operations.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream closed")]
    Closed,

    #[error("action vector has {actual} values, stream writes {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("more than one interface claims the remaining {buffer} space")]
    DuplicateRemaining { buffer: &'static str },

    #[error("interface '{interface}' claims the remaining {buffer} space but is not last")]
    RemainingNotLast {
        buffer: &'static str,
        interface: String,
    },

    #[error("cannot resize {buffer} to {requested}: fixed widths already take {fixed}")]
    ResizeTooSmall {
        buffer: &'static str,
        requested: usize,
        fixed: usize,
    },

    #[error("relaunch failed after {attempts} attempts: {source}")]
    RelaunchFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}
