// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures surfaced by [`crate::channel::Channel`] implementations.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A read crossed a resynchronization boundary; restart from the next message.
    #[error("read interrupted by a resynchronization boundary")]
    Skip,

    /// The channel was closed locally or by the peer.
    #[error("channel closed")]
    Closed,

    /// The operation is not available on this kind of channel.
    #[error("unsupported channel operation: {0}")]
    Unsupported(&'static str),

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}
