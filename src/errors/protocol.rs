// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{ChannelError, CompileError};
use thiserror::Error;

/// Wire protocol failures.
///
/// Everything except [`ProtocolError::is_resync`] closes the channel.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("bad magic number {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unknown integer format {0}")]
    BadFormat(u32),

    /// A length field exceeded the negotiated maximum payload.
    #[error("{field} of {length} bytes exceeds the {max} byte payload limit")]
    PayloadTooLarge {
        field: &'static str,
        length: u64,
        max: usize,
    },

    #[error("program text is not UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("bootstrap message is malformed: {0}")]
    Bootstrap(#[source] serde_json::Error),

    /// A step arrived before any receiver program was loaded.
    #[error("step message received before any update")]
    NoProgram,

    #[error(transparent)]
    Program(#[from] CompileError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl ProtocolError {
    /// True when the failure is a transient resynchronization, not a violation.
    pub fn is_resync(&self) -> bool {
        matches!(self, ProtocolError::Channel(ChannelError::Skip))
    }

    /// True when the underlying channel is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, ProtocolError::Channel(ChannelError::Closed))
    }
}
