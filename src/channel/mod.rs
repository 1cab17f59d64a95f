// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Framed byte channels.
//!
//! A [`Channel`] delivers ordered bytes and marks a resynchronization point after
//! every logical message with [`Channel::skip`]. When the transport loses a
//! message, pending reads fail with [`ChannelError::Skip`] and the reader starts
//! over at the next message instead of misreading a shifted byte offset.
//!
//! Two transports are provided:
//! * [`ByteDuplexChannel`] - reliable byte streams (pipes, stdio, sockets); `skip` is a no-op
//! * [`MessageChannel`] - discrete messages; one `skip` flushes exactly one message

mod duplex;
mod message;

pub use duplex::ByteDuplexChannel;
pub use message::MessageChannel;

use crate::errors::ChannelError;
use async_trait::async_trait;

#[async_trait]
pub trait Channel: Send + Sync {
    /// Append bytes to the current logical message.
    async fn write(&self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// End the current logical message.
    async fn skip(&self) -> Result<(), ChannelError>;

    /// Wait until exactly `len` bytes are available and return them.
    async fn read(&self, len: usize) -> Result<Vec<u8>, ChannelError>;

    /// Read one whole transport message, for channels that have message boundaries.
    async fn read_message(&self) -> Result<Vec<u8>, ChannelError> {
        Err(ChannelError::Unsupported("read_message"))
    }

    /// Close the channel. Idempotent; pending reads fail with [`ChannelError::Closed`].
    async fn close(&self);

    fn is_closed(&self) -> bool;

    fn is_message_oriented(&self) -> bool {
        false
    }
}
