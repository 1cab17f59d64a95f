// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the wire protocol and peer connections.
//!
//! Transient resynchronizations are deliberately absent: they are retried
//! silently and never logged.

use crate::codec::IntFormat;
use crate::errors::ProtocolError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Handshake finished on one side of a connection.
///
/// # Log Level
/// `debug!`
///
/// # Example
/// ```
/// use sensorium::codec::IntFormat;
/// use sensorium::observability::messages::protocol::HandshakeCompleted;
///
/// let msg = HandshakeCompleted { role: "responder", format: IntFormat::I16, byteswap: true };
/// assert!(msg.to_string().contains("byteswap=true"));
/// ```
pub struct HandshakeCompleted<'a> {
    pub role: &'a str,
    pub format: IntFormat,
    pub byteswap: bool,
}

impl Display for HandshakeCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} handshake completed: format={:?}, byteswap={}",
            self.role, self.format, self.byteswap
        )
    }
}

impl StructuredLog for HandshakeCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            role = self.role,
            format = ?self.format,
            byteswap = self.byteswap,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("handshake", span_name = name, role = self.role)
    }
}

/// Malformed or hostile input; the channel is being closed.
///
/// # Log Level
/// `error!` - Never retried
pub struct ProtocolViolation<'a> {
    pub role: &'a str,
    pub error: &'a ProtocolError,
}

impl Display for ProtocolViolation<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} closing channel after protocol error: {}",
            self.role, self.error
        )
    }
}

impl StructuredLog for ProtocolViolation<'_> {
    fn log(&self) {
        tracing::error!(role = self.role, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("protocol_violation", span_name = name, role = self.role)
    }
}

/// Side-channel bytes were not valid JSON and were dropped.
///
/// # Log Level
/// `debug!`
pub struct SideChannelIgnored<'a> {
    pub role: &'a str,
    pub bytes: usize,
}

impl Display for SideChannelIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} ignored {} bytes of malformed side-channel data",
            self.role, self.bytes
        )
    }
}

impl StructuredLog for SideChannelIgnored<'_> {
    fn log(&self) {
        tracing::debug!(role = self.role, bytes = self.bytes, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("side_channel", span_name = name, role = self.role)
    }
}

/// A merged update program was sent to, or loaded by, a peer.
///
/// # Log Level
/// `debug!`
pub struct UpdateProgram<'a> {
    pub role: &'a str,
    pub calls: usize,
    pub constants: usize,
    pub bytes: usize,
}

impl Display for UpdateProgram<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} update program: {} calls, {} constants, {} bytes",
            self.role, self.calls, self.constants, self.bytes
        )
    }
}

impl StructuredLog for UpdateProgram<'_> {
    fn log(&self) {
        tracing::debug!(
            role = self.role,
            calls = self.calls,
            constants = self.constants,
            bytes = self.bytes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("update_program", span_name = name, role = self.role)
    }
}

/// A stream's capture link connected to its peer.
///
/// # Log Level
/// `info!`
pub struct PeerConnected {
    pub stream_id: u64,
    pub format: IntFormat,
}

impl Display for PeerConnected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream {} connected to peer, format={:?}",
            self.stream_id, self.format
        )
    }
}

impl StructuredLog for PeerConnected {
    fn log(&self) {
        tracing::info!(stream_id = self.stream_id, format = ?self.format, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("peer", span_name = name, stream_id = self.stream_id)
    }
}

/// A stream lost (or failed to reach) its peer.
///
/// # Log Level
/// `warn!` - The watchdog will relaunch if the stream stalls
pub struct PeerDisconnected<'a> {
    pub stream_id: u64,
    pub error: &'a dyn Display,
}

impl Display for PeerDisconnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stream {} lost its peer: {}", self.stream_id, self.error)
    }
}

impl StructuredLog for PeerDisconnected<'_> {
    fn log(&self) {
        tracing::warn!(stream_id = self.stream_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("peer_disconnected", span_name = name, stream_id = self.stream_id)
    }
}
