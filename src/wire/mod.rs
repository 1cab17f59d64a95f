// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Binary wire protocol between a stream (the [`Initiator`]) and its peer (the
//! [`Responder`]).
//!
//! # Handshake
//! The initiator optionally sends a bootstrap JSON object as one raw message
//! (message-oriented channels only), then the magic number `0x01020304` as four
//! native-order bytes, then the integer format as a `u32`. The responder detects
//! the initiator's byte order from the magic and swaps every multi-byte value
//! from then on; the initiator never swaps.
//!
//! # Initiator to responder
//! * Update: `0xFFFFFFFF`, `len:u32`, `len` bytes of program text
//! * Step: `len:u32`, prediction, `len:u32`, action, `len:u32`, side-channel JSON
//!
//! # Responder to initiator
//! * `len:u32`, observation, `len:u32`, side-channel JSON
//!
//! Array lengths count elements; program and side-channel lengths count bytes.
//! Every logical message ends with [`Channel::skip`]. A length whose byte size
//! exceeds the negotiated payload limit closes the channel.

mod initiator;
mod responder;


pub use initiator::{Initiator, Reply, ReplyReader};
pub use responder::{InitiatorMessage, Responder, StepMessage};
pub(crate) use responder::negotiate;

use crate::channel::Channel;
use crate::codec::{EncodedArray, IntFormat};
use crate::errors::{ChannelError, ProtocolError};
use crate::observability::messages::protocol::{ProtocolViolation, SideChannelIgnored};
use crate::observability::messages::StructuredLog;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAGIC: u32 = 0x0102_0304;
pub const MAGIC_SWAPPED: u32 = 0x0403_0201;
/// Leading `u32` of an update message; never a valid prediction length.
pub const UPDATE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Video capture dimensions handed to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
}

/// First message of a message-oriented connection, before the magic number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    /// Protocol revision, currently `1`.
    pub protocol: u32,
    pub capture: CaptureConfig,
    pub max_payload_bytes: usize,
}

impl Bootstrap {
    pub const PROTOCOL: u32 = 1;

    pub fn new(capture: CaptureConfig, max_payload_bytes: usize) -> Self {
        Self {
            protocol: Self::PROTOCOL,
            capture,
            max_payload_bytes,
        }
    }
}

/// Close `channel` after a failure, logging it unless the channel was already gone.
pub(crate) async fn abort(channel: &dyn Channel, role: &str, error: &ProtocolError) {
    if !error.is_closed() {
        ProtocolViolation { role, error }.log();
    }
    channel.close().await;
}

pub(crate) async fn write_u32(
    channel: &dyn Channel,
    value: u32,
    byteswap: bool,
) -> Result<(), ChannelError> {
    let value = if byteswap { value.swap_bytes() } else { value };
    channel.write(&value.to_ne_bytes()).await
}

pub(crate) async fn read_u32(channel: &dyn Channel, byteswap: bool) -> Result<u32, ChannelError> {
    let bytes = channel.read(4).await?;
    let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(if byteswap { value.swap_bytes() } else { value })
}

/// Byte size of a `len`-element field, refusing anything over `max_payload`.
pub(crate) fn checked_size(
    field: &'static str,
    len: u32,
    element_bytes: usize,
    max_payload: usize,
) -> Result<usize, ProtocolError> {
    (len as usize)
        .checked_mul(element_bytes)
        .filter(|bytes| *bytes <= max_payload)
        .ok_or(ProtocolError::PayloadTooLarge {
            field,
            length: len as u64 * element_bytes as u64,
            max: max_payload,
        })
}

pub(crate) async fn write_array(
    channel: &dyn Channel,
    data: &EncodedArray,
    byteswap: bool,
) -> Result<(), ChannelError> {
    write_u32(channel, data.len() as u32, byteswap).await?;
    if !data.is_empty() {
        channel.write(&data.to_bytes(byteswap)).await?;
    }
    Ok(())
}

pub(crate) async fn read_array(
    channel: &dyn Channel,
    field: &'static str,
    format: IntFormat,
    byteswap: bool,
    max_payload: usize,
) -> Result<EncodedArray, ProtocolError> {
    let len = read_u32(channel, byteswap).await?;
    let size = checked_size(field, len, format.bytes_per_element(), max_payload)?;
    let bytes = channel.read(size).await?;
    Ok(EncodedArray::from_bytes(format, &bytes, byteswap))
}

pub(crate) async fn write_blob(
    channel: &dyn Channel,
    bytes: &[u8],
    byteswap: bool,
) -> Result<(), ChannelError> {
    write_u32(channel, bytes.len() as u32, byteswap).await?;
    if !bytes.is_empty() {
        channel.write(bytes).await?;
    }
    Ok(())
}

pub(crate) async fn read_blob(
    channel: &dyn Channel,
    field: &'static str,
    byteswap: bool,
    max_payload: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let len = read_u32(channel, byteswap).await?;
    let size = checked_size(field, len, 1, max_payload)?;
    Ok(channel.read(size).await?)
}

/// Serialize a side-channel value; `None` and `null` become "no side channel".
pub fn encode_side_channel(value: Option<&Value>) -> Vec<u8> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::to_vec(v).unwrap_or_default(),
    }
}

/// Parse side-channel bytes. Empty and malformed input both yield `None`.
pub fn decode_side_channel(role: &str, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(v) => Some(v),
        Err(_) => {
            SideChannelIgnored {
                role,
                bytes: bytes.len(),
            }
            .log();
            None
        }
    }
}
