// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{
    abort, checked_size, decode_side_channel, read_array, read_blob, read_u32, write_array,
    write_blob, Bootstrap, MAGIC, MAGIC_SWAPPED, UPDATE_SENTINEL,
};
use crate::channel::Channel;
use crate::codec::{encode, EncodedArray, IntFormat};
use crate::errors::ProtocolError;
use crate::observability::messages::{protocol::HandshakeCompleted, StructuredLog};
use serde_json::Value;
use std::sync::Arc;

const ROLE: &str = "responder";

/// A message from the initiator.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiatorMessage {
    /// New receiver program text.
    Update(String),
    Step(StepMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepMessage {
    pub prediction: EncodedArray,
    pub action: EncodedArray,
    pub side_channel: Option<Value>,
}

/// The peer side of a connection. Performs every byte swap, in both directions.
pub struct Responder {
    channel: Arc<dyn Channel>,
    format: IntFormat,
    byteswap: bool,
    max_payload: usize,
    observation: EncodedArray,
}

impl Responder {
    /// Read the handshake: magic number, then integer format.
    pub async fn accept(
        channel: Arc<dyn Channel>,
        max_payload: usize,
    ) -> Result<Self, ProtocolError> {
        let negotiated = loop {
            match negotiate(&*channel).await {
                Err(e) if e.is_resync() => continue,
                other => break other,
            }
        };
        let (byteswap, format) = match negotiated {
            Ok(v) => v,
            Err(e) => {
                abort(&*channel, ROLE, &e).await;
                return Err(e);
            }
        };
        HandshakeCompleted {
            role: ROLE,
            format,
            byteswap,
        }
        .log();
        Ok(Self {
            channel,
            format,
            byteswap,
            max_payload,
            observation: EncodedArray::empty(format),
        })
    }

    /// Read the bootstrap message, then the handshake. The bootstrap's payload
    /// limit applies if it is lower than `max_payload`.
    pub async fn accept_with_bootstrap(
        channel: Arc<dyn Channel>,
        max_payload: usize,
    ) -> Result<(Self, Bootstrap), ProtocolError> {
        let parsed = loop {
            match channel.read_message().await {
                Ok(bytes) => {
                    break serde_json::from_slice::<Bootstrap>(&bytes).map_err(ProtocolError::Bootstrap)
                }
                Err(e) => {
                    let e = ProtocolError::from(e);
                    if !e.is_resync() {
                        break Err(e);
                    }
                }
            }
        };
        let bootstrap = match parsed {
            Ok(b) => b,
            Err(e) => {
                abort(&*channel, ROLE, &e).await;
                return Err(e);
            }
        };
        let limit = bootstrap.max_payload_bytes.min(max_payload);
        let responder = Self::accept(channel, limit).await?;
        Ok((responder, bootstrap))
    }

    pub fn byteswap(&self) -> bool {
        self.byteswap
    }

    pub fn format(&self) -> IntFormat {
        self.format
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Wait for the next complete initiator message.
    ///
    /// Resynchronizations restart at the next message; any other failure
    /// closes the channel and is returned.
    pub async fn recv(&mut self) -> Result<InitiatorMessage, ProtocolError> {
        loop {
            match self.next_message().await {
                Ok(msg) => return Ok(msg),
                Err(e) if e.is_resync() => continue,
                Err(e) => {
                    abort(&*self.channel, ROLE, &e).await;
                    return Err(e);
                }
            }
        }
    }

    /// Answer a step with the observation array and the side-channel bytes.
    pub async fn send_observation(
        &mut self,
        observation: &[f32],
        side_channel: &[u8],
    ) -> Result<(), ProtocolError> {
        let format = self.format;
        let previous = std::mem::replace(&mut self.observation, EncodedArray::empty(format));
        self.observation = encode(observation, previous);
        let result = async {
            checked_size(
                "observation",
                self.observation.len() as u32,
                format.bytes_per_element(),
                self.max_payload,
            )?;
            checked_size("side channel", side_channel.len() as u32, 1, self.max_payload)?;
            write_array(&*self.channel, &self.observation, self.byteswap).await?;
            write_blob(&*self.channel, side_channel, self.byteswap).await?;
            self.channel.skip().await?;
            Ok::<(), ProtocolError>(())
        }
        .await;
        if let Err(e) = &result {
            abort(&*self.channel, ROLE, e).await;
        }
        result
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    /// Log `error` as a violation and close the channel.
    pub async fn fail(&self, error: &ProtocolError) {
        abort(&*self.channel, ROLE, error).await;
    }

    async fn next_message(&mut self) -> Result<InitiatorMessage, ProtocolError> {
        let ch = &*self.channel;
        let head = read_u32(ch, self.byteswap).await?;
        if head == UPDATE_SENTINEL {
            let bytes = read_blob(ch, "program", self.byteswap, self.max_payload).await?;
            return Ok(InitiatorMessage::Update(String::from_utf8(bytes)?));
        }
        let size = checked_size(
            "prediction",
            head,
            self.format.bytes_per_element(),
            self.max_payload,
        )?;
        let bytes = ch.read(size).await?;
        let prediction = EncodedArray::from_bytes(self.format, &bytes, self.byteswap);
        let action = read_array(ch, "action", self.format, self.byteswap, self.max_payload).await?;
        let side = read_blob(ch, "side channel", self.byteswap, self.max_payload).await?;
        Ok(InitiatorMessage::Step(StepMessage {
            prediction,
            action,
            side_channel: decode_side_channel(ROLE, &side),
        }))
    }
}

/// Read the magic number and integer format sent by the other side.
pub(crate) async fn negotiate(channel: &dyn Channel) -> Result<(bool, IntFormat), ProtocolError> {
    let raw = channel.read(4).await?;
    let raw = [raw[0], raw[1], raw[2], raw[3]];
    let byteswap = detect_byteswap(raw)?;
    let value = read_u32(channel, byteswap).await?;
    let format = IntFormat::from_wire(value).ok_or(ProtocolError::BadFormat(value))?;
    Ok((byteswap, format))
}

/// Compare the received magic against both byte orders.
pub(crate) fn detect_byteswap(raw: [u8; 4]) -> Result<bool, ProtocolError> {
    match u32::from_ne_bytes(raw) {
        MAGIC => Ok(false),
        MAGIC_SWAPPED => Ok(true),
        _ => Err(ProtocolError::BadMagic(raw)),
    }
}
