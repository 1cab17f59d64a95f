// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{
    abort, checked_size, decode_side_channel, read_array, read_blob, write_array, write_blob,
    write_u32, Bootstrap, MAGIC, UPDATE_SENTINEL,
};
use crate::channel::Channel;
use crate::codec::{encode, EncodedArray, IntFormat};
use crate::errors::ProtocolError;
use crate::observability::messages::{protocol::HandshakeCompleted, StructuredLog};
use serde_json::Value;
use std::sync::Arc;

const ROLE: &str = "initiator";

/// The coordinating side of a connection. Always writes in native byte order.
pub struct Initiator {
    channel: Arc<dyn Channel>,
    format: IntFormat,
    max_payload: usize,
    prediction: EncodedArray,
    action: EncodedArray,
}

impl Initiator {
    /// Send the handshake (and, on message-oriented channels, the bootstrap).
    pub async fn connect(
        channel: Arc<dyn Channel>,
        format: IntFormat,
        max_payload: usize,
        bootstrap: Option<&Bootstrap>,
    ) -> Result<Self, ProtocolError> {
        if let Err(e) = handshake(&*channel, format, bootstrap).await {
            abort(&*channel, ROLE, &e).await;
            return Err(e);
        }
        HandshakeCompleted {
            role: ROLE,
            format,
            byteswap: false,
        }
        .log();
        Ok(Self {
            channel,
            format,
            max_payload,
            prediction: EncodedArray::empty(format),
            action: EncodedArray::empty(format),
        })
    }

    pub fn format(&self) -> IntFormat {
        self.format
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Replace the responder's receiver program.
    pub async fn send_update(&mut self, program: &str) -> Result<(), ProtocolError> {
        let bytes = program.as_bytes();
        checked_size("program", bytes.len() as u32, 1, self.max_payload)?;
        let result = async {
            write_u32(&*self.channel, UPDATE_SENTINEL, false).await?;
            write_blob(&*self.channel, bytes, false).await?;
            self.channel.skip().await?;
            Ok::<(), ProtocolError>(())
        }
        .await;
        self.finish(result).await
    }

    /// Send one step: the stream's predictions, its actions, and the sender's
    /// serialized arguments.
    pub async fn send_step(
        &mut self,
        prediction: &[f32],
        action: &[f32],
        side_channel: &[u8],
    ) -> Result<(), ProtocolError> {
        let bpe = self.format.bytes_per_element();
        checked_size("prediction", prediction.len() as u32, bpe, self.max_payload)?;
        checked_size("action", action.len() as u32, bpe, self.max_payload)?;
        checked_size("side channel", side_channel.len() as u32, 1, self.max_payload)?;

        let empty = EncodedArray::empty(self.format);
        self.prediction = encode(prediction, std::mem::replace(&mut self.prediction, empty.clone()));
        self.action = encode(action, std::mem::replace(&mut self.action, empty));
        let result = async {
            write_array(&*self.channel, &self.prediction, false).await?;
            write_array(&*self.channel, &self.action, false).await?;
            write_blob(&*self.channel, side_channel, false).await?;
            self.channel.skip().await?;
            Ok::<(), ProtocolError>(())
        }
        .await;
        self.finish(result).await
    }

    /// A reader for the responder's replies, usable from another task.
    pub fn reply_reader(&self) -> ReplyReader {
        ReplyReader {
            channel: Arc::clone(&self.channel),
            format: self.format,
            max_payload: self.max_payload,
        }
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    async fn finish(&self, result: Result<(), ProtocolError>) -> Result<(), ProtocolError> {
        if let Err(e) = &result {
            abort(&*self.channel, ROLE, e).await;
        }
        result
    }
}

async fn handshake(
    channel: &dyn Channel,
    format: IntFormat,
    bootstrap: Option<&Bootstrap>,
) -> Result<(), ProtocolError> {
    if let Some(boot) = bootstrap.filter(|_| channel.is_message_oriented()) {
        let text = serde_json::to_vec(boot).map_err(ProtocolError::Bootstrap)?;
        channel.write(&text).await?;
        channel.skip().await?;
    }
    write_u32(channel, MAGIC, false).await?;
    write_u32(channel, format.wire_value(), false).await?;
    channel.skip().await?;
    Ok(())
}

/// One decoded responder message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub observation: EncodedArray,
    /// `None` when the responder sent nothing or sent malformed JSON.
    pub side_channel: Option<Value>,
}

/// Reads responder messages off an [`Initiator`]'s channel.
pub struct ReplyReader {
    channel: Arc<dyn Channel>,
    format: IntFormat,
    max_payload: usize,
}

impl ReplyReader {
    /// Wait for the next complete reply.
    ///
    /// Resynchronizations restart the read at the next message. Any other
    /// failure closes the channel and is returned.
    pub async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        loop {
            match self.next_reply().await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_resync() => continue,
                Err(e) => {
                    abort(&*self.channel, ROLE, &e).await;
                    return Err(e);
                }
            }
        }
    }

    async fn next_reply(&mut self) -> Result<Reply, ProtocolError> {
        let observation = read_array(
            &*self.channel,
            "observation",
            self.format,
            false,
            self.max_payload,
        )
        .await?;
        let side = read_blob(&*self.channel, "side channel", false, self.max_payload).await?;
        Ok(Reply {
            observation,
            side_channel: decode_side_channel(ROLE, &side),
        })
    }
}
