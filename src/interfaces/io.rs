// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! An agent living in another process, reached over a byte stream.
//!
//! The agent opens with the magic number and its integer format, exactly as an
//! initiator would, and the environment swaps bytes for it from then on.
//!
//! # Environment to agent, every step
//! `index:u32`, `len:u32`, observation, then the expected action length as a
//! `u32`. An action length of `0xFFFFFFFF` (after an empty observation) means
//! the stream at `index` ended; the index will be reused.
//!
//! # Agent to environment
//! `index:u32`, `len:u32`, prediction, `len:u32`, action.
//!
//! Lengths need not match what was asked for: the overlapping prefix is used.
//! One [`Io`] serves every stream it is bound to, each under its own index.

use crate::channel::{ByteDuplexChannel, Channel};
use crate::codec::{decode, encode, EncodedArray, IntFormat};
use crate::errors::ProtocolError;
use crate::observability::messages::protocol::HandshakeCompleted;
use crate::observability::messages::StructuredLog;
use crate::stream::Stream;
use crate::traits::{AgentViews, Capabilities, Interface};
use crate::utils::lock;
use crate::wire::{abort, negotiate, read_array, read_u32, write_array, write_u32};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, OnceCell};
use tokio_util::sync::CancellationToken;

const ROLE: &str = "io";

/// Action length announcing the end of a stream.
pub const STREAM_ENDED: u32 = 0xFFFF_FFFF;

/// A prediction and an action, as the agent sent them.
type Frame = (EncodedArray, EncodedArray);

/// Frames received for one stream, oldest first.
struct Inbox {
    frames: Mutex<VecDeque<Frame>>,
    ready: Notify,
    capacity: usize,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&self, frame: Frame) {
        {
            let mut frames = lock(&self.frames);
            frames.push_back(frame);
            while frames.len() > self.capacity {
                frames.pop_front();
            }
        }
        self.ready.notify_one();
    }

    /// The oldest frame, or `None` once the agent is gone.
    async fn next(&self, gone: &CancellationToken) -> Option<Frame> {
        loop {
            let notified = self.ready.notified();
            if let Some(frame) = lock(&self.frames).pop_front() {
                return Some(frame);
            }
            tokio::select! {
                _ = notified => {}
                _ = gone.cancelled() => return None,
            }
        }
    }
}

/// Dense stream indices. Freed indices are reused lowest first.
#[derive(Default)]
struct Indices {
    by_stream: HashMap<u64, u32>,
    free: BTreeSet<u32>,
    next: u32,
}

impl Indices {
    fn claim(&mut self, stream_id: u64) -> u32 {
        if let Some(&index) = self.by_stream.get(&stream_id) {
            return index;
        }
        let index = match self.free.pop_first() {
            Some(index) => index,
            None => {
                self.next += 1;
                self.next - 1
            }
        };
        self.by_stream.insert(stream_id, index);
        index
    }

    fn release(&mut self, stream_id: u64) -> Option<u32> {
        let index = self.by_stream.remove(&stream_id)?;
        self.free.insert(index);
        Some(index)
    }

    fn get(&self, stream_id: u64) -> Option<u32> {
        self.by_stream.get(&stream_id).copied()
    }
}

/// The negotiated session.
struct Link {
    byteswap: bool,
    format: IntFormat,
    /// Held for a whole outgoing message. Keeps the last observation encoding
    /// around for reuse.
    writer: tokio::sync::Mutex<EncodedArray>,
}

/// Hands every step of its streams to an external agent.
pub struct Io {
    channel: Arc<dyn Channel>,
    max_payload: usize,
    link: OnceCell<Link>,
    indices: Mutex<Indices>,
    inboxes: Arc<Mutex<HashMap<u32, Arc<Inbox>>>>,
    gone: CancellationToken,
}

impl Io {
    pub fn new(channel: Arc<dyn Channel>, max_payload: usize) -> Self {
        Self {
            channel,
            max_payload,
            link: OnceCell::new(),
            indices: Mutex::new(Indices::default()),
            inboxes: Arc::new(Mutex::new(HashMap::new())),
            gone: CancellationToken::new(),
        }
    }

    /// An agent on this process's stdin and stdout.
    pub fn stdio(max_payload: usize) -> Self {
        Self::new(Arc::new(ByteDuplexChannel::stdio()), max_payload)
    }

    async fn handshake(&self) -> Result<Link, ProtocolError> {
        let negotiated = loop {
            match negotiate(&*self.channel).await {
                Err(e) if e.is_resync() => continue,
                other => break other,
            }
        };
        let (byteswap, format) = match negotiated {
            Ok(v) => v,
            Err(e) => {
                abort(&*self.channel, ROLE, &e).await;
                return Err(e);
            }
        };
        HandshakeCompleted {
            role: ROLE,
            format,
            byteswap,
        }
        .log();

        tokio::spawn(receive_frames(
            Arc::clone(&self.channel),
            byteswap,
            format,
            self.max_payload,
            Arc::clone(&self.inboxes),
            self.gone.clone(),
        ));
        Ok(Link {
            byteswap,
            format,
            writer: tokio::sync::Mutex::new(EncodedArray::empty(format)),
        })
    }

    async fn send_observation(
        &self,
        link: &Link,
        index: u32,
        views: &AgentViews,
    ) -> Result<(), ProtocolError> {
        let ch = &*self.channel;
        let mut encoded = link.writer.lock().await;
        let previous = std::mem::replace(&mut *encoded, EncodedArray::empty(link.format));
        *encoded = encode(&views.obs.to_vec(), previous);
        let sent = async {
            write_u32(ch, index, link.byteswap).await?;
            write_array(ch, &encoded, link.byteswap).await?;
            write_u32(ch, views.act.len() as u32, link.byteswap).await?;
            ch.skip().await
        }
        .await;
        sent.map_err(ProtocolError::from)
    }
}

/// Sort incoming frames into their streams' inboxes until the agent goes away.
async fn receive_frames(
    channel: Arc<dyn Channel>,
    byteswap: bool,
    format: IntFormat,
    max_payload: usize,
    inboxes: Arc<Mutex<HashMap<u32, Arc<Inbox>>>>,
    gone: CancellationToken,
) {
    let ch = &*channel;
    loop {
        let frame = async {
            let index = read_u32(ch, byteswap).await?;
            let pred = read_array(ch, "prediction", format, byteswap, max_payload).await?;
            let act = read_array(ch, "action", format, byteswap, max_payload).await?;
            Ok::<_, ProtocolError>((index, pred, act))
        }
        .await;
        match frame {
            Ok((index, pred, act)) => {
                let inbox = lock(&inboxes).get(&index).cloned();
                if let Some(inbox) = inbox {
                    inbox.push((pred, act));
                }
            }
            Err(e) if e.is_resync() => continue,
            Err(e) => {
                abort(ch, ROLE, &e).await;
                gone.cancel();
                return;
            }
        }
    }
}

#[async_trait]
impl Interface for Io {
    fn name(&self) -> &str {
        "io"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            agent: true,
            lifecycle: true,
            ..Capabilities::default()
        }
    }

    async fn init(&self, stream: &Stream) -> anyhow::Result<()> {
        self.link.get_or_try_init(|| self.handshake()).await?;
        let index = lock(&self.indices).claim(stream.id());
        let capacity = stream.settings().simultaneous_steps;
        lock(&self.inboxes).insert(index, Arc::new(Inbox::new(capacity)));
        Ok(())
    }

    async fn deinit(&self, stream: &Stream) -> anyhow::Result<()> {
        let Some(index) = lock(&self.indices).release(stream.id()) else {
            return Ok(());
        };
        lock(&self.inboxes).remove(&index);
        let Some(link) = self.link.get() else {
            return Ok(());
        };
        if self.gone.is_cancelled() {
            return Ok(());
        }
        let ch = &*self.channel;
        let _serial = link.writer.lock().await;
        write_u32(ch, index, link.byteswap).await?;
        write_u32(ch, 0, link.byteswap).await?;
        write_u32(ch, STREAM_ENDED, link.byteswap).await?;
        ch.skip().await?;
        Ok(())
    }

    async fn agent(&self, stream: &Stream, views: AgentViews) -> anyhow::Result<bool> {
        let Some(link) = self.link.get() else {
            anyhow::bail!("io agent never connected");
        };
        let Some(index) = lock(&self.indices).get(stream.id()) else {
            anyhow::bail!("stream {} has no io index", stream.id());
        };
        let Some(inbox) = lock(&self.inboxes).get(&index).cloned() else {
            anyhow::bail!("stream {} has no io inbox", stream.id());
        };

        self.send_observation(link, index, &views).await?;
        let Some((pred, act)) = inbox.next(&self.gone).await else {
            anyhow::bail!("io agent disconnected");
        };
        views.pred.with_mut(|p| decode(&pred, p));
        views.act.with_mut(|a| decode(&act, a));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{StreamBuilder, View};
    use crate::wire::MAGIC;

    type Pipe = ByteDuplexChannel<
        tokio::io::ReadHalf<tokio::io::DuplexStream>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    >;

    /// The agent's end: says hello in `format`.
    async fn agent_end(format: IntFormat) -> (Io, Pipe) {
        let (env, agent) = ByteDuplexChannel::pair(1 << 16);
        write_u32(&agent, MAGIC, false).await.unwrap();
        write_u32(&agent, format.wire_value(), false).await.unwrap();
        (Io::new(Arc::new(env), 1 << 20), agent)
    }

    fn views(reads: usize, writes: usize) -> AgentViews {
        AgentViews {
            obs: View::detached(reads),
            pred: View::detached(reads),
            act: View::detached(writes),
        }
    }

    #[tokio::test]
    async fn test_step_round_trip() {
        let (io, agent) = agent_end(IntFormat::F32).await;
        let stream = StreamBuilder::new().open().await.unwrap();
        io.init(&stream).await.unwrap();

        let v = views(2, 3);
        v.obs.copy_from(&[0.25, f32::NAN]);
        let external = tokio::spawn(async move {
            assert_eq!(read_u32(&agent, false).await.unwrap(), 0);
            let obs = read_array(&agent, "observation", IntFormat::F32, false, 1 << 20)
                .await
                .unwrap();
            let wanted = read_u32(&agent, false).await.unwrap();

            write_u32(&agent, 0, false).await.unwrap();
            write_array(&agent, &EncodedArray::F32(vec![0.5]), false).await.unwrap();
            write_array(&agent, &EncodedArray::F32(vec![1.0; wanted as usize]), false)
                .await
                .unwrap();
            (obs, agent)
        });

        assert!(io.agent(&stream, v.clone()).await.unwrap());
        let (obs, _agent) = external.await.unwrap();
        match obs {
            EncodedArray::F32(values) => {
                assert_eq!(values[0], 0.25);
                assert!(values[1].is_nan());
            }
            other => panic!("expected f32 observation, got {:?}", other),
        }
        assert_eq!(v.pred.to_vec()[0], 0.5);
        assert!(v.pred.to_vec()[1].is_nan());
        assert_eq!(v.act.to_vec(), vec![1.0; 3]);
        stream.close().await;
    }

    #[tokio::test]
    async fn test_deinit_announces_stream_end() {
        let (io, agent) = agent_end(IntFormat::I8).await;
        let stream = StreamBuilder::new().open().await.unwrap();
        io.init(&stream).await.unwrap();
        io.deinit(&stream).await.unwrap();

        assert_eq!(read_u32(&agent, false).await.unwrap(), 0);
        assert_eq!(read_u32(&agent, false).await.unwrap(), 0);
        assert_eq!(read_u32(&agent, false).await.unwrap(), STREAM_ENDED);
        stream.close().await;
    }

    #[tokio::test]
    async fn test_agent_fails_once_the_other_process_leaves() {
        let (io, agent) = agent_end(IntFormat::F32).await;
        let stream = StreamBuilder::new().open().await.unwrap();
        io.init(&stream).await.unwrap();
        drop(agent);

        assert!(io.agent(&stream, views(1, 1)).await.is_err());
        stream.close().await;
    }

    #[tokio::test]
    async fn test_bad_magic_fails_init() {
        let (env, agent) = ByteDuplexChannel::pair(64);
        write_u32(&agent, 0xDEAD_BEEF, false).await.unwrap();
        let io = Io::new(Arc::new(env), 1024);
        let stream = StreamBuilder::new().open().await.unwrap();
        assert!(io.init(&stream).await.is_err());
        stream.close().await;
    }

    #[test]
    fn test_indices_are_dense_and_reused() {
        let mut indices = Indices::default();
        assert_eq!(indices.claim(7), 0);
        assert_eq!(indices.claim(9), 1);
        assert_eq!(indices.claim(7), 0);
        assert_eq!(indices.release(7), Some(0));
        assert_eq!(indices.claim(11), 0);
        assert_eq!(indices.claim(12), 2);
        assert_eq!(indices.release(99), None);
    }

    #[test]
    fn test_inbox_keeps_only_the_newest_frames() {
        let inbox = Inbox::new(2);
        for x in [1.0, 2.0, 3.0] {
            inbox.push((EncodedArray::F32(vec![x]), EncodedArray::F32(vec![])));
        }
        let frames = lock(&inbox.frames);
        let firsts: Vec<EncodedArray> = frames.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            firsts,
            vec![EncodedArray::F32(vec![2.0]), EncodedArray::F32(vec![3.0])]
        );
    }
}
