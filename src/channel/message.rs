// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A [`Channel`] over a transport that moves discrete messages (websockets,
//! datagram links, in-process queues).
//!
//! Inbound messages are queued as blobs; reads are queued as requests. Requests
//! are serviced greedily in order: concatenate small blobs, split large ones, and
//! hand out exact lengths. Outbound bytes accumulate until `skip`, which sends
//! them as one transport message, so a message boundary is always exactly one
//! resynchronization point.

use super::Channel;
use crate::errors::ChannelError;
use crate::utils::lock;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};

struct ReadRequest {
    /// `None` asks for one whole message.
    len: Option<usize>,
    reply: oneshot::Sender<Result<Vec<u8>, ChannelError>>,
}

#[derive(Default)]
struct Inbound {
    blobs: VecDeque<Vec<u8>>,
    requests: VecDeque<ReadRequest>,
}

enum Outlet {
    Peer(Weak<Shared>),
    Sender(mpsc::UnboundedSender<Vec<u8>>),
}

struct Shared {
    inbound: Mutex<Inbound>,
    frame: Mutex<Vec<u8>>,
    outlet: Mutex<Option<Outlet>>,
    closed: AtomicBool,
}

impl Shared {
    fn new(outlet: Option<Outlet>) -> Self {
        Self {
            inbound: Mutex::new(Inbound::default()),
            frame: Mutex::new(Vec::new()),
            outlet: Mutex::new(outlet),
            closed: AtomicBool::new(false),
        }
    }

    fn deliver(&self, blob: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) || blob.is_empty() {
            return;
        }
        let mut inbound = lock(&self.inbound);
        inbound.blobs.push_back(blob);
        service(&mut inbound);
    }

    fn shut(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut inbound = lock(&self.inbound);
            inbound.blobs.clear();
            for req in inbound.requests.drain(..) {
                let _ = req.reply.send(Err(ChannelError::Closed));
            }
        }
        lock(&self.frame).clear();
        let outlet = lock(&self.outlet).take();
        if let Some(Outlet::Peer(peer)) = outlet {
            if let Some(peer) = peer.upgrade() {
                peer.shut();
            }
        }
    }
}

/// Resolve queued read requests from queued blobs, front to back, until the
/// front request cannot be satisfied yet.
fn service(inbound: &mut Inbound) {
    loop {
        let Some(front) = inbound.requests.front() else {
            return;
        };
        let bytes = match front.len {
            None => match inbound.blobs.pop_front() {
                Some(blob) => blob,
                None => return,
            },
            Some(len) => {
                let available: usize = inbound.blobs.iter().map(Vec::len).sum();
                if available < len {
                    return;
                }
                take_bytes(&mut inbound.blobs, len)
            }
        };
        let Some(req) = inbound.requests.pop_front() else {
            return;
        };
        if let Err(Ok(unclaimed)) = req.reply.send(Ok(bytes)) {
            // The reader went away; the next request gets these bytes.
            inbound.blobs.push_front(unclaimed);
        }
    }
}

fn take_bytes(blobs: &mut VecDeque<Vec<u8>>, len: usize) -> Vec<u8> {
    if blobs.front().map(Vec::len) == Some(len) {
        return blobs.pop_front().unwrap_or_default();
    }
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let Some(blob) = blobs.front_mut() else {
            break;
        };
        let want = len - out.len();
        if blob.len() <= want {
            out.append(blob);
            blobs.pop_front();
        } else {
            out.extend(blob.drain(..want));
        }
    }
    out
}

/// Message-oriented [`Channel`]. Cloning yields another handle to the same end.
#[derive(Clone)]
pub struct MessageChannel {
    shared: Arc<Shared>,
}

impl MessageChannel {
    /// A channel whose outbound messages go to `outlet`; feed inbound messages
    /// with [`MessageChannel::deliver`].
    pub fn new(outlet: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            shared: Arc::new(Shared::new(Some(Outlet::Sender(outlet)))),
        }
    }

    /// Two in-process ends; each end's messages arrive at the other.
    /// Closing either end closes both.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Shared::new(None));
        let b = Arc::new(Shared::new(Some(Outlet::Peer(Arc::downgrade(&a)))));
        *lock(&a.outlet) = Some(Outlet::Peer(Arc::downgrade(&b)));
        (Self { shared: a }, Self { shared: b })
    }

    /// Hand one inbound transport message to the channel.
    pub fn deliver(&self, message: Vec<u8>) {
        self.shared.deliver(message);
    }

    /// The transport lost a message: fail every pending read with
    /// [`ChannelError::Skip`] and discard the partial message queued so far.
    pub fn resync(&self) {
        let mut inbound = lock(&self.shared.inbound);
        inbound.blobs.clear();
        for req in inbound.requests.drain(..) {
            let _ = req.reply.send(Err(ChannelError::Skip));
        }
    }

    async fn request(&self, len: Option<usize>) -> Result<Vec<u8>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        {
            let mut inbound = lock(&self.shared.inbound);
            inbound.requests.push_back(ReadRequest { len, reply });
            service(&mut inbound);
        }
        rx.await.unwrap_or(Err(ChannelError::Closed))
    }
}

#[async_trait]
impl Channel for MessageChannel {
    async fn write(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        lock(&self.shared.frame).extend_from_slice(bytes);
        Ok(())
    }

    async fn skip(&self) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let frame = std::mem::take(&mut *lock(&self.shared.frame));
        if frame.is_empty() {
            return Ok(());
        }
        let sent = match &*lock(&self.shared.outlet) {
            Some(Outlet::Peer(peer)) => match peer.upgrade() {
                Some(peer) => {
                    peer.deliver(frame);
                    true
                }
                None => false,
            },
            Some(Outlet::Sender(tx)) => tx.send(frame).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            self.shared.shut();
            Err(ChannelError::Closed)
        }
    }

    async fn read(&self, len: usize) -> Result<Vec<u8>, ChannelError> {
        if len == 0 {
            return if self.is_closed() {
                Err(ChannelError::Closed)
            } else {
                Ok(Vec::new())
            };
        }
        self.request(Some(len)).await
    }

    async fn read_message(&self) -> Result<Vec<u8>, ChannelError> {
        self.request(None).await
    }

    async fn close(&self) {
        self.shared.shut();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn is_message_oriented(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coalesces_and_splits_messages() {
        let (a, b) = MessageChannel::pair();
        b.deliver(vec![1, 2]);
        b.deliver(vec![3]);
        b.deliver(vec![4, 5, 6, 7]);

        assert_eq!(b.read(3).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.read(2).await.unwrap(), vec![4, 5]);
        assert_eq!(b.read(2).await.unwrap(), vec![6, 7]);
        drop(a);
    }

    #[tokio::test]
    async fn test_skip_sends_one_message() {
        let (a, b) = MessageChannel::pair();
        a.write(&[1]).await.unwrap();
        a.write(&[2, 3]).await.unwrap();
        a.skip().await.unwrap();
        a.write(&[4]).await.unwrap();
        a.skip().await.unwrap();

        assert_eq!(b.read_message().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(b.read_message().await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_pending_reads_resolve_when_data_arrives() {
        let (a, b) = MessageChannel::pair();
        let reader = tokio::spawn(async move { b.read(4).await });
        tokio::task::yield_now().await;
        a.write(&[9, 9]).await.unwrap();
        a.skip().await.unwrap();
        a.write(&[8, 8]).await.unwrap();
        a.skip().await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), vec![9, 9, 8, 8]);
    }

    #[tokio::test]
    async fn test_resync_fails_exactly_pending_reads() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ch = MessageChannel::new(tx);
        ch.deliver(vec![1, 2]);

        let first = tokio::spawn({
            let ch = ch.clone();
            async move { ch.read(4).await }
        });
        let second = tokio::spawn({
            let ch = ch.clone();
            async move { ch.read(1).await }
        });
        while lock(&ch.shared.inbound).requests.len() < 2 {
            tokio::task::yield_now().await;
        }

        ch.resync();
        assert!(matches!(first.await.unwrap(), Err(ChannelError::Skip)));
        assert!(matches!(second.await.unwrap(), Err(ChannelError::Skip)));

        ch.deliver(vec![7, 8, 9]);
        assert_eq!(ch.read(3).await.unwrap(), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_close_propagates_to_peer() {
        let (a, b) = MessageChannel::pair();
        let pending = tokio::spawn({
            let b = b.clone();
            async move { b.read(1).await }
        });
        tokio::task::yield_now().await;
        a.close().await;
        assert!(b.is_closed());
        assert!(matches!(pending.await.unwrap(), Err(ChannelError::Closed)));
        assert!(matches!(a.write(&[1]).await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_sender_outlet_receives_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ch = MessageChannel::new(tx);
        ch.write(&[5, 6]).await.unwrap();
        ch.skip().await.unwrap();
        assert_eq!(rx.recv().await, Some(vec![5, 6]));
    }
}
