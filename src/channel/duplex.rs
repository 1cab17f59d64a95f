// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::Channel;
use crate::errors::ChannelError;
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, Stdin, Stdout,
    WriteHalf,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A [`Channel`] over a reliable readable/writable byte stream pair.
///
/// The transport never drops bytes, so reads never fail with
/// [`ChannelError::Skip`] and `skip` does nothing.
pub struct ByteDuplexChannel<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: CancellationToken,
}

impl<R, W> ByteDuplexChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
        }
    }
}

impl ByteDuplexChannel<Stdin, Stdout> {
    /// The process's own stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl ByteDuplexChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>> {
    /// Two connected in-memory channels.
    pub fn pair(max_buf_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(max_buf_size);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (Self::new(ar, aw), Self::new(br, bw))
    }
}

fn map_io(err: std::io::Error) -> ChannelError {
    match err.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
            ChannelError::Closed
        }
        _ => ChannelError::Io(err),
    }
}

#[async_trait]
impl<R, W> Channel for ByteDuplexChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let mut writer = self.writer.lock().await;
        let result = tokio::select! {
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            res = async {
                writer.write_all(bytes).await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            } => res.map_err(map_io),
        };
        if matches!(result, Err(ChannelError::Closed)) {
            self.closed.cancel();
        }
        result
    }

    async fn skip(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn read(&self, len: usize) -> Result<Vec<u8>, ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        let mut reader = self.reader.lock().await;
        let result = tokio::select! {
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            res = reader.read_exact(&mut buf) => res.map(|_| ()).map_err(map_io),
        };
        match result {
            Ok(()) => Ok(buf),
            Err(e) => {
                if matches!(e, ChannelError::Closed) {
                    self.closed.cancel();
                }
                Err(e)
            }
        }
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_exact_lengths_across_writes() {
        let (a, b) = ByteDuplexChannel::pair(64);
        a.write(&[1, 2, 3]).await.unwrap();
        a.write(&[4, 5]).await.unwrap();
        a.skip().await.unwrap();

        assert_eq!(b.read(4).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(b.read(1).await.unwrap(), vec![5]);
        assert!(b.read(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_fails_reads_and_eof_closes_peer() {
        let (a, b) = ByteDuplexChannel::pair(64);
        a.close().await;
        assert!(a.is_closed());
        assert!(matches!(a.read(1).await, Err(ChannelError::Closed)));
        assert!(matches!(b.read(1).await, Err(ChannelError::Closed)));
        assert!(b.is_closed());
    }

    #[tokio::test]
    async fn test_read_message_unsupported() {
        let (a, _b) = ByteDuplexChannel::pair(8);
        assert!(!a.is_message_oriented());
        assert!(matches!(
            a.read_message().await,
            Err(ChannelError::Unsupported(_))
        ));
    }
}
