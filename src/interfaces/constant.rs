// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{End, Stream, View};
use crate::traits::{Capabilities, Interface, Width};
use async_trait::async_trait;

/// Reads the same value into every observation it owns, optionally reserving
/// action space it never acts on.
pub struct Constant {
    value: f32,
    reads: Width,
    writes: usize,
}

impl Constant {
    pub fn new(value: f32, reads: Width, writes: usize) -> Self {
        Self {
            value,
            reads,
            writes,
        }
    }
}

#[async_trait]
impl Interface for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            writes: self.writes > 0,
            ..Capabilities::default()
        }
    }

    fn reads(&self) -> Option<Width> {
        Some(self.reads)
    }

    fn writes(&self) -> Option<Width> {
        (self.writes > 0).then_some(Width::Fixed(self.writes))
    }

    async fn read(&self, _stream: &Stream, obs: View, end: End) -> anyhow::Result<()> {
        obs.fill(self.value);
        end.fire();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamBuilder;

    #[tokio::test]
    async fn test_fills_remaining_space() {
        let stream = StreamBuilder::new()
            .interface(std::sync::Arc::new(Constant::new(0.25, Width::Remaining, 2))
                as std::sync::Arc<dyn Interface>)
            .open()
            .await
            .unwrap();
        assert_eq!(stream.writes(), 2);
        assert!(stream.read().await.unwrap().is_empty());

        stream.resize(3, 2).await.unwrap();
        assert_eq!(stream.read().await.unwrap(), vec![0.25; 3]);
        stream.close().await;
    }
}
