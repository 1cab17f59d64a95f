// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{End, Stream, View};
use crate::traits::{Capabilities, Interface, Width};
use crate::utils::lock;
use async_trait::async_trait;
use std::sync::Mutex;

/// Observes the most recent actions it was given. Agents can use it to
/// compensate for latency.
pub struct Loopback {
    count: usize,
    last_act: Mutex<Option<Vec<f32>>>,
}

impl Loopback {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            last_act: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Interface for Loopback {
    fn name(&self) -> &str {
        "loopback"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            writes: true,
            ..Capabilities::default()
        }
    }

    fn reads(&self) -> Option<Width> {
        Some(Width::Fixed(self.count))
    }

    fn writes(&self) -> Option<Width> {
        Some(Width::Fixed(self.count))
    }

    async fn read(&self, _stream: &Stream, obs: View, end: End) -> anyhow::Result<()> {
        end.end().await;
        let last = lock(&self.last_act).clone();
        if let Some(act) = last {
            obs.copy_from(&act);
        }
        Ok(())
    }

    async fn write(&self, _stream: &Stream, _pred: View, act: View) -> anyhow::Result<()> {
        *lock(&self.last_act) = Some(act.to_vec());
        Ok(())
    }
}
