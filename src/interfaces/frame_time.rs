// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{End, Stream, View};
use crate::traits::{Capabilities, Interface, Width};
use crate::utils::lock;
use crate::utils::stats::normalize;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Instant;

const DEFAULT_MAX_MS: f64 = 1000.0;

/// Observes how far the time between reads strays from one frame at `fps`,
/// as a fraction of `max_ms` clamped to `-1..=1`.
pub struct FrameTime {
    frame_ms: f64,
    max_ms: f64,
    prev: Mutex<Instant>,
}

impl FrameTime {
    pub fn new(fps: f64, max_ms: Option<f64>) -> Self {
        let frame_ms = if fps > 0.0 { 1000.0 / fps } else { 0.0 };
        Self {
            frame_ms,
            max_ms: max_ms.filter(|m| *m > 0.0).unwrap_or(DEFAULT_MAX_MS),
            prev: Mutex::new(Instant::now()),
        }
    }

    fn observe(&self, elapsed_ms: f64) -> f32 {
        normalize((elapsed_ms - self.frame_ms) / self.max_ms, None, 0.0, 0.33, 1.0) as f32
    }
}

#[async_trait]
impl Interface for FrameTime {
    fn name(&self) -> &str {
        "frame_time"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            ..Capabilities::default()
        }
    }

    fn reads(&self) -> Option<Width> {
        Some(Width::Fixed(1))
    }

    async fn read(&self, _stream: &Stream, obs: View, end: End) -> anyhow::Result<()> {
        let now = Instant::now();
        let elapsed = {
            let mut prev = lock(&self.prev);
            let elapsed = now.saturating_duration_since(*prev);
            *prev = now;
            elapsed
        };
        end.end().await;
        let value = self.observe(elapsed.as_secs_f64() * 1000.0);
        obs.with_mut(|o| {
            if let Some(slot) = o.first_mut() {
                *slot = value;
            }
        });
        Ok(())
    }
}
