// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::traits::CaptureBackend;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A named peer-side routine a receiver program can call.
///
/// `out` is the observation slice the call owns (empty when the call has no
/// `obs:` prefix). The returned value becomes the call's settled result.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(
        &self,
        capture: &dyn CaptureBackend,
        out: &mut [f32],
        args: &[Value],
    ) -> anyhow::Result<Value>;
}

/// Producers by body name.
#[derive(Clone, Default)]
pub struct ProducerRegistry(HashMap<String, Arc<dyn Producer>>);

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `image_rect` and `audio`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("image_rect", Arc::new(ImageRectProducer));
        registry.register("audio", Arc::new(AudioProducer));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, producer: Arc<dyn Producer>) {
        self.0.insert(name.into(), producer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Producer>> {
        self.0.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn first_arg<'de, T: Deserialize<'de>>(name: &str, args: &'de [Value]) -> anyhow::Result<T> {
    let arg = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("{} expects a settings argument", name))?;
    Ok(T::deserialize(arg)?)
}

#[derive(Deserialize)]
struct RectArgs {
    #[serde(default)]
    x: u32,
    #[serde(default)]
    y: u32,
    width: u32,
    height: u32,
}

/// Grabs an RGB rectangle and maps each byte from `0..=255` to `-1..=1`.
pub struct ImageRectProducer;

#[async_trait]
impl Producer for ImageRectProducer {
    async fn produce(
        &self,
        capture: &dyn CaptureBackend,
        out: &mut [f32],
        args: &[Value],
    ) -> anyhow::Result<Value> {
        let rect: RectArgs = first_arg("image_rect", args)?;
        let rgb = capture
            .video(rect.x, rect.y, rect.width, rect.height, rect.width, rect.height)
            .await?;
        for (dst, byte) in out.iter_mut().zip(&rgb) {
            *dst = f32::from(*byte) / 255.0 * 2.0 - 1.0;
        }
        Ok(json!({ "width": rect.width, "height": rect.height }))
    }
}

#[derive(Deserialize)]
struct AudioArgs {
    samples: usize,
    sample_rate: u32,
}

/// Copies the most recent audio samples in.
pub struct AudioProducer;

#[async_trait]
impl Producer for AudioProducer {
    async fn produce(
        &self,
        capture: &dyn CaptureBackend,
        out: &mut [f32],
        args: &[Value],
    ) -> anyhow::Result<Value> {
        let audio: AudioArgs = first_arg("audio", args)?;
        let samples = capture.audio(audio.samples, audio.sample_rate).await?;
        let n = out.len().min(samples.len());
        out[..n].copy_from_slice(&samples[..n]);
        Ok(json!(n))
    }
}
