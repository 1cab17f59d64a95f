// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Narrow capability objects the core consumes but never implements itself:
//! the page/session driver, the capture backend, peer connectors and whatever
//! owns the stream's external resource.

use crate::channel::Channel;
use crate::stream::Stream;
use async_trait::async_trait;
use std::sync::Arc;

/// Owns a stream's external resource and can rebuild it.
#[async_trait]
pub trait Relauncher: Send + Sync {
    /// (Re)create the resource. Called at open and whenever it is lost.
    async fn relaunch(&self, stream: &Stream) -> anyhow::Result<()>;

    /// Whether the resource is currently alive.
    fn is_connected(&self) -> bool;

    /// Forcibly release the resource after relaunching gave up, or on close.
    async fn teardown(&self);
}

/// Opens the channel to a stream's peer.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, stream: &Stream) -> anyhow::Result<Arc<dyn Channel>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Scroll { dx: f64, dy: f64 },
    MouseMove { x: f64, y: f64 },
    Key { code: String, down: bool },
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    async fn dispatch(&self, event: InputEvent) -> anyhow::Result<()>;

    /// Replace the set of scripts run in every page.
    async fn inject_scripts(&self, scripts: &[String]) -> anyhow::Result<()>;
}

/// Grabs media on the peer side.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// RGB bytes of the `w`×`h` rectangle at (`x`, `y`), downscaled to fit
    /// `max_w`×`max_h`. Row-major, 3 bytes per pixel.
    async fn video(
        &self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        max_w: u32,
        max_h: u32,
    ) -> anyhow::Result<Vec<u8>>;

    /// The most recent `samples` interleaved samples at `sample_rate`.
    async fn audio(&self, samples: usize, sample_rate: u32) -> anyhow::Result<Vec<f32>>;
}
