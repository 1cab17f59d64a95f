// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::compiler::UpdateItem;
use crate::config::SettingsPatch;
use crate::stream::{End, Stream, View};
use async_trait::async_trait;
use serde_json::Value;

/// Declared width of an interface's share of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Fixed(usize),
    /// Whatever the buffer has left after every fixed width. At most one
    /// interface per buffer, and it must come last.
    Remaining,
}

/// Which hooks an interface implements. Read once when the interface is bound;
/// the stream never calls a hook whose flag is off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub reads: bool,
    pub writes: bool,
    pub agent: bool,
    /// `init` and `deinit`.
    pub lifecycle: bool,
    /// `on_peer_result`.
    pub peer_result: bool,
    /// `observer`.
    pub peer_code: bool,
    pub injected_script: bool,
}

/// Views handed to an agent: its observations, predictions and actions.
#[derive(Debug, Clone)]
pub struct AgentViews {
    pub obs: View,
    pub pred: View,
    pub act: View,
}

/// A pluggable unit bound to a [`Stream`].
///
/// Widths: `None` means the interface takes no space of its own and its hooks
/// see the whole buffer.
#[async_trait]
pub trait Interface: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn reads(&self) -> Option<Width> {
        None
    }

    fn writes(&self) -> Option<Width> {
        None
    }

    /// Higher sorts earlier in buffers and in hook order.
    fn priority(&self) -> f64 {
        0.0
    }

    /// Stream settings this interface overrides, merged on every relink.
    fn settings(&self) -> Option<SettingsPatch> {
        None
    }

    /// Producer call the peer runs each step to fill this interface's observations.
    fn observer(&self) -> Option<UpdateItem<Stream>> {
        None
    }

    /// Script the page driver injects into every page.
    fn injected_script(&self) -> Option<String> {
        None
    }

    async fn init(&self, _stream: &Stream) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self, _stream: &Stream) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fill `obs`. Call `end` before (or instead of) writing into the
    /// prediction buffer; the stream's read resolves once every reader has.
    async fn read(&self, _stream: &Stream, _obs: View, _end: End) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write(&self, _stream: &Stream, _pred: View, _act: View) -> anyhow::Result<()> {
        Ok(())
    }

    /// One step of thinking. Anything but `Ok(true)` unlinks the interface.
    async fn agent(&self, _stream: &Stream, _views: AgentViews) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// This interface's entry of the peer's settled producer results.
    async fn on_peer_result(&self, _stream: &Stream, _result: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}
