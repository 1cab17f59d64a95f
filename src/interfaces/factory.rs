// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::*;
use crate::config::consts::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::config::{InterfaceConfig, ProtocolSettings};
use crate::traits::{Interface, PeerConnector};

/// Builds built-in interfaces from configuration.
///
/// With a peer connector attached, any configured interface whose
/// observations come from the peer (`image_rect`, `audio`) also gets a
/// [`CaptureLink`] appended to the list.
#[derive(Default)]
pub struct InterfaceFactory {
    peer: Option<(Arc<dyn PeerConnector>, ProtocolSettings)>,
}

impl InterfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, connector: Arc<dyn PeerConnector>, protocol: ProtocolSettings) -> Self {
        self.peer = Some((connector, protocol));
        self
    }

    /// Create one interface from its configuration.
    ///
    /// The interface's `name()` is the config's `kind`.
    pub fn create_interface(config: &InterfaceConfig) -> Arc<dyn Interface> {
        match config {
            InterfaceConfig::Constant {
                value,
                reads,
                writes,
            } => Arc::new(Constant::new(*value, (*reads).into(), *writes)),
            InterfaceConfig::Loopback { count } => Arc::new(Loopback::new(*count)),
            InterfaceConfig::FrameTime { fps, max_ms } => Arc::new(FrameTime::new(*fps, *max_ms)),
            InterfaceConfig::RandomAgent { relative } => Arc::new(RandomAgent::new(*relative)),
            InterfaceConfig::ScrollBy { sensitivity } => Arc::new(ScrollBy::new(*sensitivity)),
            InterfaceConfig::InjectScript { script } => Arc::new(InjectScript::new(script.clone())),
            InterfaceConfig::ImageRect {
                x,
                y,
                width,
                height,
            } => Arc::new(ImageRect::new(*x, *y, *width, *height)),
            InterfaceConfig::Audio {
                samples,
                sample_rate,
            } => Arc::new(Audio::new(*samples, *sample_rate)),
            InterfaceConfig::Io => Arc::new(Io::stdio(DEFAULT_MAX_PAYLOAD_BYTES)),
            InterfaceConfig::Mouse { relative } => Arc::new(Mouse::new(match relative {
                Some(sensitivity) => MouseMode::Relative(*sensitivity),
                None => MouseMode::Absolute,
            })),
            InterfaceConfig::Keyboard { keys, max_at_once } => Arc::new(Keyboard::new(
                keys.as_deref().unwrap_or(keyboard::DEFAULT_KEYS),
                *max_at_once,
            )),
        }
    }

    /// Create every configured interface, in order.
    pub fn build_all(&self, configs: &[InterfaceConfig]) -> Vec<Arc<dyn Interface>> {
        let mut interfaces: Vec<Arc<dyn Interface>> =
            configs.iter().map(Self::create_interface).collect();
        if let Some((connector, protocol)) = &self.peer {
            let observed = interfaces.iter().any(|i| i.capabilities().peer_code);
            if observed {
                interfaces.push(Arc::new(CaptureLink::new(Arc::clone(connector), protocol)));
            }
        }
        interfaces
    }

    /// Every `kind` a config may name.
    pub fn list_available_kinds() -> Vec<&'static str> {
        vec![
            "constant",
            "loopback",
            "frame_time",
            "random_agent",
            "scroll_by",
            "inject_script",
            "image_rect",
            "audio",
            "io",
            "mouse",
            "keyboard",
        ]
    }
}
