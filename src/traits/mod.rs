// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod collaborators;
pub mod interface;

pub use collaborators::{CaptureBackend, InputEvent, PageDriver, PeerConnector, Relauncher};
pub use interface::{AgentViews, Capabilities, Interface, Width};
