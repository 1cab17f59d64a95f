// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in interfaces, one per capability, plus the capture link that
//! connects a stream to its peer.

pub mod audio;
pub mod capture;
pub mod constant;
pub mod factory;
pub mod frame_time;
pub mod image_rect;
pub mod inject_script;
pub mod io;
pub mod keyboard;
pub mod loopback;
pub mod mouse;
pub mod random_agent;
pub mod scroll_by;

#[cfg(test)]
pub(crate) mod test_support;

pub use audio::Audio;
pub use capture::CaptureLink;
pub use constant::Constant;
pub use factory::InterfaceFactory;
pub use frame_time::FrameTime;
pub use image_rect::ImageRect;
pub use inject_script::InjectScript;
pub use io::Io;
pub use keyboard::Keyboard;
pub use loopback::Loopback;
pub use mouse::{Mouse, MouseMode};
pub use random_agent::RandomAgent;
pub use scroll_by::ScrollBy;
