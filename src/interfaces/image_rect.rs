// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::compiler::{ArgSpec, UpdateItem};
use crate::stream::Stream;
use crate::traits::{Capabilities, Interface, Width};
use async_trait::async_trait;
use serde_json::json;

/// RGB observations of a rectangle of the page, each channel in `-1..=1`.
///
/// Filled on the peer by the `image_rect` producer, one step behind.
pub struct ImageRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl ImageRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[async_trait]
impl Interface for ImageRect {
    fn name(&self) -> &str {
        "image_rect"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            peer_code: true,
            ..Capabilities::default()
        }
    }

    fn reads(&self) -> Option<Width> {
        Some(Width::Fixed(self.width as usize * self.height as usize * 3))
    }

    fn observer(&self) -> Option<UpdateItem<Stream>> {
        Some(UpdateItem::new(
            "image_rect",
            vec![ArgSpec::constant(json!({
                "x": self.x,
                "y": self.y,
                "width": self.width,
                "height": self.height,
            }))],
        ))
    }
}
