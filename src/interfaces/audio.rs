// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::compiler::{ArgSpec, UpdateItem};
use crate::stream::Stream;
use crate::traits::{Capabilities, Interface, Width};
use async_trait::async_trait;
use serde_json::json;

/// The most recent audio samples, filled on the peer by the `audio` producer.
pub struct Audio {
    samples: usize,
    sample_rate: u32,
}

impl Audio {
    pub fn new(samples: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }
}

#[async_trait]
impl Interface for Audio {
    fn name(&self) -> &str {
        "audio"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            peer_code: true,
            ..Capabilities::default()
        }
    }

    fn reads(&self) -> Option<Width> {
        Some(Width::Fixed(self.samples))
    }

    fn observer(&self) -> Option<UpdateItem<Stream>> {
        Some(UpdateItem::new(
            "audio",
            vec![ArgSpec::constant(json!({
                "samples": self.samples,
                "sample_rate": self.sample_rate,
            }))],
        ))
    }
}
