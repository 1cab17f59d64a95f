// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{Stream, View};
use crate::traits::{Capabilities, InputEvent, Interface, Width};
use async_trait::async_trait;

/// Two actions that add to the page's scroll position, in pixels per unit.
pub struct ScrollBy {
    sensitivity: f64,
}

impl ScrollBy {
    pub fn new(sensitivity: f64) -> Self {
        Self { sensitivity }
    }

    fn delta(&self, act: f32) -> Option<f64> {
        act.is_finite()
            .then(|| self.sensitivity * f64::from(act.clamp(-1.0, 1.0)))
    }
}

#[async_trait]
impl Interface for ScrollBy {
    fn name(&self) -> &str {
        "scroll_by"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writes: true,
            ..Capabilities::default()
        }
    }

    fn writes(&self) -> Option<Width> {
        Some(Width::Fixed(2))
    }

    async fn write(&self, stream: &Stream, _pred: View, act: View) -> anyhow::Result<()> {
        let Some(driver) = stream.page_driver() else {
            return Ok(());
        };
        let act = act.to_vec();
        let (Some(dx), Some(dy)) = (
            act.first().and_then(|a| self.delta(*a)),
            act.get(1).and_then(|a| self.delta(*a)),
        ) else {
            return Ok(());
        };
        driver.dispatch(InputEvent::Scroll { dx, dy }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::test_support::RecordingDriver;
    use crate::stream::StreamBuilder;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_dispatches_clamped_scroll() {
        let events = Arc::new(RecordingDriver::default());
        let scroll: Arc<dyn Interface> = Arc::new(ScrollBy::new(100.0));
        let stream = StreamBuilder::new()
            .interface(scroll)
            .page_driver(events.clone())
            .open()
            .await
            .unwrap();

        stream.write(&[0.5, -3.0]).await.unwrap();
        stream.write(&[f32::NAN, 0.0]).await.unwrap();
        assert_eq!(
            events.events(),
            vec![InputEvent::Scroll { dx: 50.0, dy: -100.0 }]
        );
        stream.close().await;
    }
}
