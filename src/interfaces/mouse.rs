// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{Stream, View};
use crate::traits::{Capabilities, InputEvent, Interface, Width};
use crate::utils::lock;
use async_trait::async_trait;
use std::sync::Mutex;

/// How two actions move the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseMode {
    /// `-1..1` spans the page on each axis.
    Absolute,
    /// Each step moves by up to this many pixels per axis.
    Relative(f64),
}

/// Two actions that move the mouse pointer, starting from the page center.
pub struct Mouse {
    mode: MouseMode,
    position: Mutex<(f64, f64)>,
}

impl Mouse {
    pub fn new(mode: MouseMode) -> Self {
        Self {
            mode,
            position: Mutex::new((0.0, 0.0)),
        }
    }

    /// Where actions `(ax, ay)` put the pointer on a `width`×`height` page.
    fn target(&self, (ax, ay): (f32, f32), width: u32, height: u32) -> (f64, f64) {
        let max_x = f64::from(width.saturating_sub(1));
        let max_y = f64::from(height.saturating_sub(1));
        let ax = f64::from(ax.clamp(-1.0, 1.0));
        let ay = f64::from(ay.clamp(-1.0, 1.0));
        let mut position = lock(&self.position);
        *position = match self.mode {
            MouseMode::Absolute => (
                ((ax + 1.0) * 0.5 * max_x).floor(),
                ((ay + 1.0) * 0.5 * max_y).floor(),
            ),
            MouseMode::Relative(sensitivity) => (
                (position.0 + sensitivity * ax).clamp(0.0, max_x).floor(),
                (position.1 + sensitivity * ay).clamp(0.0, max_y).floor(),
            ),
        };
        *position
    }
}

#[async_trait]
impl Interface for Mouse {
    fn name(&self) -> &str {
        "mouse"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writes: true,
            lifecycle: true,
            ..Capabilities::default()
        }
    }

    fn writes(&self) -> Option<Width> {
        Some(Width::Fixed(2))
    }

    async fn init(&self, stream: &Stream) -> anyhow::Result<()> {
        let settings = stream.settings();
        *lock(&self.position) = (
            f64::from(settings.width / 2),
            f64::from(settings.height / 2),
        );
        Ok(())
    }

    async fn write(&self, stream: &Stream, _pred: View, act: View) -> anyhow::Result<()> {
        let Some(driver) = stream.page_driver() else {
            return Ok(());
        };
        let act = act.to_vec();
        let (Some(&ax), Some(&ay)) = (act.first(), act.get(1)) else {
            return Ok(());
        };
        if !(ax.is_finite() && ay.is_finite()) {
            return Ok(());
        }
        let settings = stream.settings();
        let (x, y) = self.target((ax, ay), settings.width, settings.height);
        driver.dispatch(InputEvent::MouseMove { x, y }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamSettings;
    use crate::interfaces::test_support::RecordingDriver;
    use crate::stream::StreamBuilder;
    use std::sync::Arc;

    async fn open(mouse: Arc<Mouse>, driver: Arc<RecordingDriver>) -> Stream {
        let settings = StreamSettings {
            width: 101,
            height: 51,
            ..Default::default()
        };
        StreamBuilder::new()
            .settings(settings)
            .interface(mouse as Arc<dyn Interface>)
            .page_driver(driver)
            .open()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_absolute_spans_the_page() {
        let driver = Arc::new(RecordingDriver::default());
        let stream = open(Arc::new(Mouse::new(MouseMode::Absolute)), driver.clone()).await;

        stream.write(&[-1.0, 1.0]).await.unwrap();
        stream.write(&[0.0, 5.0]).await.unwrap();
        stream.write(&[f32::NAN, 0.0]).await.unwrap();
        assert_eq!(
            driver.events(),
            vec![
                InputEvent::MouseMove { x: 0.0, y: 50.0 },
                InputEvent::MouseMove { x: 50.0, y: 50.0 },
            ]
        );
        stream.close().await;
    }

    #[tokio::test]
    async fn test_relative_moves_from_center_and_stops_at_edges() {
        let driver = Arc::new(RecordingDriver::default());
        let stream = open(Arc::new(Mouse::new(MouseMode::Relative(10.0))), driver.clone()).await;

        stream.write(&[1.0, -0.5]).await.unwrap();
        for _ in 0..10 {
            stream.write(&[1.0, 1.0]).await.unwrap();
        }
        let events = driver.events();
        assert_eq!(events[0], InputEvent::MouseMove { x: 60.0, y: 20.0 });
        assert_eq!(events.last(), Some(&InputEvent::MouseMove { x: 100.0, y: 50.0 }));
        stream.close().await;
    }
}
