// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::{Stream, View};
use crate::traits::{Capabilities, InputEvent, Interface, Width};
use crate::utils::lock;
use async_trait::async_trait;
use std::sync::Mutex;

/// Keys exposed when none are configured. `Spacebar` stands for `" "`.
pub const DEFAULT_KEYS: &str = "Alt Control Shift Enter Tab Spacebar ArrowDown ArrowLeft \
ArrowRight ArrowUp End Home PageDown PageUp Backspace Delete Escape ` ~ 1 2 3 4 5 6 7 8 9 0 \
! @ # $ % ^ & * ( ) q w e r t y u i o p [ ] \\ a s d f g h j k l ; ' z x c v b n m , . / \
Q W E R T Y U I O P { } | A S D F G H J K L : \" Z X C V B N M < > ?";

/// An action at or above this presses its key.
const THRESHOLD: f32 = 0.5;

/// One action per key. A key is held while its action is at least `0.5` and
/// among the `max_at_once` largest; only changes are dispatched.
pub struct Keyboard {
    keys: Vec<String>,
    max_at_once: usize,
    held: Mutex<Vec<bool>>,
}

impl Keyboard {
    /// `keys` is space-separated. `max_at_once` of 0 lets every key be held.
    pub fn new(keys: &str, max_at_once: usize) -> Self {
        let keys: Vec<String> = keys
            .split_whitespace()
            .map(|k| if k == "Spacebar" { " ".to_string() } else { k.to_string() })
            .collect();
        let held = Mutex::new(vec![false; keys.len()]);
        Self {
            keys,
            max_at_once,
            held,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn threshold(&self, act: &[f32]) -> f32 {
        if self.max_at_once == 0 || self.max_at_once >= act.len() {
            return THRESHOLD;
        }
        let mut ranked: Vec<f32> = act.iter().copied().filter(|a| !a.is_nan()).collect();
        ranked.sort_by(|a, b| b.total_cmp(a));
        match ranked.get(self.max_at_once - 1) {
            Some(&cutoff) => THRESHOLD.max(cutoff),
            None => THRESHOLD,
        }
    }

    /// Key transitions for `act`, applied to the held state.
    fn transitions(&self, act: &[f32]) -> Vec<InputEvent> {
        let threshold = self.threshold(act);
        let mut held = lock(&self.held);
        let mut events = Vec::new();
        for ((key, was), a) in self.keys.iter().zip(held.iter_mut()).zip(act) {
            let now = *a >= threshold;
            if now != *was {
                events.push(InputEvent::Key {
                    code: key.clone(),
                    down: now,
                });
                *was = now;
            }
        }
        events
    }
}

#[async_trait]
impl Interface for Keyboard {
    fn name(&self) -> &str {
        "keyboard"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writes: true,
            ..Capabilities::default()
        }
    }

    fn writes(&self) -> Option<Width> {
        Some(Width::Fixed(self.keys.len()))
    }

    async fn write(&self, stream: &Stream, _pred: View, act: View) -> anyhow::Result<()> {
        let Some(driver) = stream.page_driver() else {
            return Ok(());
        };
        for event in self.transitions(&act.to_vec()) {
            driver.dispatch(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::test_support::RecordingDriver;
    use crate::stream::StreamBuilder;
    use std::sync::Arc;

    fn key(code: &str, down: bool) -> InputEvent {
        InputEvent::Key {
            code: code.to_string(),
            down,
        }
    }

    #[test]
    fn test_default_keys_parse() {
        let keyboard = Keyboard::new(DEFAULT_KEYS, 3);
        assert_eq!(keyboard.keys()[5], " ");
        assert!(keyboard.keys().iter().any(|k| k == "\\"));
        assert!(keyboard.keys().iter().any(|k| k == "\""));
        assert_eq!(keyboard.writes(), Some(Width::Fixed(keyboard.keys().len())));
    }

    #[test]
    fn test_only_the_strongest_keys_are_held() {
        let keyboard = Keyboard::new("a b c d", 2);
        assert_eq!(
            keyboard.transitions(&[0.9, 0.6, 0.8, 0.2]),
            vec![key("a", true), key("c", true)]
        );
        assert!(keyboard.transitions(&[0.9, 0.6, 0.8, 0.2]).is_empty());
        assert_eq!(
            keyboard.transitions(&[0.1, 0.6, 0.8, f32::NAN]),
            vec![key("a", false), key("b", true)]
        );
    }

    #[tokio::test]
    async fn test_presses_and_releases_through_driver() {
        let driver = Arc::new(RecordingDriver::default());
        let keyboard: Arc<dyn Interface> = Arc::new(Keyboard::new("Enter Spacebar", 0));
        let stream = StreamBuilder::new()
            .interface(keyboard)
            .page_driver(driver.clone())
            .open()
            .await
            .unwrap();

        stream.write(&[1.0, 0.5]).await.unwrap();
        stream.write(&[1.0, 0.0]).await.unwrap();
        assert_eq!(
            driver.events(),
            vec![key("Enter", true), key(" ", true), key(" ", false)]
        );
        stream.close().await;
    }
}
