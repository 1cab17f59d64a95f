// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::traits::{InputEvent, PageDriver};
use crate::utils::lock;
use async_trait::async_trait;
use std::sync::Mutex;

/// Remembers every input event it is asked to dispatch.
#[derive(Default)]
pub(crate) struct RecordingDriver {
    events: Mutex<Vec<InputEvent>>,
}

impl RecordingDriver {
    pub(crate) fn events(&self) -> Vec<InputEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl PageDriver for RecordingDriver {
    async fn navigate(&self, _url: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn dispatch(&self, event: InputEvent) -> anyhow::Result<()> {
        lock(&self.events).push(event);
        Ok(())
    }

    async fn inject_scripts(&self, _scripts: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}
