// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::traits::{Capabilities, Interface};
use async_trait::async_trait;

/// Contributes a script the page driver runs in every page.
pub struct InjectScript {
    script: String,
}

impl InjectScript {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl Interface for InjectScript {
    fn name(&self) -> &str {
        "inject_script"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            injected_script: true,
            ..Capabilities::default()
        }
    }

    fn injected_script(&self) -> Option<String> {
        Some(self.script.clone())
    }
}
