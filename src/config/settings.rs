// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::codec::IntFormat;
use crate::config::consts::{
    DEFAULT_HEIGHT, DEFAULT_HOMEPAGE, DEFAULT_LOWBALL, DEFAULT_MAX_PAYLOAD_BYTES,
    DEFAULT_MAX_RELAUNCH_ATTEMPTS, DEFAULT_SIMULTANEOUS_STEPS, DEFAULT_STALL_TIMEOUT_MS,
    DEFAULT_WATCHDOG_INTERVAL_MS, DEFAULT_WIDTH,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-stream scheduling and session settings.
///
/// # Example
/// ```yaml
/// stream:
///   simultaneous_steps: 8
///   lowball: 0.5
///   stall_timeout_ms: 10000
///   homepage: "https://example.com"
///   secrets:
///     api_key: "..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub simultaneous_steps: usize,
    pub lowball: f64,
    pub max_relaunch_attempts: u32,
    pub watchdog_interval_ms: u64,
    pub stall_timeout_ms: u64,
    pub width: u32,
    pub height: u32,
    pub homepage: String,
    pub secrets: HashMap<String, String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            simultaneous_steps: DEFAULT_SIMULTANEOUS_STEPS,
            lowball: DEFAULT_LOWBALL,
            max_relaunch_attempts: DEFAULT_MAX_RELAUNCH_ATTEMPTS,
            watchdog_interval_ms: DEFAULT_WATCHDOG_INTERVAL_MS,
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            homepage: DEFAULT_HOMEPAGE.to_string(),
            secrets: HashMap::new(),
        }
    }
}

impl StreamSettings {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

/// Overrides an interface contributes to its stream's settings.
///
/// Unset fields leave the stream's value alone; secrets merge key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub simultaneous_steps: Option<usize>,
    pub lowball: Option<f64>,
    pub max_relaunch_attempts: Option<u32>,
    pub watchdog_interval_ms: Option<u64>,
    pub stall_timeout_ms: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub homepage: Option<String>,
    pub secrets: HashMap<String, String>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut StreamSettings) {
        if let Some(v) = self.simultaneous_steps {
            settings.simultaneous_steps = v.max(1);
        }
        if let Some(v) = self.lowball {
            settings.lowball = v;
        }
        if let Some(v) = self.max_relaunch_attempts {
            settings.max_relaunch_attempts = v;
        }
        if let Some(v) = self.watchdog_interval_ms {
            settings.watchdog_interval_ms = v;
        }
        if let Some(v) = self.stall_timeout_ms {
            settings.stall_timeout_ms = v;
        }
        if let Some(v) = self.width {
            settings.width = v;
        }
        if let Some(v) = self.height {
            settings.height = v;
        }
        if let Some(v) = &self.homepage {
            settings.homepage = v.clone();
        }
        for (k, v) in &self.secrets {
            settings.secrets.insert(k.clone(), v.clone());
        }
    }
}

/// Wire protocol settings shared by both sides of a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub int_format: IntFormat,
    pub max_payload_bytes: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            int_format: IntFormat::I16,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_overrides_only_set_fields() {
        let mut settings = StreamSettings::default();
        settings.secrets.insert("a".into(), "1".into());

        let mut patch = SettingsPatch {
            lowball: Some(0.25),
            homepage: Some("https://example.com".into()),
            ..Default::default()
        };
        patch.secrets.insert("b".into(), "2".into());
        patch.apply(&mut settings);

        assert_eq!(settings.lowball, 0.25);
        assert_eq!(settings.homepage, "https://example.com");
        assert_eq!(settings.simultaneous_steps, DEFAULT_SIMULTANEOUS_STEPS);
        assert_eq!(settings.secrets.len(), 2);
    }

    #[test]
    fn test_patch_never_disables_stepping() {
        let mut settings = StreamSettings::default();
        SettingsPatch {
            simultaneous_steps: Some(0),
            ..Default::default()
        }
        .apply(&mut settings);
        assert_eq!(settings.simultaneous_steps, 1);
    }

    #[test]
    fn test_durations() {
        let settings = StreamSettings::default();
        assert_eq!(settings.watchdog_interval(), Duration::from_secs(30));
        assert_eq!(settings.stall_timeout(), Duration::from_secs(15));
    }
}
