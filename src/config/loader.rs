// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::settings::{ProtocolSettings, StreamSettings};
use crate::errors::ConfigError;
use crate::traits::Width;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration for one stream and its peer link.
///
/// # Example
/// ```yaml
/// stream:
///   simultaneous_steps: 4
/// protocol:
///   int_format: i16
/// interfaces:
///   - kind: frame_time
///     fps: 30
///   - kind: loopback
///     count: 2
///   - kind: random_agent
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub protocol: ProtocolSettings,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// A buffer width as written in config: a number, or `remaining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WidthConfig {
    Fixed(usize),
    Keyword(WidthKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthKeyword {
    Remaining,
}

impl From<WidthConfig> for Width {
    fn from(w: WidthConfig) -> Self {
        match w {
            WidthConfig::Fixed(n) => Width::Fixed(n),
            WidthConfig::Keyword(WidthKeyword::Remaining) => Width::Remaining,
        }
    }
}

fn default_fps() -> f64 {
    30.0
}

fn default_sensitivity() -> f64 {
    100.0
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_max_at_once() -> usize {
    3
}

/// One built-in interface, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterfaceConfig {
    Constant {
        value: f32,
        reads: WidthConfig,
        #[serde(default)]
        writes: usize,
    },
    Loopback {
        count: usize,
    },
    FrameTime {
        #[serde(default = "default_fps")]
        fps: f64,
        #[serde(default)]
        max_ms: Option<f64>,
    },
    RandomAgent {
        #[serde(default)]
        relative: f32,
    },
    ScrollBy {
        #[serde(default = "default_sensitivity")]
        sensitivity: f64,
    },
    InjectScript {
        script: String,
    },
    ImageRect {
        #[serde(default)]
        x: u32,
        #[serde(default)]
        y: u32,
        width: u32,
        height: u32,
    },
    Audio {
        samples: usize,
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
    },
    /// An external agent on stdin/stdout.
    Io,
    Mouse {
        /// Pixels per step; absolute positioning when unset.
        #[serde(default)]
        relative: Option<f64>,
    },
    Keyboard {
        /// Space-separated keys; a full keyboard when unset.
        #[serde(default)]
        keys: Option<String>,
        #[serde(default = "default_max_at_once")]
        max_at_once: usize,
    },
}

impl InterfaceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            InterfaceConfig::Constant { .. } => "constant",
            InterfaceConfig::Loopback { .. } => "loopback",
            InterfaceConfig::FrameTime { .. } => "frame_time",
            InterfaceConfig::RandomAgent { .. } => "random_agent",
            InterfaceConfig::ScrollBy { .. } => "scroll_by",
            InterfaceConfig::InjectScript { .. } => "inject_script",
            InterfaceConfig::ImageRect { .. } => "image_rect",
            InterfaceConfig::Audio { .. } => "audio",
            InterfaceConfig::Io => "io",
            InterfaceConfig::Mouse { .. } => "mouse",
            InterfaceConfig::Keyboard { .. } => "keyboard",
        }
    }

    /// Declared read width, if this kind takes observation space.
    pub fn reads(&self) -> Option<Width> {
        match self {
            InterfaceConfig::Constant { reads, .. } => Some((*reads).into()),
            InterfaceConfig::Loopback { count } => Some(Width::Fixed(*count)),
            InterfaceConfig::FrameTime { .. } => Some(Width::Fixed(1)),
            InterfaceConfig::ImageRect { width, height, .. } => {
                Some(Width::Fixed(*width as usize * *height as usize * 3))
            }
            InterfaceConfig::Audio { samples, .. } => Some(Width::Fixed(*samples)),
            _ => None,
        }
    }
}

/// Load a config from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "toml" => Ok(toml::from_str(&content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a config and check it against every validation rule.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IntFormat;

    #[test]
    fn parse_input_interfaces() {
        let yaml = r#"
interfaces:
  - kind: io
  - kind: mouse
    relative: 25
  - kind: keyboard
    keys: "a b Spacebar"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.interfaces[0], InterfaceConfig::Io);
        assert_eq!(cfg.interfaces[1], InterfaceConfig::Mouse { relative: Some(25.0) });
        assert_eq!(
            cfg.interfaces[2],
            InterfaceConfig::Keyboard {
                keys: Some("a b Spacebar".to_string()),
                max_at_once: 3,
            }
        );
        assert!(cfg.interfaces.iter().all(|i| i.reads().is_none()));
    }

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
stream:
  simultaneous_steps: 4
protocol:
  int_format: i8
interfaces:
  - kind: constant
    value: 0.5
    reads: 2
  - kind: loopback
    count: 3
  - kind: constant
    value: 0
    reads: remaining
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.stream.simultaneous_steps, 4);
        assert_eq!(cfg.stream.lowball, 0.5);
        assert_eq!(cfg.protocol.int_format, IntFormat::I8);
        assert_eq!(cfg.interfaces.len(), 3);
        assert_eq!(cfg.interfaces[1], InterfaceConfig::Loopback { count: 3 });
        assert_eq!(cfg.interfaces[2].reads(), Some(Width::Remaining));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.stream, StreamSettings::default());
        assert_eq!(cfg.protocol, ProtocolSettings::default());
        assert!(cfg.interfaces.is_empty());
    }

    #[test]
    fn test_interface_defaults() {
        let yaml = r#"
- kind: frame_time
- kind: audio
  samples: 128
- kind: random_agent
"#;
        let interfaces: Vec<InterfaceConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            interfaces[0],
            InterfaceConfig::FrameTime { fps: 30.0, max_ms: None }
        );
        assert_eq!(
            interfaces[1],
            InterfaceConfig::Audio { samples: 128, sample_rate: 44_100 }
        );
        assert_eq!(interfaces[2].kind(), "random_agent");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "interfaces:\n  - kind: teleporter\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_load_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.toml");
        std::fs::write(
            &path,
            r#"
[stream]
lowball = 0.25

[[interfaces]]
kind = "image_rect"
width = 4
height = 2
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.stream.lowball, 0.25);
        assert_eq!(cfg.interfaces[0].reads(), Some(Width::Fixed(24)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }
}
