// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

/// A single rule violated by a loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `stream.simultaneous_steps` must allow at least one step.
    ZeroSimultaneousSteps,
    /// `stream.lowball` must lie in `(0, 1]`.
    LowballOutOfRange { lowball: f64 },
    ZeroRelaunchAttempts,
    /// The stall timeout must be short enough for the watchdog to notice a stall.
    StallTimeoutTooLong {
        stall_timeout_ms: u64,
        watchdog_interval_ms: u64,
    },
    PayloadLimitTooSmall { max_payload_bytes: usize },
    /// Only one interface may take the remaining space of a buffer.
    DuplicateRemaining { buffer: &'static str, count: usize },
    /// Standard IO carries a single external agent.
    DuplicateIo { count: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroSimultaneousSteps => {
                write!(f, "simultaneous_steps must be at least 1")
            }
            ValidationError::LowballOutOfRange { lowball } => {
                write!(f, "lowball must be in (0, 1], got {}", lowball)
            }
            ValidationError::ZeroRelaunchAttempts => {
                write!(f, "max_relaunch_attempts must be at least 1")
            }
            ValidationError::StallTimeoutTooLong {
                stall_timeout_ms,
                watchdog_interval_ms,
            } => write!(
                f,
                "stall_timeout_ms ({}) must be less than four watchdog intervals ({} ms each)",
                stall_timeout_ms, watchdog_interval_ms
            ),
            ValidationError::PayloadLimitTooSmall { max_payload_bytes } => {
                write!(f, "max_payload_bytes must be at least 16, got {}", max_payload_bytes)
            }
            ValidationError::DuplicateIo { count } => {
                write!(f, "only one io interface may be configured, found {}", count)
            }
            ValidationError::DuplicateRemaining { buffer, count } => write!(
                f,
                "{} interfaces claim the remaining {} space; at most one may",
                count, buffer
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config file extension '{0}'")]
    UnsupportedFormat(String),

    #[error("Configuration validation failed:\n{}", join_lines(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_lines(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
