// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! Every rule runs and every violation is reported, so a single pass over a bad
//! file lists everything wrong with it.

use crate::config::consts::{MIN_PAYLOAD_BYTES, STALL_INTERVAL_FACTOR};
use crate::config::{Config, InterfaceConfig};
use crate::errors::ValidationError;
use crate::observability::messages::validation::{
    RuleViolated, ValidationFailed, ValidationStarted,
};
use crate::observability::messages::StructuredLog;
use crate::traits::Width;

/// Check `cfg` against every rule, returning all violations.
pub fn validate_config(cfg: &Config) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        interface_count: cfg.interfaces.len(),
    }
    .log();

    let mut errors = Vec::new();
    let stream = &cfg.stream;

    if stream.simultaneous_steps == 0 {
        errors.push(ValidationError::ZeroSimultaneousSteps);
    }
    if !(stream.lowball > 0.0 && stream.lowball <= 1.0) {
        errors.push(ValidationError::LowballOutOfRange {
            lowball: stream.lowball,
        });
    }
    if stream.max_relaunch_attempts == 0 {
        errors.push(ValidationError::ZeroRelaunchAttempts);
    }
    if stream.stall_timeout_ms >= stream.watchdog_interval_ms.saturating_mul(STALL_INTERVAL_FACTOR)
    {
        errors.push(ValidationError::StallTimeoutTooLong {
            stall_timeout_ms: stream.stall_timeout_ms,
            watchdog_interval_ms: stream.watchdog_interval_ms,
        });
    }
    if cfg.protocol.max_payload_bytes < MIN_PAYLOAD_BYTES {
        errors.push(ValidationError::PayloadLimitTooSmall {
            max_payload_bytes: cfg.protocol.max_payload_bytes,
        });
    }

    let remaining = cfg
        .interfaces
        .iter()
        .filter(|i| i.reads() == Some(Width::Remaining))
        .count();
    if remaining > 1 {
        errors.push(ValidationError::DuplicateRemaining {
            buffer: "reads",
            count: remaining,
        });
    }

    let io = cfg
        .interfaces
        .iter()
        .filter(|i| matches!(i, InterfaceConfig::Io))
        .count();
    if io > 1 {
        errors.push(ValidationError::DuplicateIo { count: io });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        for error in &errors {
            RuleViolated { error }.log();
        }
        ValidationFailed {
            error_count: errors.len(),
        }
        .log();
        Err(errors)
    }
}
