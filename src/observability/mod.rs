// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic event in the crate is a small struct in `messages` with a
//! `Display` implementation and a [`messages::StructuredLog`] implementation that
//! emits it at the right level with structured fields. Call sites never build
//! log strings themselves.
//!
//! Messages are organized by subsystem:
//! * `messages::stream` - stream lifecycle, step loop, watchdog and relaunch events
//! * `messages::protocol` - handshakes, protocol violations and peer connections
//! * `messages::interface` - interface hook failures and unlinking
//! * `messages::validation` - configuration validation results
//!
//! # Usage
//!
//! ```rust
//! use sensorium::observability::messages::{stream::StreamClosed, StructuredLog};
//!
//! StreamClosed { stream_id: 7, interfaces: 3 }.log();
//! ```
//!
//! The library never installs a subscriber; binaries choose their own.

pub mod messages;
