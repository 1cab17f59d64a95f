// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod channel;       // framed byte channels
pub mod codec;         // fixed-point quantization
pub mod compiler;      // merged peer update programs
pub mod config;        // settings + interface registry
pub mod errors;        // error handling
pub mod interfaces;    // built-in interfaces
pub mod observability;
pub mod peer;          // responder-side runtime
pub mod stream;        // per-stream scheduler
pub mod traits;        // unified abstractions
pub mod utils;
pub mod wire;          // wire protocol

pub use crate::channel::{ByteDuplexChannel, Channel, MessageChannel};
pub use crate::codec::{EncodedArray, IntFormat};
pub use crate::stream::{InterfaceTree, Stream, StreamBuilder, StreamState, View};
pub use crate::traits::{Capabilities, Interface, Width};
