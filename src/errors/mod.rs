// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod channel;
mod compile;
mod config;
mod protocol;
mod stream;

pub use channel::ChannelError;
pub use compile::CompileError;
pub use config::{ConfigError, ValidationError};
pub use protocol::ProtocolError;
pub use stream::StreamError;
