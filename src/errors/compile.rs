// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors building or loading merged update programs.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("update item {0} has an empty producer")]
    EmptyProducer(usize),

    #[error("receiver program is not valid JSON: {0}")]
    InvalidProgram(#[from] serde_json::Error),

    #[error("unsupported receiver program version {0}")]
    UnsupportedVersion(u32),

    #[error("call {call} references {table} entry {index} which does not exist")]
    BadReference {
        call: usize,
        table: &'static str,
        index: usize,
    },

    #[error("unrecognized prelude statement '{0}'")]
    BadPrelude(String),

    #[error("sent value vector has {actual} entries, program expects {expected}")]
    SentLengthMismatch { expected: usize, actual: usize },
}
