// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The receiver program: a serializable description of which producers to call
//! with which arguments, loaded once by a peer and run on every step.

use crate::errors::CompileError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROGRAM_VERSION: u32 = 1;

/// Where one argument of a call comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", content = "index", rename_all = "snake_case")]
pub enum ArgRef {
    /// An entry of the program's constant table.
    Const(usize),
    /// An entry of the per-step sent-values array.
    Sent(usize),
}

/// One producer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    /// Index into [`ReceiverProgram::bodies`].
    pub body: usize,
    /// Literal static arguments, interpreted by the peer runtime, passed before
    /// all other arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub args: Vec<ArgRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverProgram {
    pub version: u32,
    /// Setup fragments the peer runs once when loading the program.
    #[serde(default)]
    pub prelude: Vec<String>,
    /// Distinct producer bodies.
    pub bodies: Vec<String>,
    /// Distinct constant arguments, sent once.
    #[serde(default)]
    pub constants: Vec<Value>,
    /// Length of the sent-values array every step must carry.
    pub sent_count: usize,
    pub calls: Vec<CallSite>,
}

impl ReceiverProgram {
    /// Parse and check every table reference.
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let program: ReceiverProgram = serde_json::from_str(text)?;
        program.check()?;
        Ok(program)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn check(&self) -> Result<(), CompileError> {
        if self.version != PROGRAM_VERSION {
            return Err(CompileError::UnsupportedVersion(self.version));
        }
        for (call, site) in self.calls.iter().enumerate() {
            if site.body >= self.bodies.len() {
                return Err(CompileError::BadReference {
                    call,
                    table: "bodies",
                    index: site.body,
                });
            }
            for arg in &site.args {
                let (table, index, len) = match *arg {
                    ArgRef::Const(i) => ("constants", i, self.constants.len()),
                    ArgRef::Sent(i) => ("sent", i, self.sent_count),
                };
                if index >= len {
                    return Err(CompileError::BadReference { call, table, index });
                }
            }
        }
        Ok(())
    }

    /// Parse a sender's JSON array into the sent-values vector.
    pub fn parse_sent(&self, text: &[u8]) -> Result<Vec<Value>, CompileError> {
        let sent: Vec<Value> = if text.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(text)?
        };
        if sent.len() != self.sent_count {
            return Err(CompileError::SentLengthMismatch {
                expected: self.sent_count,
                actual: sent.len(),
            });
        }
        Ok(sent)
    }

    /// Like [`ReceiverProgram::parse_sent`], for a side channel that was already
    /// decoded. A missing side channel means no sent values.
    pub fn sent_from_value(&self, value: Option<Value>) -> Result<Vec<Value>, CompileError> {
        let sent = match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values,
            Some(_) => {
                return Err(CompileError::SentLengthMismatch {
                    expected: self.sent_count,
                    actual: 1,
                })
            }
        };
        if sent.len() != self.sent_count {
            return Err(CompileError::SentLengthMismatch {
                expected: self.sent_count,
                actual: sent.len(),
            });
        }
        Ok(sent)
    }

    /// The full argument list of `call`, constants and sent values resolved.
    pub fn resolve_args(&self, call: &CallSite, sent: &[Value]) -> Vec<Value> {
        call.args
            .iter()
            .map(|arg| match *arg {
                ArgRef::Const(i) => self.constants.get(i).cloned().unwrap_or(Value::Null),
                ArgRef::Sent(i) => sent.get(i).cloned().unwrap_or(Value::Null),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn program() -> ReceiverProgram {
        ReceiverProgram {
            version: PROGRAM_VERSION,
            prelude: vec![],
            bodies: vec!["image_rect".into()],
            constants: vec![json!(4)],
            sent_count: 1,
            calls: vec![CallSite {
                body: 0,
                prefix: Some("obs:0".into()),
                args: vec![ArgRef::Const(0), ArgRef::Sent(0)],
            }],
        }
    }

    #[test]
    fn test_text_roundtrip_and_resolve() {
        let p = ReceiverProgram::parse(&program().to_text()).unwrap();
        assert_eq!(p, program());
        let sent = p.parse_sent(b"[\"x\"]").unwrap();
        assert_eq!(p.resolve_args(&p.calls[0], &sent), vec![json!(4), json!("x")]);
    }

    #[test]
    fn test_rejects_dangling_references() {
        let mut p = program();
        p.calls[0].args.push(ArgRef::Const(3));
        assert!(matches!(
            ReceiverProgram::parse(&p.to_text()),
            Err(CompileError::BadReference { table: "constants", index: 3, .. })
        ));

        let mut p = program();
        p.version = 9;
        assert!(matches!(
            ReceiverProgram::parse(&p.to_text()),
            Err(CompileError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_sent_length_checked() {
        let p = program();
        assert!(matches!(
            p.parse_sent(b"[]"),
            Err(CompileError::SentLengthMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_sent_from_decoded_side_channel() {
        let p = program();
        assert_eq!(p.sent_from_value(Some(json!([7]))).unwrap(), vec![json!(7)]);
        assert!(p.sent_from_value(None).is_err());
        assert!(p.sent_from_value(Some(json!({"a": 1}))).is_err());
    }
}
