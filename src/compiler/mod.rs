// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Merges many small peer-side producer calls into one receiver program and one
//! sender.
//!
//! Each [`UpdateItem`] names a producer body and its arguments. Constant
//! arguments are deduplicated by their JSON text into a table sent once with the
//! program. Dynamic arguments are deduplicated by key and evaluated once per step
//! by the [`UpdateSender`], which serializes them as a JSON array. The peer
//! rebuilds every call's argument list from the two and runs all producers.
//!
//! ```rust
//! use sensorium::compiler::{compile_update, ArgSpec, StaticArgs, UpdateItem};
//!
//! let items: Vec<UpdateItem<u32>> = vec![
//!     UpdateItem::new("audio", vec![ArgSpec::constant(2048), ArgSpec::dynamic("tick", |t: &u32| (*t).into())]),
//!     UpdateItem::new("audio", vec![ArgSpec::constant(2048)]),
//! ];
//! let compiled = compile_update(&items, &StaticArgs::default(), &[]).unwrap();
//! assert_eq!(compiled.program().bodies.len(), 1);
//! assert_eq!(compiled.program().constants.len(), 1);
//! assert_eq!(compiled.sender().send(&7), "[7]");
//! ```

mod program;
mod whitespace;

pub use program::{ArgRef, CallSite, ReceiverProgram, PROGRAM_VERSION};
pub use whitespace::collapse_whitespace;

use crate::errors::CompileError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Evaluates a dynamic argument against call-time context.
pub type DynamicFn<C> = Arc<dyn Fn(&C) -> Value + Send + Sync>;

/// One argument of an [`UpdateItem`].
pub enum ArgSpec<C> {
    /// Serialized into the constant table once.
    Const(Value),
    /// Evaluated on every send. Items sharing a `key` share one evaluation.
    Dynamic { key: String, eval: DynamicFn<C> },
}

impl<C> ArgSpec<C> {
    pub fn constant(value: impl Into<Value>) -> Self {
        ArgSpec::Const(value.into())
    }

    pub fn dynamic<F>(key: impl Into<String>, eval: F) -> Self
    where
        F: Fn(&C) -> Value + Send + Sync + 'static,
    {
        ArgSpec::Dynamic {
            key: key.into(),
            eval: Arc::new(eval),
        }
    }
}

impl<C> Clone for ArgSpec<C> {
    fn clone(&self) -> Self {
        match self {
            ArgSpec::Const(v) => ArgSpec::Const(v.clone()),
            ArgSpec::Dynamic { key, eval } => ArgSpec::Dynamic {
                key: key.clone(),
                eval: Arc::clone(eval),
            },
        }
    }
}

impl<C> fmt::Debug for ArgSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSpec::Const(v) => write!(f, "Const({})", v),
            ArgSpec::Dynamic { key, .. } => write!(f, "Dynamic({})", key),
        }
    }
}

/// A producer body plus the arguments to call it with.
pub struct UpdateItem<C> {
    pub producer: String,
    pub args: Vec<ArgSpec<C>>,
}

impl<C> UpdateItem<C> {
    pub fn new(producer: impl Into<String>, args: Vec<ArgSpec<C>>) -> Self {
        Self {
            producer: producer.into(),
            args,
        }
    }
}

impl<C> Clone for UpdateItem<C> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
            args: self.args.clone(),
        }
    }
}

impl<C> fmt::Debug for UpdateItem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateItem")
            .field("producer", &self.producer)
            .field("args", &self.args)
            .finish()
    }
}

/// Literal argument prefixes, keyed by item index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticArgs(pub HashMap<usize, String>);

impl StaticArgs {
    pub fn insert(&mut self, item: usize, prefix: impl Into<String>) {
        self.0.insert(item, prefix.into());
    }

    pub fn get(&self, item: usize) -> Option<&str> {
        self.0.get(&item).map(String::as_str)
    }
}

/// Produces the per-step sent-values array.
pub struct UpdateSender<C> {
    dynamics: Vec<DynamicFn<C>>,
}

impl<C> UpdateSender<C> {
    /// Evaluate every distinct dynamic argument once, as a JSON array.
    pub fn send(&self, context: &C) -> String {
        let values: Vec<Value> = self.dynamics.iter().map(|f| f(context)).collect();
        Value::Array(values).to_string()
    }

    pub fn len(&self) -> usize {
        self.dynamics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dynamics.is_empty()
    }
}

/// The pair a compilation produces. Immutable once built.
pub struct CompiledUpdate<C> {
    sender: UpdateSender<C>,
    program: ReceiverProgram,
    receiver: String,
}

impl<C> CompiledUpdate<C> {
    pub fn sender(&self) -> &UpdateSender<C> {
        &self.sender
    }

    /// Receiver program text, sent to the peer in an update message.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn program(&self) -> &ReceiverProgram {
        &self.program
    }
}

/// Index of `key` in `table`, appending it if new.
fn intern(key: String, table: &mut HashMap<String, usize>) -> (usize, bool) {
    let next = table.len();
    match table.get(&key) {
        Some(&i) => (i, false),
        None => {
            table.insert(key, next);
            (next, true)
        }
    }
}

/// Merge `items` into one receiver program and one sender.
pub fn compile_update<C>(
    items: &[UpdateItem<C>],
    static_args: &StaticArgs,
    prelude: &[String],
) -> Result<CompiledUpdate<C>, CompileError> {
    let mut body_index = HashMap::new();
    let mut const_index = HashMap::new();
    let mut sent_index = HashMap::new();
    let mut bodies = Vec::new();
    let mut constants = Vec::new();
    let mut dynamics: Vec<DynamicFn<C>> = Vec::new();
    let mut calls = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let body_text = collapse_whitespace(item.producer.trim());
        if body_text.is_empty() {
            return Err(CompileError::EmptyProducer(i));
        }
        let (body, new_body) = intern(body_text.clone(), &mut body_index);
        if new_body {
            bodies.push(body_text);
        }

        let mut args = Vec::with_capacity(item.args.len());
        for arg in &item.args {
            match arg {
                ArgSpec::Const(value) => {
                    let (at, new) = intern(value.to_string(), &mut const_index);
                    if new {
                        constants.push(value.clone());
                    }
                    args.push(ArgRef::Const(at));
                }
                ArgSpec::Dynamic { key, eval } => {
                    let (at, new) = intern(key.clone(), &mut sent_index);
                    if new {
                        dynamics.push(Arc::clone(eval));
                    }
                    args.push(ArgRef::Sent(at));
                }
            }
        }

        calls.push(CallSite {
            body,
            prefix: static_args.get(i).map(str::to_string),
            args,
        });
    }

    let program = ReceiverProgram {
        version: PROGRAM_VERSION,
        prelude: prelude.iter().map(|p| collapse_whitespace(p)).collect(),
        bodies,
        constants,
        sent_count: dynamics.len(),
        calls,
    };
    let receiver = program.to_text();
    Ok(CompiledUpdate {
        sender: UpdateSender { dynamics },
        program,
        receiver,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ctx {
        frame: u64,
    }

    fn items() -> Vec<UpdateItem<Ctx>> {
        vec![
            UpdateItem::new(
                "image_rect",
                vec![
                    ArgSpec::constant(json!({"w": 8, "h": 8})),
                    ArgSpec::dynamic("frame", |c: &Ctx| json!(c.frame)),
                ],
            ),
            UpdateItem::new("audio", vec![ArgSpec::constant(2048), ArgSpec::constant(44100)]),
            UpdateItem::new(
                "image_rect",
                vec![
                    ArgSpec::constant(json!({"h": 8, "w": 8})),
                    ArgSpec::dynamic("frame", |c: &Ctx| json!(c.frame)),
                    ArgSpec::constant(2048),
                ],
            ),
        ]
    }

    #[test]
    fn test_deduplicates_constants_dynamics_and_bodies() {
        let mut statics = StaticArgs::default();
        statics.insert(0, "obs:0");
        statics.insert(2, "obs:1");
        let compiled = compile_update(&items(), &statics, &["obs  16".to_string()]).unwrap();
        let p = compiled.program();

        assert_eq!(p.bodies, vec!["image_rect", "audio"]);
        assert_eq!(p.constants, vec![json!({"w": 8, "h": 8}), json!(2048), json!(44100)]);
        assert_eq!(p.sent_count, 1);
        assert_eq!(p.prelude, vec!["obs 16"]);
        assert_eq!(p.calls[0].args, vec![ArgRef::Const(0), ArgRef::Sent(0)]);
        assert_eq!(p.calls[1].args, vec![ArgRef::Const(1), ArgRef::Const(2)]);
        assert_eq!(p.calls[2].body, 0);
        assert_eq!(
            p.calls[2].args,
            vec![ArgRef::Const(0), ArgRef::Sent(0), ArgRef::Const(1)]
        );
        assert_eq!(p.calls[1].prefix, None);
        assert_eq!(p.calls[2].prefix.as_deref(), Some("obs:1"));

        assert_eq!(compiled.sender().send(&Ctx { frame: 12 }), "[12]");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let a = compile_update(&items(), &StaticArgs::default(), &[]).unwrap();
        let b = compile_update(&items(), &StaticArgs::default(), &[]).unwrap();
        assert_eq!(a.receiver(), b.receiver());
        assert_eq!(a.program(), b.program());
    }

    #[test]
    fn test_receiver_text_parses_back() {
        let compiled = compile_update(&items(), &StaticArgs::default(), &[]).unwrap();
        let parsed = ReceiverProgram::parse(compiled.receiver()).unwrap();
        let sent = parsed.parse_sent(compiled.sender().send(&Ctx { frame: 3 }).as_bytes()).unwrap();
        assert_eq!(
            parsed.resolve_args(&parsed.calls[2], &sent),
            vec![json!({"w": 8, "h": 8}), json!(3), json!(2048)]
        );
    }

    #[test]
    fn test_empty_producer_rejected() {
        let items: Vec<UpdateItem<Ctx>> = vec![UpdateItem::new("  ", vec![])];
        assert!(matches!(
            compile_update(&items, &StaticArgs::default(), &[]),
            Err(CompileError::EmptyProducer(0))
        ));
    }
}
