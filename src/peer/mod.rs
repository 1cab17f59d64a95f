// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The responding side of a capture link.
//!
//! [`PeerRuntime::serve`] accepts a handshake, loads every receiver program it
//! is sent, and answers each step with freshly produced observations. Each
//! call of the program runs one [`Producer`] from the registry; calls with an
//! `obs:k` prefix own slice `k` of the observation array, as declared by the
//! program's `obs_slice` prelude statements.

mod producers;

pub use producers::{AudioProducer, ImageRectProducer, Producer, ProducerRegistry};

use crate::channel::{Channel, MessageChannel};
use crate::codec::IntFormat;
use crate::compiler::ReceiverProgram;
use crate::errors::{CompileError, ProtocolError};
use crate::observability::messages::protocol::{PeerDisconnected, UpdateProgram};
use crate::observability::messages::StructuredLog;
use crate::stream::Stream;
use crate::traits::{CaptureBackend, PeerConnector};
use crate::wire::{InitiatorMessage, Responder};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const ROLE: &str = "peer";

/// A receiver program with its prelude resolved against a registry.
struct LoadedProgram {
    program: ReceiverProgram,
    obs_len: usize,
    slices: Vec<(usize, usize)>,
    producers: Vec<Option<Arc<dyn Producer>>>,
}

fn prelude_number(statement: &str, word: &str) -> Result<usize, CompileError> {
    word.parse()
        .map_err(|_| CompileError::BadPrelude(statement.to_string()))
}

/// Reject an observation region the responder could never send back.
fn within_payload(
    field: &'static str,
    len: usize,
    format: IntFormat,
    max_payload: usize,
) -> Result<(), ProtocolError> {
    let bytes = (len as u64).saturating_mul(format.bytes_per_element() as u64);
    if bytes > max_payload as u64 {
        return Err(ProtocolError::PayloadTooLarge {
            field,
            length: bytes,
            max: max_payload,
        });
    }
    Ok(())
}

impl LoadedProgram {
    fn load(
        program: ReceiverProgram,
        registry: &ProducerRegistry,
        format: IntFormat,
        max_payload: usize,
    ) -> Result<Self, ProtocolError> {
        let mut obs_len = 0;
        let mut slices = Vec::new();
        for statement in &program.prelude {
            let words: Vec<&str> = statement.split_whitespace().collect();
            match words.as_slice() {
                ["obs", len] => obs_len = prelude_number(statement, len)?,
                ["obs_slice", offset, len] => slices.push((
                    prelude_number(statement, offset)?,
                    prelude_number(statement, len)?,
                )),
                _ => return Err(CompileError::BadPrelude(statement.clone()).into()),
            }
        }
        within_payload("observation", obs_len, format, max_payload)?;
        for &(offset, len) in &slices {
            within_payload("observation slice", len, format, max_payload)?;
            if offset.saturating_add(len) > obs_len {
                return Err(CompileError::BadPrelude(format!(
                    "obs_slice outside of obs {}",
                    obs_len
                ))
                .into());
            }
        }
        let producers = program.bodies.iter().map(|b| registry.get(b)).collect();
        Ok(Self {
            program,
            obs_len,
            slices,
            producers,
        })
    }

    fn slice_for(&self, prefix: Option<&str>) -> Option<(usize, usize)> {
        let k: usize = prefix?.strip_prefix("obs:")?.parse().ok()?;
        self.slices.get(k).copied()
    }
}

/// Runs receiver programs against a capture backend.
pub struct PeerRuntime {
    capture: Arc<dyn CaptureBackend>,
    registry: ProducerRegistry,
}

impl PeerRuntime {
    /// A runtime with the built-in producers.
    pub fn new(capture: Arc<dyn CaptureBackend>) -> Self {
        Self::with_registry(capture, ProducerRegistry::with_builtins())
    }

    pub fn with_registry(capture: Arc<dyn CaptureBackend>, registry: ProducerRegistry) -> Self {
        Self { capture, registry }
    }

    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    /// Serve one connection until the initiator goes away.
    ///
    /// Returns `Ok` when the channel closes and the error when the initiator
    /// violates the protocol (the channel is closed in that case too).
    pub async fn serve(
        &self,
        channel: Arc<dyn Channel>,
        max_payload: usize,
    ) -> Result<(), ProtocolError> {
        let accepted = if channel.is_message_oriented() {
            Responder::accept_with_bootstrap(channel, max_payload)
                .await
                .map(|(responder, _)| responder)
        } else {
            Responder::accept(channel, max_payload).await
        };
        let mut responder = match accepted {
            Ok(responder) => responder,
            Err(e) if e.is_closed() => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut loaded: Option<LoadedProgram> = None;
        let mut obs: Vec<f32> = Vec::new();
        loop {
            let message = match responder.recv().await {
                Ok(message) => message,
                Err(e) if e.is_closed() => return Ok(()),
                Err(e) => return Err(e),
            };
            match message {
                InitiatorMessage::Update(text) => {
                    let program = ReceiverProgram::parse(&text)
                        .map_err(ProtocolError::from)
                        .and_then(|p| {
                            LoadedProgram::load(
                                p,
                                &self.registry,
                                responder.format(),
                                responder.max_payload(),
                            )
                        });
                    match program {
                        Ok(program) => {
                            UpdateProgram {
                                role: ROLE,
                                calls: program.program.calls.len(),
                                constants: program.program.constants.len(),
                                bytes: text.len(),
                            }
                            .log();
                            obs = vec![f32::NAN; program.obs_len];
                            loaded = Some(program);
                        }
                        Err(error) => {
                            responder.fail(&error).await;
                            return Err(error);
                        }
                    }
                }
                InitiatorMessage::Step(step) => {
                    let Some(program) = &loaded else {
                        let error = ProtocolError::NoProgram;
                        responder.fail(&error).await;
                        return Err(error);
                    };
                    let sent = match program.program.sent_from_value(step.side_channel) {
                        Ok(sent) => sent,
                        Err(e) => {
                            let error = ProtocolError::from(e);
                            responder.fail(&error).await;
                            return Err(error);
                        }
                    };
                    obs.fill(f32::NAN);
                    let results = self.run(program, &sent, &mut obs).await;
                    let side = serde_json::to_vec(&results).unwrap_or_default();
                    match responder.send_observation(&obs, &side).await {
                        Ok(()) => {}
                        Err(e) if e.is_closed() => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Run every call concurrently and settle them in call order.
    async fn run(&self, program: &LoadedProgram, sent: &[Value], obs: &mut [f32]) -> Value {
        let mut tasks = Vec::with_capacity(program.program.calls.len());
        for call in &program.program.calls {
            let args = program.program.resolve_args(call, sent);
            let region = program.slice_for(call.prefix.as_deref());
            let len = region.map_or(0, |(_, len)| len);
            let producer = program.producers.get(call.body).cloned().flatten();
            let body = program
                .program
                .bodies
                .get(call.body)
                .cloned()
                .unwrap_or_default();
            let capture = Arc::clone(&self.capture);
            tasks.push((
                region,
                tokio::spawn(async move {
                    let mut out = vec![f32::NAN; len];
                    let result = match producer {
                        Some(producer) => producer.produce(capture.as_ref(), &mut out, &args).await,
                        None => Err(anyhow::anyhow!("unknown producer '{}'", body)),
                    };
                    (out, result)
                }),
            ));
        }

        let mut settled = Vec::with_capacity(tasks.len());
        for (region, task) in tasks {
            match task.await {
                Ok((out, result)) => {
                    if let Some((offset, len)) = region {
                        obs[offset..offset + len].copy_from_slice(&out);
                    }
                    settled.push(match result {
                        Ok(value) => json!({ "status": "fulfilled", "value": value }),
                        Err(e) => json!({ "status": "rejected", "reason": e.to_string() }),
                    });
                }
                Err(join_error) => settled.push(json!({
                    "status": "rejected",
                    "reason": join_error.to_string(),
                })),
            }
        }
        Value::Array(settled)
    }
}

/// Connects streams to a [`PeerRuntime`] running in this process.
pub struct LocalPeerConnector {
    runtime: Arc<PeerRuntime>,
    max_payload: usize,
}

impl LocalPeerConnector {
    pub fn new(runtime: Arc<PeerRuntime>, max_payload: usize) -> Self {
        Self {
            runtime,
            max_payload,
        }
    }
}

#[async_trait]
impl PeerConnector for LocalPeerConnector {
    async fn connect(&self, stream: &Stream) -> anyhow::Result<Arc<dyn Channel>> {
        let (near, far) = MessageChannel::pair();
        let runtime = Arc::clone(&self.runtime);
        let max_payload = self.max_payload;
        let stream_id = stream.id();
        tokio::spawn(async move {
            if let Err(error) = runtime.serve(Arc::new(far), max_payload).await {
                PeerDisconnected {
                    stream_id,
                    error: &error,
                }
                .log();
            }
        });
        Ok(Arc::new(near))
    }
}

#[cfg(test)]
mod tests {
    use super::producers::tests::FakeCapture;
    use super::*;
    use crate::codec::{EncodedArray, IntFormat};
    use crate::compiler::{compile_update, ArgSpec, StaticArgs, UpdateItem};
    use crate::wire::{Bootstrap, CaptureConfig, Initiator};

    async fn served() -> (Initiator, tokio::task::JoinHandle<Result<(), ProtocolError>>) {
        let (a, b) = MessageChannel::pair();
        let runtime = PeerRuntime::new(Arc::new(FakeCapture));
        let server = tokio::spawn(async move { runtime.serve(Arc::new(b), 1 << 20).await });
        let boot = Bootstrap::new(CaptureConfig { width: 2, height: 1 }, 1 << 20);
        let initiator = Initiator::connect(Arc::new(a), IntFormat::F32, 1 << 20, Some(&boot))
            .await
            .unwrap();
        (initiator, server)
    }

    fn program(items: &[UpdateItem<()>], statics: &StaticArgs, prelude: &[&str]) -> String {
        let prelude: Vec<String> = prelude.iter().map(|s| s.to_string()).collect();
        compile_update(items, statics, &prelude)
            .unwrap()
            .receiver()
            .to_string()
    }

    #[tokio::test]
    async fn test_step_fills_declared_slices() {
        let (mut initiator, server) = served().await;
        let items = vec![
            UpdateItem::new(
                "image_rect",
                vec![ArgSpec::constant(json!({"width": 1, "height": 1}))],
            ),
            UpdateItem::new(
                "audio",
                vec![ArgSpec::constant(json!({"samples": 2, "sample_rate": 8000}))],
            ),
        ];
        let mut statics = StaticArgs::default();
        statics.insert(0, "obs:0");
        statics.insert(1, "obs:1");
        let text = program(&items, &statics, &["obs 6", "obs_slice 0 3", "obs_slice 3 2"]);

        initiator.send_update(&text).await.unwrap();
        initiator.send_step(&[], &[], b"[]").await.unwrap();
        let reply = initiator.reply_reader().read_reply().await.unwrap();

        match reply.observation {
            EncodedArray::F32(values) => {
                assert_eq!(values.len(), 6);
                assert_eq!(values[2], 1.0);
                assert_eq!(&values[3..5], &[0.0, 0.5]);
                assert!(values[5].is_nan());
            }
            other => panic!("expected f32 observations, got {:?}", other),
        }
        assert_eq!(
            reply.side_channel,
            Some(json!([
                {"status": "fulfilled", "value": {"width": 1, "height": 1}},
                {"status": "fulfilled", "value": 2},
            ]))
        );

        initiator.close().await;
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_producer_is_rejected_not_fatal() {
        let (mut initiator, server) = served().await;
        let items = vec![UpdateItem::new(
            "teleport",
            vec![ArgSpec::dynamic("where", |_: &()| json!("moon"))],
        )];
        initiator
            .send_update(&program(&items, &StaticArgs::default(), &[]))
            .await
            .unwrap();
        initiator.send_step(&[], &[], br#"["moon"]"#).await.unwrap();

        let reply = initiator.reply_reader().read_reply().await.unwrap();
        assert!(reply.observation.is_empty());
        let side = reply.side_channel.unwrap();
        assert_eq!(side[0]["status"], "rejected");
        assert_eq!(side[0]["reason"], "unknown producer 'teleport'");

        initiator.close().await;
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_step_before_update_fails() {
        let (mut initiator, server) = served().await;
        initiator.send_step(&[], &[], b"").await.unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(ProtocolError::NoProgram)
        ));
        assert!(initiator.channel().is_closed());
    }

    #[tokio::test]
    async fn test_bad_prelude_fails() {
        let (mut initiator, server) = served().await;
        let text = program(&[], &StaticArgs::default(), &["obs 2", "obs_slice 1 4"]);
        initiator.send_update(&text).await.unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(ProtocolError::Program(CompileError::BadPrelude(_)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_obs_prelude_is_rejected() {
        let (mut initiator, server) = served().await;
        let text = program(&[], &StaticArgs::default(), &["obs 4611686018427387903"]);
        initiator.send_update(&text).await.unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(ProtocolError::PayloadTooLarge { field: "observation", .. })
        ));
        assert!(initiator.channel().is_closed());
    }

    #[test]
    fn test_observation_larger_than_payload_is_rejected() {
        let text = program(&[], &StaticArgs::default(), &["obs 4", "obs_slice 0 4"]);
        let parsed = ReceiverProgram::parse(&text).unwrap();
        let result = LoadedProgram::load(parsed, &ProducerRegistry::new(), IntFormat::F32, 8);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { max: 8, .. })
        ));
    }

    #[test]
    fn test_slice_for_parses_prefix() {
        let program = ReceiverProgram::parse(&program(
            &[],
            &StaticArgs::default(),
            &["obs 4", "obs_slice 1 2"],
        ))
        .unwrap();
        let loaded =
            LoadedProgram::load(program, &ProducerRegistry::new(), IntFormat::F32, 64).unwrap();
        assert_eq!(loaded.obs_len, 4);
        assert_eq!(loaded.slice_for(Some("obs:0")), Some((1, 2)));
        assert_eq!(loaded.slice_for(Some("obs:1")), None);
        assert_eq!(loaded.slice_for(Some("rgb")), None);
        assert_eq!(loaded.slice_for(None), None);
    }
}
