// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The coordinating end of a stream's capture link.
//!
//! [`CaptureLink`] owns the connection to the stream's peer. Each read it
//! connects if needed, sends an update whenever the stream's layout changed,
//! sends a step, and copies the last observation the peer answered with into
//! the regions of every interface that declared an observer. Observations
//! therefore lag one step behind.

use crate::codec::{decode, IntFormat};
use crate::compiler::{compile_update, CompiledUpdate, StaticArgs, UpdateItem};
use crate::config::ProtocolSettings;
use crate::observability::messages::interface::HookFailed;
use crate::observability::messages::protocol::{PeerConnected, PeerDisconnected};
use crate::observability::messages::StructuredLog;
use crate::stream::{Binding, End, Stream, View};
use crate::traits::{Capabilities, Interface, PeerConnector};
use crate::utils::lock;
use crate::wire::{Bootstrap, CaptureConfig, Initiator, ReplyReader};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Interfaces whose observer made it into the current program, in call order.
#[derive(Default)]
struct Observers {
    regions: Vec<(usize, usize)>,
    /// `Some` for interfaces that want their call's settled result.
    listeners: Vec<Option<(String, Arc<dyn Interface>)>>,
}

struct Program {
    layout_id: u64,
    compiled: CompiledUpdate<Stream>,
}

/// Counts steps so replies can be matched to the program that produced them.
///
/// The peer answers steps in order, so reply `n` belongs to step `n`. Replies
/// to steps sent before the latest update carry the old layout.
#[derive(Default)]
struct StepLedger {
    sent: AtomicU64,
    program_start: AtomicU64,
}

impl StepLedger {
    fn step_sent(&self) {
        self.sent.fetch_add(1, Ordering::AcqRel);
    }

    fn program_changed(&self) {
        self.program_start
            .store(self.sent.load(Ordering::Acquire), Ordering::Release);
    }

    /// Whether the `n`-th reply (counting from 1) answers the current program.
    fn is_current(&self, n: u64) -> bool {
        n > self.program_start.load(Ordering::Acquire)
    }
}

/// A live connection. Dropped whenever anything on it fails.
struct Spot {
    initiator: Initiator,
    alive: Arc<AtomicBool>,
    ledger: Arc<StepLedger>,
    program: Option<Program>,
}

/// Connects a stream to its peer and relays observations back.
pub struct CaptureLink {
    connector: Arc<dyn PeerConnector>,
    format: IntFormat,
    max_payload: usize,
    spot: tokio::sync::Mutex<Option<Spot>>,
    last: Arc<Mutex<Option<Vec<f32>>>>,
    observers: Arc<Mutex<Arc<Observers>>>,
}

impl CaptureLink {
    pub fn new(connector: Arc<dyn PeerConnector>, settings: &ProtocolSettings) -> Self {
        Self {
            connector,
            format: settings.int_format,
            max_payload: settings.max_payload_bytes,
            spot: tokio::sync::Mutex::new(None),
            last: Arc::new(Mutex::new(None)),
            observers: Arc::new(Mutex::new(Arc::new(Observers::default()))),
        }
    }

    /// Whether a connection is currently up.
    pub async fn is_connected(&self) -> bool {
        self.spot
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }

    async fn connect(&self, stream: &Stream) -> anyhow::Result<Spot> {
        let channel = self.connector.connect(stream).await?;
        let settings = stream.settings();
        let bootstrap = Bootstrap::new(
            CaptureConfig {
                width: settings.width,
                height: settings.height,
            },
            self.max_payload,
        );
        let initiator =
            Initiator::connect(channel, self.format, self.max_payload, Some(&bootstrap)).await?;
        PeerConnected {
            stream_id: stream.id(),
            format: self.format,
        }
        .log();

        let alive = Arc::new(AtomicBool::new(true));
        let ledger = Arc::new(StepLedger::default());
        tokio::spawn(relay_replies(
            stream.clone(),
            initiator.reply_reader(),
            Arc::clone(&alive),
            Arc::clone(&ledger),
            Arc::clone(&self.last),
            Arc::clone(&self.observers),
        ));
        Ok(Spot {
            initiator,
            alive,
            ledger,
            program: None,
        })
    }

    /// Compile every bound observer into one program over the stream's
    /// current observation buffer.
    fn compile(&self, stream: &Stream) -> anyhow::Result<(Program, Observers)> {
        let mut items: Vec<UpdateItem<Stream>> = Vec::new();
        let mut statics = StaticArgs::default();
        let mut prelude = vec![format!("obs {}", stream.reads())];
        let mut observers = Observers::default();

        for binding in stream.bindings() {
            let Some(item) = observer_of(&binding) else {
                continue;
            };
            let k = observers.regions.len();
            statics.insert(items.len(), format!("obs:{}", k));
            prelude.push(format!("obs_slice {} {}", binding.obs.offset(), binding.obs.len()));
            observers
                .regions
                .push((binding.obs.offset(), binding.obs.len()));
            observers.listeners.push(
                binding
                    .caps
                    .peer_result
                    .then(|| (binding.name.clone(), Arc::clone(&binding.interface))),
            );
            items.push(item);
        }

        let compiled = compile_update(&items, &statics, &prelude)?;
        Ok((
            Program {
                layout_id: stream.layout_id(),
                compiled,
            },
            observers,
        ))
    }

    async fn exchange(&self, stream: &Stream, spot: &mut Spot) -> anyhow::Result<()> {
        let layout_id = stream.layout_id();
        if spot.program.as_ref().map(|p| p.layout_id) != Some(layout_id) {
            let (program, observers) = self.compile(stream)?;
            spot.ledger.program_changed();
            spot.initiator
                .send_update(program.compiled.receiver())
                .await?;
            *lock(&self.observers) = Arc::new(observers);
            *lock(&self.last) = None;
            spot.program = Some(program);
        }
        let Some(program) = &spot.program else {
            return Ok(());
        };

        let sent = program.compiled.sender().send(stream);
        let pool = stream.pool();
        let mut pred = pool.acquire(stream.reads());
        let mut act = pool.acquire(stream.writes());
        stream.predictions().copy_to(&mut pred);
        stream.actions().copy_to(&mut act);
        spot.ledger.step_sent();
        let result = spot
            .initiator
            .send_step(&pred, &act, sent.as_bytes())
            .await;
        pool.release(pred);
        pool.release(act);
        result?;
        Ok(())
    }

    /// Copy the last observation into every observer region it still fits.
    fn fill(&self, obs: &View) {
        let Some(last) = lock(&self.last).clone() else {
            return;
        };
        let observers = Arc::clone(&lock(&self.observers));
        obs.with_mut(|o| {
            for &(offset, len) in &observers.regions {
                let end = offset + len;
                if end <= o.len() && end <= last.len() {
                    o[offset..end].copy_from_slice(&last[offset..end]);
                }
            }
        });
    }
}

fn observer_of(binding: &Binding) -> Option<UpdateItem<Stream>> {
    if binding.caps.peer_code {
        binding.interface.observer()
    } else {
        None
    }
}

/// Decode replies until the connection fails, keeping the newest observation
/// and handing each call's settled result to its interface. Replies to an
/// earlier program are dropped.
async fn relay_replies(
    stream: Stream,
    mut reader: ReplyReader,
    alive: Arc<AtomicBool>,
    ledger: Arc<StepLedger>,
    last: Arc<Mutex<Option<Vec<f32>>>>,
    observers: Arc<Mutex<Arc<Observers>>>,
) {
    let mut received: u64 = 0;
    loop {
        let reply = match reader.read_reply().await {
            Ok(reply) => reply,
            Err(error) => {
                alive.store(false, Ordering::Release);
                if !error.is_closed() {
                    PeerDisconnected {
                        stream_id: stream.id(),
                        error: &error,
                    }
                    .log();
                }
                return;
            }
        };
        received += 1;
        if !ledger.is_current(received) {
            continue;
        }

        if let Some(Value::Array(results)) = &reply.side_channel {
            let current = Arc::clone(&lock(&observers));
            for (listener, result) in current.listeners.iter().zip(results) {
                let Some((name, interface)) = listener else {
                    continue;
                };
                if let Err(error) = interface.on_peer_result(&stream, result).await {
                    HookFailed {
                        stream_id: stream.id(),
                        interface: name,
                        hook: "on_peer_result",
                        error: &error,
                    }
                    .log();
                }
            }
        }

        let mut values = vec![f32::NAN; reply.observation.len()];
        decode(&reply.observation, &mut values);
        *lock(&last) = Some(values);
    }
}

#[async_trait]
impl Interface for CaptureLink {
    fn name(&self) -> &str {
        "capture_link"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reads: true,
            lifecycle: true,
            ..Capabilities::default()
        }
    }

    async fn read(&self, stream: &Stream, obs: View, end: End) -> anyhow::Result<()> {
        let mut guard = self.spot.lock().await;
        if guard
            .as_ref()
            .is_some_and(|s| !s.alive.load(Ordering::Acquire))
        {
            if let Some(dead) = guard.take() {
                dead.initiator.close().await;
            }
        }
        if guard.is_none() {
            *guard = Some(self.connect(stream).await?);
        }
        let Some(spot) = guard.as_mut() else {
            return Ok(());
        };

        if let Err(error) = self.exchange(stream, spot).await {
            if let Some(spot) = guard.take() {
                spot.alive.store(false, Ordering::Release);
                spot.initiator.close().await;
            }
            PeerDisconnected {
                stream_id: stream.id(),
                error: &error,
            }
            .log();
            return Err(error);
        }
        drop(guard);

        self.fill(&obs);
        end.fire();
        Ok(())
    }

    async fn deinit(&self, _stream: &Stream) -> anyhow::Result<()> {
        if let Some(spot) = self.spot.lock().await.take() {
            spot.alive.store(false, Ordering::Release);
            spot.initiator.close().await;
        }
        *lock(&self.last) = None;
        Ok(())
    }
}
