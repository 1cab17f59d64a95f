// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The step loop, the stall watchdog and relaunching.
//!
//! Every step task holds a slot in `steps_now`. A step that starts while
//! there is room schedules its successor right away, so several steps overlap;
//! a step that ends as the last one in flight hands its slot straight to a new
//! step. While the stream is open and has agents, the count never reaches zero.

use super::{Binding, Stream, StreamShared};
use crate::errors::StreamError;
use crate::observability::messages::interface::InterfaceUnlinked;
use crate::observability::messages::stream::{
    RelaunchAttemptFailed, RelaunchExhausted, RelaunchSucceeded, StepFailed, StepLoopStarted,
    WatchdogStall,
};
use crate::observability::messages::StructuredLog;
use crate::traits::AgentViews;
use crate::utils::lock;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

fn has_agents(stream: &Stream) -> bool {
    stream.layout().bound.iter().any(|b| b.caps.agent)
}

fn loop_active(stream: &Stream) -> bool {
    !stream.is_closed() && has_agents(stream)
}

fn next_delay(stream: &Stream) -> Duration {
    let lowball = stream.settings().lowball;
    let delay = stream.period().as_secs_f64() * lowball;
    if delay.is_finite() && delay > 0.0 {
        Duration::from_secs_f64(delay)
    } else {
        Duration::ZERO
    }
}

pub(crate) fn log_step_failure(stream: &Stream, error: &dyn std::error::Error) {
    if !stream.is_relaunching() {
        StepFailed {
            stream_id: stream.id(),
            error,
        }
        .log();
    }
}

/// Start the loop if no step is in flight.
pub(crate) fn start_loop(stream: &Stream) {
    let started = stream
        .shared
        .steps_now
        .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
    if started {
        StepLoopStarted {
            stream_id: stream.id(),
            agents: stream.layout().bound.iter().filter(|b| b.caps.agent).count(),
        }
        .log();
        spawn_step(stream, Duration::ZERO);
    }
}

/// Run one step after `delay`, in a slot the caller already counted.
fn spawn_step(stream: &Stream, delay: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        stream.shared.steps_now.fetch_sub(1, Ordering::AcqRel);
        return;
    };
    let weak: Weak<StreamShared> = Arc::downgrade(&stream.shared);
    runtime.spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(shared) = weak.upgrade() {
            step(Stream { shared }).await;
        }
    });
}

/// Releases a step's slot, or passes it on when this was the last step.
struct StepGuard {
    stream: Stream,
}

impl Drop for StepGuard {
    fn drop(&mut self) {
        let steps_now = &self.stream.shared.steps_now;
        loop {
            let current = steps_now.load(Ordering::Acquire);
            if current <= 1 && loop_active(&self.stream) {
                spawn_step(&self.stream, next_delay(&self.stream));
                return;
            }
            if steps_now
                .compare_exchange(
                    current,
                    current.saturating_sub(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Read, think, write.
async fn step(stream: Stream) {
    let _slot = StepGuard {
        stream: stream.clone(),
    };
    if stream.is_closed() {
        return;
    }
    relaunch_if_needed(&stream);

    let layout = stream.layout();
    let agents: Vec<Binding> = layout
        .bound
        .iter()
        .filter(|b| b.caps.agent)
        .cloned()
        .collect();
    if agents.is_empty() {
        return;
    }

    let cap = stream.settings().simultaneous_steps;
    let reserved = stream
        .shared
        .steps_now
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < cap).then_some(n + 1)
        })
        .is_ok();
    if reserved {
        spawn_step(&stream, next_delay(&stream));
    }

    stream.read_hooks(&layout).await;

    let thinking: Vec<Binding> = agents
        .into_iter()
        .filter(|a| !stream.is_unlinking(a))
        .collect();
    let mut tasks = Vec::with_capacity(thinking.len());
    for agent in &thinking {
        let s = stream.clone();
        let b = agent.clone();
        tasks.push((
            agent.name.clone(),
            tokio::spawn(async move {
                let views = AgentViews {
                    obs: b.obs.clone(),
                    pred: b.pred.clone(),
                    act: b.act.clone(),
                };
                b.interface.agent(&s, views).await
            }),
        ));
    }
    let results = stream.join_hooks("agent", tasks).await;
    for (agent, result) in thinking.iter().zip(results) {
        let reason = match result {
            Some(true) => continue,
            Some(false) => "agent returned false",
            None => "agent failed",
        };
        InterfaceUnlinked {
            stream_id: stream.id(),
            interface: &agent.name,
            reason,
        }
        .log();
        stream.mark_unlink(agent);
    }

    if !stream.is_closed() && layout.writes > 0 {
        stream.write_hooks(&layout).await;
    }
    stream.unlink_pending().await;

    let now = Instant::now();
    let elapsed = {
        let mut last = lock(&stream.shared.last_step_end);
        let elapsed = now.saturating_duration_since(*last);
        *last = now;
        elapsed
    };
    lock(&stream.shared.period).update(elapsed.as_secs_f64() * 1000.0);
}

pub(crate) fn spawn_watchdog(stream: &Stream) {
    let weak = Arc::downgrade(&stream.shared);
    let token = stream.shared.watchdog.clone();
    let every = stream
        .settings()
        .watchdog_interval()
        .max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(shared) = weak.upgrade() else {
                break;
            };
            check_stall(&Stream { shared });
        }
    });
}

fn check_stall(stream: &Stream) {
    if !loop_active(stream) {
        return;
    }
    let stall_timeout = stream.settings().stall_timeout();
    let since_last_step = lock(&stream.shared.last_step_end).elapsed();
    if since_last_step < stall_timeout {
        return;
    }
    WatchdogStall {
        stream_id: stream.id(),
        since_last_step,
        stall_timeout,
    }
    .log();

    let stream = stream.clone();
    tokio::spawn(async move {
        // Failures are logged by the relaunch itself.
        let _ = relaunch_retrying(&stream).await;
        start_loop(&stream);
    });
}

/// Kick off a background relaunch if the external resource is gone.
pub(crate) fn relaunch_if_needed(stream: &Stream) {
    let Some(relauncher) = &stream.shared.relauncher else {
        return;
    };
    if stream.is_closed() || relauncher.is_connected() {
        return;
    }
    if stream.shared.relaunching.swap(true, Ordering::AcqRel) {
        return;
    }
    let stream = stream.clone();
    tokio::spawn(async move {
        let _ = relaunch_retrying(&stream).await;
    });
}

pub(crate) async fn relaunch_retrying(stream: &Stream) -> Result<(), StreamError> {
    let Some(relauncher) = stream.shared.relauncher.clone() else {
        return Ok(());
    };
    let _serial = stream.shared.relaunch_lock.lock().await;
    stream.shared.relaunching.store(true, Ordering::Release);

    let attempts = stream.settings().max_relaunch_attempts.max(1);
    let mut attempt = 1;
    let result = loop {
        if stream.is_closed() {
            break Err(StreamError::Closed);
        }
        match relauncher.relaunch(stream).await {
            Ok(()) => {
                RelaunchSucceeded {
                    stream_id: stream.id(),
                    attempt,
                }
                .log();
                stream.go_home().await;
                break Ok(());
            }
            Err(error) if attempt < attempts => {
                RelaunchAttemptFailed {
                    stream_id: stream.id(),
                    attempt,
                    max_attempts: attempts,
                    error: &error,
                }
                .log();
                attempt += 1;
            }
            Err(error) => {
                RelaunchExhausted {
                    stream_id: stream.id(),
                    attempts,
                    error: &error,
                }
                .log();
                relauncher.teardown().await;
                break Err(StreamError::RelaunchFailed {
                    attempts,
                    source: error,
                });
            }
        }
    };

    *lock(&stream.shared.last_step_end) = Instant::now();
    stream.shared.relaunching.store(false, Ordering::Release);
    result
}
