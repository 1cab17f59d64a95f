// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The stream: an interface set laid out over three float buffers and driven
//! by a self-pacing read/think/write loop.
//!
//! Observations are filled by reader interfaces, agents turn observations into
//! predictions and actions, and writer interfaces act on the result. The loop
//! keeps up to `simultaneous_steps` steps in flight, scheduling the next one
//! after `period * lowball`, where `period` is the measured time between steps.
//!
//! ```rust,no_run
//! use sensorium::interfaces::{Loopback, RandomAgent};
//! use sensorium::stream::StreamBuilder;
//! use sensorium::traits::Interface;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), sensorium::errors::StreamError> {
//! let loopback: Arc<dyn Interface> = Arc::new(Loopback::new(4));
//! let agent: Arc<dyn Interface> = Arc::new(RandomAgent::new(0.0));
//! let stream = StreamBuilder::new()
//!     .interfaces(vec![loopback, agent])
//!     .open()
//!     .await?;
//! let observations = stream.read().await?;
//! stream.write(&vec![0.0; stream.writes()]).await?;
//! stream.close().await;
//! # Ok(())
//! # }
//! ```

mod layout;
mod pool;
mod step;
mod view;

#[cfg(test)]
mod integration_tests;

pub use layout::{Binding, InterfaceTree};
pub use pool::ScratchPool;
pub use view::{End, View};

use crate::config::StreamSettings;
use crate::errors::StreamError;
use crate::observability::messages::interface::HookFailed;
use crate::observability::messages::stream::{
    StreamClosed, StreamOpened, StreamRelinked, StreamResized,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{Interface, PageDriver, Relauncher};
use crate::utils::stats::RunningStats;
use crate::utils::{lock, read, write};
use layout::{identity, Layout};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use view::EndGroup;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Ready,
    Relaunching,
    Closed,
}

pub(crate) struct StreamShared {
    id: u64,
    settings: RwLock<StreamSettings>,
    layout: RwLock<Arc<Layout>>,
    /// Interfaces as last passed to relink, in the order given.
    own: Mutex<Vec<Arc<dyn Interface>>>,
    size_request: Mutex<Option<(usize, usize)>>,
    scripts: Mutex<Vec<String>>,
    next_layout_id: AtomicU64,
    relink_lock: tokio::sync::Mutex<()>,
    relaunch_lock: tokio::sync::Mutex<()>,
    state: Mutex<StreamState>,
    relaunching: AtomicBool,
    steps_now: AtomicUsize,
    period: Mutex<RunningStats>,
    last_step_end: Mutex<Instant>,
    pending_unlink: Mutex<HashSet<usize>>,
    unlink: Mutex<Vec<Arc<dyn Interface>>>,
    watchdog: CancellationToken,
    relauncher: Option<Arc<dyn Relauncher>>,
    driver: Option<Arc<dyn PageDriver>>,
    pool: Arc<ScratchPool>,
}

/// A handle on one stream. Clones share the stream.
#[derive(Clone)]
pub struct Stream {
    shared: Arc<StreamShared>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish()
    }
}

/// Configures and opens a [`Stream`].
pub struct StreamBuilder {
    settings: StreamSettings,
    interfaces: Vec<InterfaceTree>,
    relauncher: Option<Arc<dyn Relauncher>>,
    driver: Option<Arc<dyn PageDriver>>,
    pool: Option<Arc<ScratchPool>>,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self {
            settings: StreamSettings::default(),
            interfaces: Vec::new(),
            relauncher: None,
            driver: None,
            pool: None,
        }
    }

    pub fn settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn interface(mut self, interface: impl Into<InterfaceTree>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn interfaces(mut self, interfaces: Vec<Arc<dyn Interface>>) -> Self {
        self.interfaces.push(interfaces.into());
        self
    }

    pub fn relauncher(mut self, relauncher: Arc<dyn Relauncher>) -> Self {
        self.relauncher = Some(relauncher);
        self
    }

    pub fn page_driver(mut self, driver: Arc<dyn PageDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn pool(mut self, pool: Arc<ScratchPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Launch the external resource (if any), bind the interfaces, and start
    /// the watchdog. The step loop starts as soon as an agent is bound.
    pub async fn open(self) -> Result<Stream, StreamError> {
        let stream = Stream {
            shared: Arc::new(StreamShared {
                id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
                settings: RwLock::new(self.settings),
                layout: RwLock::new(Arc::new(Layout::empty(0))),
                own: Mutex::new(Vec::new()),
                size_request: Mutex::new(None),
                scripts: Mutex::new(Vec::new()),
                next_layout_id: AtomicU64::new(1),
                relink_lock: tokio::sync::Mutex::new(()),
                relaunch_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(StreamState::Opening),
                relaunching: AtomicBool::new(false),
                steps_now: AtomicUsize::new(0),
                period: Mutex::new(RunningStats::default()),
                last_step_end: Mutex::new(Instant::now()),
                pending_unlink: Mutex::new(HashSet::new()),
                unlink: Mutex::new(Vec::new()),
                watchdog: CancellationToken::new(),
                relauncher: self.relauncher,
                driver: self.driver,
                pool: self.pool.unwrap_or_else(ScratchPool::shared),
            }),
        };

        let opened = async {
            stream.relaunch().await?;
            stream.relink(InterfaceTree::Group(self.interfaces)).await
        }
        .await;
        if let Err(e) = opened {
            stream.close().await;
            return Err(e);
        }

        {
            let mut state = lock(&stream.shared.state);
            if *state == StreamState::Closed {
                return Err(StreamError::Closed);
            }
            *state = StreamState::Ready;
        }
        *lock(&stream.shared.last_step_end) = Instant::now();
        step::spawn_watchdog(&stream);

        let layout = stream.layout();
        StreamOpened {
            stream_id: stream.id(),
            interfaces: layout.bound.len(),
            reads: layout.reads,
            writes: layout.writes,
        }
        .log();
        Ok(stream)
    }
}

impl Stream {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current settings, including every bound interface's overrides.
    pub fn settings(&self) -> StreamSettings {
        read(&self.shared.settings).clone()
    }

    pub fn state(&self) -> StreamState {
        let state = *lock(&self.shared.state);
        if state != StreamState::Closed && self.is_relaunching() {
            StreamState::Relaunching
        } else {
            state
        }
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.shared.state) == StreamState::Closed
    }

    pub(crate) fn is_relaunching(&self) -> bool {
        self.shared.relaunching.load(Ordering::Acquire)
    }

    pub(crate) fn layout(&self) -> Arc<Layout> {
        Arc::clone(&read(&self.shared.layout))
    }

    pub fn reads(&self) -> usize {
        self.layout().reads
    }

    pub fn writes(&self) -> usize {
        self.layout().writes
    }

    /// Changes whenever relink or resize replaces the buffers.
    pub fn layout_id(&self) -> u64 {
        self.layout().id
    }

    /// Every bound interface in buffer order, with its regions.
    pub fn bindings(&self) -> Vec<Binding> {
        self.layout().bound.clone()
    }

    /// The interfaces last passed to relink.
    pub fn interfaces(&self) -> Vec<Arc<dyn Interface>> {
        lock(&self.shared.own).clone()
    }

    pub fn observations(&self) -> View {
        self.layout().obs.clone()
    }

    pub fn predictions(&self) -> View {
        self.layout().pred.clone()
    }

    pub fn actions(&self) -> View {
        self.layout().act.clone()
    }

    /// Estimated time between consecutive steps.
    pub fn period(&self) -> Duration {
        let ms = lock(&self.shared.period).mean();
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    pub fn pool(&self) -> &Arc<ScratchPool> {
        &self.shared.pool
    }

    pub fn page_driver(&self) -> Option<Arc<dyn PageDriver>> {
        self.shared.driver.clone()
    }

    /// Steps currently in flight.
    pub fn steps_in_flight(&self) -> usize {
        self.shared.steps_now.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.is_closed() {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_unlinking(&self, binding: &Binding) -> bool {
        lock(&self.shared.pending_unlink).contains(&binding.key())
    }

    /// Await every hook task in order, logging failures and panics.
    pub(crate) async fn join_hooks<T>(
        &self,
        hook: &str,
        tasks: Vec<(String, JoinHandle<anyhow::Result<T>>)>,
    ) -> Vec<Option<T>> {
        let mut results = Vec::with_capacity(tasks.len());
        for (name, task) in tasks {
            match task.await {
                Ok(Ok(value)) => results.push(Some(value)),
                Ok(Err(e)) => {
                    if !self.is_relaunching() {
                        HookFailed {
                            stream_id: self.id(),
                            interface: &name,
                            hook,
                            error: &e,
                        }
                        .log();
                    }
                    results.push(None);
                }
                Err(join_error) => {
                    HookFailed {
                        stream_id: self.id(),
                        interface: &name,
                        hook,
                        error: &join_error,
                    }
                    .log();
                    results.push(None);
                }
            }
        }
        results
    }

    /// Collect observations from every reader interface.
    ///
    /// Each reader gets its region of the observation buffer and an [`End`];
    /// this resolves once every reader has finished.
    pub async fn read(&self) -> Result<Vec<f32>, StreamError> {
        self.ensure_open()?;
        step::relaunch_if_needed(self);
        let layout = self.layout();
        self.read_hooks(&layout).await;
        Ok(layout.obs.to_vec())
    }

    pub(crate) async fn read_hooks(&self, layout: &Layout) {
        if layout.reads == 0 {
            return;
        }
        let readers: Vec<&Binding> = layout
            .bound
            .iter()
            .filter(|b| b.caps.reads && !self.is_unlinking(b))
            .collect();
        let group = EndGroup::new(readers.len());

        let mut tasks = Vec::with_capacity(readers.len());
        for binding in readers {
            let stream = self.clone();
            let binding = binding.clone();
            let end = group.handle();
            let name = binding.name.clone();
            tasks.push((
                name,
                tokio::spawn(async move {
                    let _ended = end.on_drop();
                    binding
                        .interface
                        .read(&stream, binding.obs.clone(), end.clone())
                        .await
                }),
            ));
        }
        self.join_hooks("read", tasks).await;
    }

    /// Apply `actions` through every writer interface.
    pub async fn write(&self, actions: &[f32]) -> Result<(), StreamError> {
        self.ensure_open()?;
        step::relaunch_if_needed(self);
        let layout = self.layout();
        if actions.len() != layout.writes {
            return Err(StreamError::LengthMismatch {
                expected: layout.writes,
                actual: actions.len(),
            });
        }
        if layout.writes == 0 {
            return Ok(());
        }
        layout.act.copy_from(actions);
        self.write_hooks(&layout).await;
        Ok(())
    }

    pub(crate) async fn write_hooks(&self, layout: &Layout) {
        let mut tasks = Vec::new();
        for binding in layout.bound.iter().filter(|b| b.caps.writes) {
            if self.is_unlinking(binding) {
                continue;
            }
            let stream = self.clone();
            let binding = binding.clone();
            tasks.push((
                binding.name.clone(),
                tokio::spawn(async move {
                    binding
                        .interface
                        .write(&stream, binding.pred.clone(), binding.act.clone())
                        .await
                }),
            ));
        }
        self.join_hooks("write", tasks).await;
    }

    async fn lifecycle_hooks(&self, hook: &'static str, bindings: &[Binding]) {
        let mut tasks = Vec::new();
        for binding in bindings.iter().filter(|b| b.caps.lifecycle) {
            let stream = self.clone();
            let interface = Arc::clone(&binding.interface);
            tasks.push((
                binding.name.clone(),
                tokio::spawn(async move {
                    if hook == "init" {
                        interface.init(&stream).await
                    } else {
                        interface.deinit(&stream).await
                    }
                }),
            ));
        }
        self.join_hooks(hook, tasks).await;
    }

    /// Replace the interface set. Newly bound interfaces are initialized,
    /// unbound ones deinitialized, and the buffers are rebuilt full of NaN.
    pub async fn relink(&self, interfaces: impl Into<InterfaceTree>) -> Result<(), StreamError> {
        self.ensure_open()?;
        let own = layout::flatten(interfaces.into()).await;
        let _serial = self.shared.relink_lock.lock().await;
        self.relink_locked(own).await
    }

    async fn relink_locked(&self, own: Vec<Arc<dyn Interface>>) -> Result<(), StreamError> {
        self.ensure_open()?;
        let old = self.layout();

        let mut sorted = own.clone();
        layout::sort_by_priority(&mut sorted);
        let id = self.shared.next_layout_id.fetch_add(1, Ordering::AcqRel);
        let request = *lock(&self.shared.size_request);
        let layout = match Layout::build(id, &sorted, request) {
            Err(StreamError::ResizeTooSmall { .. }) if request.is_some() => {
                *lock(&self.shared.size_request) = None;
                Layout::build(id, &sorted, None)?
            }
            other => other?,
        };

        let old_keys: HashSet<usize> = old.bound.iter().map(Binding::key).collect();
        let new_keys: HashSet<usize> = layout.bound.iter().map(Binding::key).collect();
        let added: Vec<Binding> = layout
            .bound
            .iter()
            .filter(|b| !old_keys.contains(&b.key()))
            .cloned()
            .collect();
        let removed: Vec<Binding> = old
            .bound
            .iter()
            .filter(|b| !new_keys.contains(&b.key()))
            .cloned()
            .collect();

        {
            let mut settings = write(&self.shared.settings);
            for binding in &layout.bound {
                if let Some(patch) = binding.interface.settings() {
                    patch.apply(&mut settings);
                }
            }
        }

        self.lifecycle_hooks("init", &added).await;
        self.lifecycle_hooks("deinit", &removed).await;

        let had_agents = old.bound.iter().any(|b| b.caps.agent);
        let has_agents = layout.bound.iter().any(|b| b.caps.agent);
        let scripts: Vec<String> = layout
            .bound
            .iter()
            .filter(|b| b.caps.injected_script)
            .filter_map(|b| b.interface.injected_script())
            .collect();

        let layout = Arc::new(layout);
        *write(&self.shared.layout) = Arc::clone(&layout);
        *lock(&self.shared.own) = own;
        old.retire();

        StreamRelinked {
            stream_id: self.id(),
            interfaces: layout.bound.len(),
            added: added.len(),
            removed: removed.len(),
            reads: layout.reads,
            writes: layout.writes,
        }
        .log();

        self.update_scripts(scripts).await;

        if has_agents && !had_agents {
            step::start_loop(self);
        }
        Ok(())
    }

    async fn update_scripts(&self, scripts: Vec<String>) {
        {
            let mut current = lock(&self.shared.scripts);
            if *current == scripts {
                return;
            }
            *current = scripts.clone();
        }
        let Some(driver) = &self.shared.driver else {
            return;
        };
        if let Err(e) = driver.inject_scripts(&scripts).await {
            HookFailed {
                stream_id: self.id(),
                interface: "page_driver",
                hook: "inject_scripts",
                error: &e,
            }
            .log();
        }
    }

    /// Send the page driver to the configured homepage.
    pub(crate) async fn go_home(&self) {
        let Some(driver) = &self.shared.driver else {
            return;
        };
        let homepage = self.settings().homepage;
        if let Err(e) = driver.navigate(&homepage).await {
            HookFailed {
                stream_id: self.id(),
                interface: "page_driver",
                hook: "navigate",
                error: &e,
            }
            .log();
        }
    }

    /// Remove agents whose last step did not return `true`.
    pub(crate) async fn unlink_pending(&self) {
        let bad: Vec<Arc<dyn Interface>> = std::mem::take(&mut *lock(&self.shared.unlink));
        if bad.is_empty() {
            return;
        }
        let bad_keys: HashSet<usize> = bad.iter().map(identity).collect();
        {
            let _serial = self.shared.relink_lock.lock().await;
            let keep: Vec<Arc<dyn Interface>> = self
                .interfaces()
                .into_iter()
                .filter(|i| !bad_keys.contains(&identity(i)))
                .collect();
            if let Err(e) = self.relink_locked(keep).await {
                if !matches!(e, StreamError::Closed) {
                    step::log_step_failure(self, &e);
                }
            }
        }
        let mut pending = lock(&self.shared.pending_unlink);
        for key in &bad_keys {
            pending.remove(key);
        }
    }

    pub(crate) fn mark_unlink(&self, binding: &Binding) {
        if lock(&self.shared.pending_unlink).insert(binding.key()) {
            lock(&self.shared.unlink).push(Arc::clone(&binding.interface));
        }
    }

    /// Resize the observation and action buffers.
    ///
    /// An interface with a `Remaining` width absorbs the difference from the
    /// fixed widths; without one, extra space is left unowned. The overlapping
    /// prefix of each buffer is kept. Resizing to the current size does nothing.
    pub async fn resize(&self, reads: usize, writes: usize) -> Result<(), StreamError> {
        self.ensure_open()?;
        let _serial = self.shared.relink_lock.lock().await;
        let old = self.layout();
        if old.reads == reads && old.writes == writes {
            return Ok(());
        }

        let mut sorted = self.interfaces();
        layout::sort_by_priority(&mut sorted);
        let id = self.shared.next_layout_id.fetch_add(1, Ordering::AcqRel);
        let layout = Layout::build(id, &sorted, Some((reads, writes)))?;
        layout.carry_over(&old);

        *lock(&self.shared.size_request) = Some((reads, writes));
        *write(&self.shared.layout) = Arc::new(layout);
        old.retire();

        StreamResized {
            stream_id: self.id(),
            reads,
            writes,
        }
        .log();
        Ok(())
    }

    /// Force a relaunch of the external resource, retrying up to
    /// `max_relaunch_attempts` times. Concurrent calls are serialized.
    pub async fn relaunch(&self) -> Result<(), StreamError> {
        step::relaunch_retrying(self).await
    }

    /// Stop the loop, deinitialize every interface and release the external
    /// resource. Idempotent; every other operation fails afterwards.
    pub async fn close(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state == StreamState::Closed {
                return;
            }
            *state = StreamState::Closed;
        }
        self.shared.watchdog.cancel();

        let layout = self.layout();
        self.lifecycle_hooks("deinit", &layout.bound).await;
        if let Some(relauncher) = &self.shared.relauncher {
            relauncher.teardown().await;
        }

        StreamClosed {
            stream_id: self.id(),
            interfaces: layout.bound.len(),
        }
        .log();
    }
}
