// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::utils::lock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// One of a stream's three float buffers. Replaced wholesale on relink or
/// resize; the old one is marked retired so outstanding views can tell.
pub(crate) struct SharedBuffer {
    data: Mutex<Vec<f32>>,
    retired: AtomicBool,
}

impl SharedBuffer {
    pub(crate) fn nan(len: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![f32::NAN; len]),
            retired: AtomicBool::new(false),
        })
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

/// A window onto a contiguous region of a stream buffer.
///
/// Views share storage with the buffer: writes through a view are visible to
/// every other view of the same region. Accessors hold the buffer lock only
/// for the duration of the closure.
#[derive(Clone)]
pub struct View {
    buffer: Arc<SharedBuffer>,
    offset: usize,
    len: usize,
}

impl View {
    pub(crate) fn new(buffer: Arc<SharedBuffer>, offset: usize, len: usize) -> Self {
        Self {
            buffer,
            offset,
            len,
        }
    }

    /// A view over `len` NaNs that belongs to no stream.
    pub fn detached(len: usize) -> Self {
        Self::new(SharedBuffer::nan(len), 0, len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn with<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let data = lock(&self.buffer.data);
        f(&data[self.offset..self.offset + self.len])
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let mut data = lock(&self.buffer.data);
        f(&mut data[self.offset..self.offset + self.len])
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.with(|s| s.to_vec())
    }

    /// Copy the overlapping prefix of `src` in.
    pub fn copy_from(&self, src: &[f32]) {
        self.with_mut(|dst| {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        })
    }

    /// Copy the overlapping prefix out into `dst`.
    pub fn copy_to(&self, dst: &mut [f32]) {
        self.with(|src| {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        })
    }

    pub fn fill(&self, value: f32) {
        self.with_mut(|dst| dst.fill(value))
    }

    /// The stream has moved on to a new buffer since this view was taken.
    pub fn is_stale(&self) -> bool {
        self.buffer.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.buffer.retire();
    }

    #[cfg(test)]
    pub(crate) fn same_buffer(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Counts down the readers of one `read()` call.
pub(crate) struct EndGroup {
    remaining: AtomicUsize,
    done: watch::Sender<bool>,
}

impl EndGroup {
    pub(crate) fn new(readers: usize) -> Arc<Self> {
        let (done, _) = watch::channel(readers == 0);
        Arc::new(Self {
            remaining: AtomicUsize::new(readers),
            done,
        })
    }

    pub(crate) fn handle(self: &Arc<Self>) -> End {
        End {
            group: Arc::clone(self),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.send_replace(true);
        }
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so this cannot fail while we hold it.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// A reader's handle on the shared end of a `read()`.
///
/// Calling [`End::end`] (or [`End::fire`]) marks this reader finished with
/// the observation buffer and waits for the rest. A reader that returns
/// without ending is ended for it.
#[derive(Clone)]
pub struct End {
    group: Arc<EndGroup>,
    fired: Arc<AtomicBool>,
}

impl End {
    /// Mark this reader finished. Idempotent.
    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.group.arrive();
        }
    }

    /// Mark this reader finished and wait for every other reader.
    pub async fn end(&self) {
        self.fire();
        self.group.wait().await;
    }

    pub(crate) fn on_drop(&self) -> EndOnDrop {
        EndOnDrop(self.clone())
    }
}

impl fmt::Debug for End {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("End")
            .field("fired", &self.fired.load(Ordering::Acquire))
            .finish()
    }
}

/// Fires its `End` when dropped, including when the hook panicked.
pub(crate) struct EndOnDrop(End);

impl Drop for EndOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}
