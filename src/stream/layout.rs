// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Ordering interfaces and carving the stream buffers into per-interface regions.

use super::view::{SharedBuffer, View};
use crate::errors::StreamError;
use crate::traits::{Capabilities, Interface, Width};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// An interface set as handed to open or relink: single interfaces, nested
/// groups, and groups that are still being built.
pub enum InterfaceTree {
    Leaf(Arc<dyn Interface>),
    Group(Vec<InterfaceTree>),
    Deferred(Pin<Box<dyn Future<Output = InterfaceTree> + Send>>),
}

impl InterfaceTree {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = InterfaceTree> + Send + 'static,
    {
        InterfaceTree::Deferred(Box::pin(future))
    }

    pub fn empty() -> Self {
        InterfaceTree::Group(Vec::new())
    }
}

impl From<Arc<dyn Interface>> for InterfaceTree {
    fn from(i: Arc<dyn Interface>) -> Self {
        InterfaceTree::Leaf(i)
    }
}

impl From<Vec<Arc<dyn Interface>>> for InterfaceTree {
    fn from(v: Vec<Arc<dyn Interface>>) -> Self {
        InterfaceTree::Group(v.into_iter().map(InterfaceTree::Leaf).collect())
    }
}

impl From<Vec<InterfaceTree>> for InterfaceTree {
    fn from(v: Vec<InterfaceTree>) -> Self {
        InterfaceTree::Group(v)
    }
}

/// Identity of an interface instance.
pub(crate) fn identity(i: &Arc<dyn Interface>) -> usize {
    Arc::as_ptr(i) as *const () as usize
}

fn flatten_into<'a>(
    tree: InterfaceTree,
    out: &'a mut Vec<Arc<dyn Interface>>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        match tree {
            InterfaceTree::Leaf(i) => {
                let id = identity(&i);
                if !out.iter().any(|o| identity(o) == id) {
                    out.push(i);
                }
            }
            InterfaceTree::Group(children) => {
                for child in children {
                    flatten_into(child, out).await;
                }
            }
            InterfaceTree::Deferred(pending) => {
                let resolved = pending.await;
                flatten_into(resolved, out).await;
            }
        }
    })
}

/// Resolve deferred groups and flatten, keeping the first occurrence of each
/// interface.
pub(crate) async fn flatten(tree: InterfaceTree) -> Vec<Arc<dyn Interface>> {
    let mut out = Vec::new();
    flatten_into(tree, &mut out).await;
    out
}

fn priority_of(i: &Arc<dyn Interface>) -> f64 {
    let p = i.priority();
    if p.is_nan() {
        0.0
    } else {
        p
    }
}

/// Stable sort, highest priority first.
pub(crate) fn sort_by_priority(interfaces: &mut [Arc<dyn Interface>]) {
    interfaces.sort_by(|a, b| priority_of(b).total_cmp(&priority_of(a)));
}

/// Regions of one buffer: `(offset, len)` per interface, plus the total.
struct Allocation {
    regions: Vec<(usize, usize)>,
    total: usize,
}

fn allocate(
    buffer: &'static str,
    widths: &[(&str, Option<Width>)],
    requested: Option<usize>,
) -> Result<Allocation, StreamError> {
    let fixed: usize = widths
        .iter()
        .filter_map(|(_, w)| match w {
            Some(Width::Fixed(n)) => Some(*n),
            _ => None,
        })
        .sum();

    let remaining: Vec<usize> = widths
        .iter()
        .enumerate()
        .filter(|(_, (_, w))| *w == Some(Width::Remaining))
        .map(|(i, _)| i)
        .collect();
    if remaining.len() > 1 {
        return Err(StreamError::DuplicateRemaining { buffer });
    }
    if let Some(&at) = remaining.first() {
        if widths[at + 1..].iter().any(|(_, w)| w.is_some()) {
            return Err(StreamError::RemainingNotLast {
                buffer,
                interface: widths[at].0.to_string(),
            });
        }
    }

    let total = match requested {
        None => fixed,
        Some(r) if r < fixed => {
            return Err(StreamError::ResizeTooSmall {
                buffer,
                requested: r,
                fixed,
            })
        }
        Some(r) => r,
    };
    let leftover = total - fixed;

    let mut offset = 0;
    let regions = widths
        .iter()
        .map(|(_, w)| match w {
            None => (0, total),
            Some(Width::Fixed(n)) => {
                let region = (offset, *n);
                offset += n;
                region
            }
            Some(Width::Remaining) => {
                let region = (offset, leftover);
                offset += leftover;
                region
            }
        })
        .collect();

    Ok(Allocation { regions, total })
}

fn declared<'a>(
    interfaces: &[Arc<dyn Interface>],
    names: &'a [String],
    pick: fn(&dyn Interface) -> Option<Width>,
) -> Vec<(&'a str, Option<Width>)> {
    interfaces
        .iter()
        .zip(names)
        .map(|(i, n)| (n.as_str(), pick(i.as_ref())))
        .collect()
}

/// A bound interface and its regions of the observation, prediction and
/// action buffers. Interfaces without a declared width see the whole buffer.
#[derive(Clone)]
pub struct Binding {
    pub interface: Arc<dyn Interface>,
    pub name: String,
    pub caps: Capabilities,
    pub obs: View,
    pub pred: View,
    pub act: View,
}

impl Binding {
    pub(crate) fn key(&self) -> usize {
        identity(&self.interface)
    }
}

/// A complete buffer layout. Immutable; relink and resize swap in a new one.
pub(crate) struct Layout {
    pub id: u64,
    pub bound: Vec<Binding>,
    pub reads: usize,
    pub writes: usize,
    pub obs: View,
    pub pred: View,
    pub act: View,
}

impl Layout {
    pub fn empty(id: u64) -> Self {
        Self {
            id,
            bound: Vec::new(),
            reads: 0,
            writes: 0,
            obs: View::detached(0),
            pred: View::detached(0),
            act: View::detached(0),
        }
    }

    /// Lay `interfaces` (already in priority order) out over fresh NaN buffers.
    pub fn build(
        id: u64,
        interfaces: &[Arc<dyn Interface>],
        request: Option<(usize, usize)>,
    ) -> Result<Self, StreamError> {
        let names: Vec<String> = interfaces.iter().map(|i| i.name().to_string()).collect();
        let caps: Vec<Capabilities> = interfaces.iter().map(|i| i.capabilities()).collect();
        let (reads, writes) = {
            let read_widths = declared(interfaces, &names, |i| i.reads());
            let write_widths = declared(interfaces, &names, |i| i.writes());
            (
                allocate("reads", &read_widths, request.map(|(r, _)| r))?,
                allocate("writes", &write_widths, request.map(|(_, w)| w))?,
            )
        };

        let obs = SharedBuffer::nan(reads.total);
        let pred = SharedBuffer::nan(reads.total);
        let act = SharedBuffer::nan(writes.total);

        let bound = interfaces
            .iter()
            .zip(names)
            .zip(caps)
            .zip(reads.regions.iter().zip(&writes.regions))
            .map(|(((i, name), caps), (&(ro, rl), &(wo, wl)))| Binding {
                interface: Arc::clone(i),
                name,
                caps,
                obs: View::new(Arc::clone(&obs), ro, rl),
                pred: View::new(Arc::clone(&pred), ro, rl),
                act: View::new(Arc::clone(&act), wo, wl),
            })
            .collect();

        Ok(Self {
            id,
            bound,
            reads: reads.total,
            writes: writes.total,
            obs: View::new(obs, 0, reads.total),
            pred: View::new(pred, 0, reads.total),
            act: View::new(act, 0, writes.total),
        })
    }

    /// Copy the overlapping prefix of each buffer from `old`.
    pub fn carry_over(&self, old: &Layout) {
        let obs = old.obs.to_vec();
        self.obs.copy_from(&obs);
        let pred = old.pred.to_vec();
        self.pred.copy_from(&pred);
        let act = old.act.to_vec();
        self.act.copy_from(&act);
    }

    pub fn retire(&self) {
        for view in [&self.obs, &self.pred, &self.act] {
            view.retire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths_get_consecutive_regions() {
        let a = allocate(
            "reads",
            &[("a", Some(Width::Fixed(2))), ("b", None), ("c", Some(Width::Fixed(3)))],
            None,
        )
        .unwrap();
        assert_eq!(a.total, 5);
        assert_eq!(a.regions, vec![(0, 2), (0, 5), (2, 3)]);
    }

    #[test]
    fn test_remaining_absorbs_resize() {
        let widths = [("a", Some(Width::Fixed(2))), ("rest", Some(Width::Remaining))];
        let natural = allocate("reads", &widths, None).unwrap();
        assert_eq!(natural.regions, vec![(0, 2), (2, 0)]);

        let grown = allocate("reads", &widths, Some(10)).unwrap();
        assert_eq!(grown.total, 10);
        assert_eq!(grown.regions, vec![(0, 2), (2, 8)]);
    }

    #[test]
    fn test_resize_below_fixed_fails() {
        let widths = [("a", Some(Width::Fixed(4)))];
        assert!(matches!(
            allocate("writes", &widths, Some(3)),
            Err(StreamError::ResizeTooSmall { buffer: "writes", requested: 3, fixed: 4 })
        ));
        // Without a remaining interface, extra space is an unowned tail.
        let tail = allocate("writes", &widths, Some(6)).unwrap();
        assert_eq!(tail.total, 6);
        assert_eq!(tail.regions, vec![(0, 4)]);
    }

    #[test]
    fn test_remaining_rules() {
        assert!(matches!(
            allocate(
                "reads",
                &[("x", Some(Width::Remaining)), ("y", Some(Width::Remaining))],
                None
            ),
            Err(StreamError::DuplicateRemaining { buffer: "reads" })
        ));
        assert!(matches!(
            allocate(
                "reads",
                &[("x", Some(Width::Remaining)), ("y", Some(Width::Fixed(1)))],
                None
            ),
            Err(StreamError::RemainingNotLast { interface, .. }) if interface == "x"
        ));
        // Whole-buffer interfaces may follow it.
        assert!(allocate("reads", &[("x", Some(Width::Remaining)), ("y", None)], None).is_ok());
    }
}
