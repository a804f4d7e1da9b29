// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Copy-on-write guard and the two external collaborators it threads
//! through: the allocator and the payload clone/free hooks.
//!
//! A node is shared exactly when `Arc::strong_count` exceeds 1 — one or more
//! extra holders beyond the single parent pointer reaching it through the
//! tree. [`cow_mut`] is the discipline every mutating traversal wraps around
//! a child pointer before writing through it: privatise a shared node, leave
//! an exclusively-owned one alone.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::TreeError;
use crate::node::{Entry, Kind, Node};

/// A narrow seam for fault injection: the core calls [`try_reserve`] before
/// any allocation it wants to be able to fail on demand (see
/// `Tree::preflight`). It never performs the allocation itself — that's left
/// to `Arc`/`Vec` in the ordinary way — so a `false` here only ever aborts an
/// operation before any tree state has been touched.
///
/// [`try_reserve`]: Allocator::try_reserve
pub trait Allocator {
    /// Returns whether the next allocation should be allowed to proceed.
    fn try_reserve(&self) -> bool;
}

/// The default allocator: every reservation succeeds, deferring to the
/// process's global allocator (which aborts on real exhaustion, as is usual
/// in Rust). Test harnesses exercising OOM recovery supply their own
/// fault-injecting [`Allocator`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAllocator;

impl Allocator for GlobalAllocator {
    fn try_reserve(&self) -> bool {
        true
    }
}

/// Caller-supplied clone/free hooks for payloads that need more than a
/// bitwise copy: the tree calls [`clone_payload`](PayloadHooks::clone_payload)
/// at insertion and whenever a shared leaf is privatised, and
/// [`free_payload`](PayloadHooks::free_payload) at deletion and whenever a
/// node is dropped. Replaces the original's `void *user_data` parameter:
/// implementors close over whatever state they need directly.
pub trait PayloadHooks<P> {
    /// Produce a stored copy of `payload`. May fail for any caller-defined
    /// reason; the tree treats failure as [`TreeError::OutOfMemory`].
    fn clone_payload(&self, payload: &P) -> Result<P, TreeError>;

    /// Release a payload that is leaving the tree (by deletion or by a node
    /// reaching its last drop).
    fn free_payload(&self, payload: P);
}

/// A shared, cheaply-clonable handle to a tree's payload hooks. Every node
/// carries a clone of this handle so that dropping a leaf whose hooks are
/// set can release its payloads without threading the tree itself through
/// every recursive free.
pub type HooksHandle<P> = Arc<dyn PayloadHooks<P> + Send + Sync>;

/// Duplicate `node`: bitwise-copy its rectangles, increment the ref-count of
/// every child (branch), or clone every stored payload through the hooks (or
/// by plain [`Clone`] when no hooks are set) (leaf). On a clone-hook failure
/// partway through a leaf, every payload already cloned into the copy is
/// released via the free hook before returning the error, leaving the
/// original node untouched.
pub(crate) fn node_copy<P: Clone, const D: usize>(
    node: &Node<P, D>,
    hooks: Option<&dyn PayloadHooks<P>>,
) -> Result<Node<P, D>, TreeError> {
    match node.kind {
        Kind::Branch => {
            let entries = node
                .entries
                .iter()
                .map(|entry| match entry {
                    Entry::Branch { rect, child } => {
                        Entry::Branch { rect: *rect, child: Arc::clone(child) }
                    }
                    Entry::Leaf { .. } => unreachable!("branch node holds only branch entries"),
                })
                .collect();
            Ok(Node { kind: Kind::Branch, entries, hooks: node.hooks.clone() })
        }
        Kind::Leaf => {
            let mut cloned: Vec<Entry<P, D>> = Vec::with_capacity(node.entries.len());
            for entry in &node.entries {
                let Entry::Leaf { rect, payload } = entry else {
                    unreachable!("leaf node holds only leaf entries");
                };
                let stored = match hooks {
                    Some(h) => match h.clone_payload(payload) {
                        Ok(p) => p,
                        Err(err) => {
                            for done in cloned.drain(..) {
                                if let Entry::Leaf { payload, .. } = done {
                                    h.free_payload(payload);
                                }
                            }
                            return Err(err);
                        }
                    },
                    None => payload.clone(),
                };
                cloned.push(Entry::Leaf { rect: *rect, payload: stored });
            }
            Ok(Node { kind: Kind::Leaf, entries: cloned, hooks: node.hooks.clone() })
        }
    }
}

/// The cow-guard: if `slot` is shared (`Arc::strong_count > 1`), privatise it
/// via [`node_copy`] and replace it in place; either way, return a unique
/// mutable reference to whatever `slot` now points to.
pub(crate) fn cow_mut<'a, P: Clone, const D: usize>(
    slot: &'a mut Arc<Node<P, D>>,
    hooks: Option<&dyn PayloadHooks<P>>,
) -> Result<&'a mut Node<P, D>, TreeError> {
    if Arc::strong_count(slot) > 1 {
        let copy = node_copy(slot, hooks)?;
        *slot = Arc::new(copy);
    }
    Ok(Arc::get_mut(slot).expect("node is uniquely owned immediately after a cow copy"))
}
