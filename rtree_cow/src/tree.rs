// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tree: insert, delete, search, scan, count, and O(1) clone, driving
//! the node mechanics through the copy-on-write guard at every mutating
//! step.

use alloc::sync::Arc;
use core::fmt;

use crate::check::{self, CheckError};
use crate::cow::{cow_mut, Allocator, GlobalAllocator, HooksHandle, PayloadHooks};
use crate::error::TreeError;
use crate::node::{Entry, Kind, Node};
use crate::rect::Rect;

/// An in-memory, multi-dimensional R-tree over `D`-dimensional `f64`
/// rectangles and opaque payloads `P`, supporting insertion, deletion,
/// rectangle-intersection search, full scan, and an O(1) copy-on-write
/// clone.
///
/// `A` is the allocator collaborator (see [`Allocator`]); it defaults to
/// [`GlobalAllocator`], which never refuses a reservation. Swap in a
/// fault-injecting implementation to exercise OOM recovery in tests.
pub struct Tree<P, const D: usize, A: Allocator = GlobalAllocator> {
    rect: Option<Rect<D>>,
    root: Option<Arc<Node<P, D>>>,
    count: usize,
    height: usize,
    hooks: Option<HooksHandle<P>>,
    alloc: A,
}

impl<P, const D: usize> Tree<P, D, GlobalAllocator> {
    /// An empty tree backed by the global allocator.
    pub fn new() -> Self {
        Self::with_allocator(GlobalAllocator)
    }
}

impl<P, const D: usize> Default for Tree<P, D, GlobalAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, const D: usize, A: Allocator> Tree<P, D, A> {
    /// An empty tree backed by `alloc`.
    pub fn with_allocator(alloc: A) -> Self {
        Self { rect: None, root: None, count: 0, height: 0, hooks: None, alloc }
    }

    /// Install payload clone/free hooks. Must be set before any insertion;
    /// changing hooks on a tree that already holds entries is unsupported.
    pub fn set_payload_hooks(&mut self, hooks: HooksHandle<P>) {
        self.hooks = Some(hooks);
    }

    /// Total number of leaf entries.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of levels from root to any leaf, inclusive; 0 when empty, 1
    /// when the root is itself a leaf.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The union of every entry reachable from the root, or `None` when
    /// empty.
    pub fn bounds(&self) -> Option<Rect<D>> {
        self.rect
    }

    /// Mirrors the original's `fill_pool`: reserve, against the configured
    /// allocator, enough capacity for every node a single insert or delete
    /// could possibly allocate (one new leaf plus up to `height*2+2` branch
    /// copies/splits) before any mutation begins. Because every reservation
    /// is checked up front, a fault partway through an operation never
    /// leaves a half-built tree — the concrete node pool is dropped (Rust's
    /// ownership model replaces it outright) but the preflight strategy it
    /// existed to support is kept.
    fn preflight(&self) -> Result<(), TreeError> {
        let reservations = (self.height * 2 + 2).max(4);
        for _ in 0..reservations {
            if !self.alloc.try_reserve() {
                return Err(TreeError::OutOfMemory);
            }
        }
        Ok(())
    }
}

impl<P: Clone, const D: usize, A: Allocator> Tree<P, D, A> {
    /// Insert `(rect(min, max), payload)`. `max` defaults to `min` (a
    /// point). Returns `Err` on allocator or hook failure only; on error the
    /// tree is left unchanged (or reduced to an equivalent privatized
    /// spine).
    pub fn insert(&mut self, min: [f64; D], max: Option<[f64; D]>, payload: P) -> Result<(), TreeError> {
        self.preflight()?;
        let rect = Rect::new(min, max.unwrap_or(min));
        let stored = match &self.hooks {
            Some(h) => h.clone_payload(&payload)?,
            None => payload,
        };

        if self.root.is_none() {
            self.root = Some(Arc::new(Node::empty(Kind::Leaf, self.hooks.clone())));
            self.rect = Some(rect);
            self.height = 1;
        }

        let mut root_arc = self.root.take().expect("root just ensured above");
        let hooks = self.hooks.as_deref();
        if let Err(err) = cow_mut(&mut root_arc, hooks) {
            self.root = Some(root_arc);
            if let Some(h) = hooks {
                h.free_payload(stored);
            }
            return Err(err);
        }

        let mut node_rect = self.rect.expect("rect is set alongside root");
        let mut payload = stored;
        loop {
            let (split, grew, leftover) = match Self::insert_recurse(
                &mut node_rect,
                Arc::get_mut(&mut root_arc).expect("root uniquely owned after cow guard"),
                &rect,
                payload,
                hooks,
            ) {
                Ok(outcome) => outcome,
                Err(err) => {
                    // insert_recurse frees the payload through the hook itself
                    // at whichever depth the failing cow-guard sits, since by
                    // this point ownership of `payload` has moved into it.
                    self.root = Some(root_arc);
                    return Err(err);
                }
            };
            if split {
                let left = Arc::try_unwrap(root_arc)
                    .unwrap_or_else(|_| unreachable!("root was privatized by the cow guard above"));
                let mut left = left;
                let right = left.split_largest_axis_edge_snap(&node_rect, self.hooks.clone());
                let left_rect = left.rect_calc();
                let right_rect = right.rect_calc();
                let mut new_root = Node::empty(Kind::Branch, self.hooks.clone());
                new_root.entries.push(Entry::Branch { rect: left_rect, child: Arc::new(left) });
                new_root.entries.push(Entry::Branch { rect: right_rect, child: Arc::new(right) });
                new_root.sort();
                self.height += 1;
                root_arc = Arc::new(new_root);
                payload = leftover.expect("a leaf never consumes the payload on split");
                continue;
            }
            if grew {
                node_rect.expand(&rect);
            }
            break;
        }

        self.root = Some(root_arc);
        self.rect = Some(node_rect);
        self.count += 1;
        Ok(())
    }

    /// `node_insert`: returns `(split?, grew?, payload-if-not-yet-stored)`.
    /// The payload comes back out exactly when the leaf case never got to
    /// place it (i.e. whenever `split` is true), so an overflowing root can
    /// retry the whole descent with the same value.
    fn insert_recurse(
        parent_rect: &mut Rect<D>,
        node: &mut Node<P, D>,
        ir: &Rect<D>,
        payload: P,
        hooks: Option<&dyn PayloadHooks<P>>,
    ) -> Result<(bool, bool, Option<P>), TreeError> {
        match node.kind {
            Kind::Leaf => {
                if node.entries.len() == crate::node::MAX_ENTRIES {
                    return Ok((true, false, Some(payload)));
                }
                let pos = node.rsearch(ir.min[0]);
                node.entries.insert(pos, Entry::Leaf { rect: *ir, payload });
                let grew = !parent_rect.contains(ir);
                Ok((false, grew, None))
            }
            Kind::Branch => {
                let idx = node.choose_subtree(ir);
                let (split, grew, leftover) = {
                    let Entry::Branch { rect: child_rect, child } = &mut node.entries[idx] else {
                        unreachable!("branch node holds only branch entries");
                    };
                    let mut nr = *child_rect;
                    let child_mut = match cow_mut(child, hooks) {
                        Ok(child_mut) => child_mut,
                        Err(err) => {
                            // `payload` is still ours at this point (it hasn't
                            // been handed to a deeper insert_recurse yet), so
                            // this is the one place that must free it before
                            // propagating the failure.
                            if let Some(h) = hooks {
                                h.free_payload(payload);
                            }
                            return Err(err);
                        }
                    };
                    let outcome = Self::insert_recurse(&mut nr, child_mut, ir, payload, hooks)?;
                    *child_rect = nr;
                    outcome
                };

                if split {
                    if node.entries.len() == crate::node::MAX_ENTRIES {
                        return Ok((true, false, leftover));
                    }
                    let Entry::Branch { child, .. } = node.entries.remove(idx) else {
                        unreachable!("branch node holds only branch entries");
                    };
                    let mut left = Arc::try_unwrap(child)
                        .unwrap_or_else(|_| unreachable!("child was privatized by the cow guard above"));
                    let left_parent_rect = left.rect_calc();
                    let right = left.split_largest_axis_edge_snap(&left_parent_rect, node.hooks.clone());
                    let left_rect = left.rect_calc();
                    let right_rect = right.rect_calc();
                    node.entries.insert(idx, Entry::Branch { rect: left_rect, child: Arc::new(left) });
                    node.entries
                        .insert(idx + 1, Entry::Branch { rect: right_rect, child: Arc::new(right) });
                    if node.entries[idx].rect().min[0] > node.entries[idx + 1].rect().min[0] {
                        node.entries.swap(idx, idx + 1);
                    }
                    node.order_to_right(idx + 1);
                    let payload = leftover.expect("a leaf never consumes the payload on split");
                    return Self::insert_recurse(parent_rect, node, ir, payload, hooks);
                }
                if grew {
                    let Entry::Branch { rect, .. } = &mut node.entries[idx] else {
                        unreachable!("branch node holds only branch entries");
                    };
                    rect.expand(ir);
                    node.order_to_left(idx);
                    let grown = !parent_rect.contains(ir);
                    return Ok((false, grown, None));
                }
                Ok((false, false, None))
            }
        }
    }

    /// Delete the entry whose rectangle is contained by `rect(min, max)` and
    /// whose payload satisfies `compare(stored, target)`, scanning in
    /// per-node order and stopping at the first match. "No match" is a
    /// successful no-op (`Ok(false)`); `Err` is only ever an allocator or
    /// hook failure.
    pub fn delete<F>(&mut self, min: [f64; D], max: Option<[f64; D]>, target: &P, compare: F) -> Result<bool, TreeError>
    where
        F: Fn(&P, &P) -> bool,
    {
        if self.root.is_none() {
            return Ok(false);
        }
        self.preflight()?;
        let query = Rect::new(min, max.unwrap_or(min));
        let mut root_arc = self.root.take().expect("checked above");
        let hooks = self.hooks.as_deref();
        if let Err(err) = cow_mut(&mut root_arc, hooks) {
            self.root = Some(root_arc);
            return Err(err);
        }

        let mut node_rect = self.rect.expect("rect is set alongside root");
        let (removed, shrunk) = match Self::delete_recurse(
            &mut node_rect,
            Arc::get_mut(&mut root_arc).expect("root uniquely owned after cow guard"),
            &query,
            target,
            &compare,
            hooks,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.root = Some(root_arc);
                return Err(err);
            }
        };
        self.root = Some(root_arc);
        if !removed {
            return Ok(false);
        }

        self.count -= 1;
        if self.count == 0 {
            self.root = None;
            self.rect = None;
            self.height = 0;
            return Ok(true);
        }

        loop {
            let should_collapse =
                matches!(&self.root, Some(root) if root.kind == Kind::Branch && root.entries.len() == 1);
            if !should_collapse {
                break;
            }
            let old_root = self.root.take().expect("collapse guard just checked Some");
            let Entry::Branch { child, .. } = &old_root.entries[0] else {
                unreachable!("collapse guard ensures a branch with exactly one entry");
            };
            self.root = Some(Arc::clone(child));
            self.height -= 1;
        }

        if shrunk {
            if let Some(root) = &self.root {
                self.rect = Some(root.rect_calc());
            }
        } else {
            self.rect = Some(node_rect);
        }
        Ok(true)
    }

    /// Delete using [`PartialEq`] as the default comparator (raw identity
    /// for `Copy` handles).
    pub fn delete_eq(&mut self, min: [f64; D], max: Option<[f64; D]>, target: &P) -> Result<bool, TreeError>
    where
        P: PartialEq,
    {
        self.delete(min, max, target, |a, b| a == b)
    }

    /// `node_delete`: returns `(removed?, shrunk?)`.
    fn delete_recurse<F>(
        parent_rect: &mut Rect<D>,
        node: &mut Node<P, D>,
        ir: &Rect<D>,
        target: &P,
        compare: &F,
        hooks: Option<&dyn PayloadHooks<P>>,
    ) -> Result<(bool, bool), TreeError>
    where
        F: Fn(&P, &P) -> bool,
    {
        match node.kind {
            Kind::Leaf => {
                for i in 0..node.entries.len() {
                    let Entry::Leaf { rect, payload } = &node.entries[i] else {
                        unreachable!("leaf node holds only leaf entries");
                    };
                    if !ir.contains(rect) || !compare(payload, target) {
                        continue;
                    }
                    let Entry::Leaf { payload, .. } = node.entries.remove(i) else {
                        unreachable!("leaf node holds only leaf entries");
                    };
                    if let Some(h) = hooks {
                        h.free_payload(payload);
                    }
                    let mut shrunk = false;
                    if ir.on_edge(parent_rect) {
                        if let Some(r) = node.try_rect_calc() {
                            *parent_rect = r;
                        }
                        shrunk = true;
                    }
                    return Ok((true, shrunk));
                }
                Ok((false, false))
            }
            Kind::Branch => {
                for i in 0..node.entries.len() {
                    if !node.entries[i].rect().contains(ir) {
                        continue;
                    }
                    let crect = *node.entries[i].rect();
                    let (removed, child_shrunk, child_empty) = {
                        let Entry::Branch { rect: child_rect, child } = &mut node.entries[i] else {
                            unreachable!("branch node holds only branch entries");
                        };
                        let mut nr = *child_rect;
                        let child_mut = cow_mut(child, hooks)?;
                        let (removed, shrunk) =
                            Self::delete_recurse(&mut nr, child_mut, ir, target, compare, hooks)?;
                        let empty = child_mut.entries.is_empty();
                        if removed {
                            *child_rect = nr;
                        }
                        (removed, shrunk, empty)
                    };
                    if !removed {
                        continue;
                    }
                    if child_empty {
                        node.entries.remove(i);
                        if let Some(r) = node.try_rect_calc() {
                            *parent_rect = r;
                        }
                        return Ok((true, true));
                    }
                    if child_shrunk {
                        let still_shrunk = !node.entries[i].rect().equals(&crect);
                        if still_shrunk {
                            if let Some(r) = node.try_rect_calc() {
                                *parent_rect = r;
                            }
                        }
                        node.order_to_right(i);
                        return Ok((true, still_shrunk));
                    }
                    return Ok((true, false));
                }
                Ok((false, false))
            }
        }
    }

    /// Report every entry whose rectangle intersects `rect(min, max)`, in
    /// per-node stored order. `visitor` returns whether to keep going;
    /// returning `false` aborts the entire traversal immediately. Read-only:
    /// never clone-on-write.
    pub fn search<F>(&self, min: [f64; D], max: Option<[f64; D]>, mut visitor: F)
    where
        F: FnMut(&Rect<D>, &P) -> bool,
    {
        let query = Rect::new(min, max.unwrap_or(min));
        if let (Some(root), Some(tree_rect)) = (&self.root, &self.rect) {
            if tree_rect.intersects(&query) {
                Self::search_recurse(root, &query, &mut visitor);
            }
        }
    }

    fn search_recurse(node: &Node<P, D>, query: &Rect<D>, visitor: &mut dyn FnMut(&Rect<D>, &P) -> bool) -> bool {
        for entry in &node.entries {
            if !entry.rect().intersects(query) {
                continue;
            }
            match entry {
                Entry::Leaf { rect, payload } => {
                    if !visitor(rect, payload) {
                        return false;
                    }
                }
                Entry::Branch { child, .. } => {
                    if !Self::search_recurse(child, query, visitor) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Report every entry, in an unspecified but deterministic depth-first
    /// order. Read-only: never clone-on-write.
    pub fn scan<F>(&self, mut visitor: F)
    where
        F: FnMut(&Rect<D>, &P) -> bool,
    {
        if let Some(root) = &self.root {
            Self::scan_recurse(root, &mut visitor);
        }
    }

    fn scan_recurse(node: &Node<P, D>, visitor: &mut dyn FnMut(&Rect<D>, &P) -> bool) -> bool {
        for entry in &node.entries {
            match entry {
                Entry::Leaf { rect, payload } => {
                    if !visitor(rect, payload) {
                        return false;
                    }
                }
                Entry::Branch { child, .. } => {
                    if !Self::scan_recurse(child, visitor) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Walk the tree verifying (I5) sibling order, (I3) branch-rect
    /// exactness, and the (I4)/height consistency of the leftmost
    /// root-to-leaf path.
    pub fn check_invariants(&self) -> Result<(), CheckError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        check::check_order(root)?;
        if let Some(rect) = &self.rect {
            check::check_rect(rect, root)?;
        }
        if check::leftmost_height(root)? != self.height {
            return Err(CheckError::HeightMismatch);
        }
        Ok(())
    }
}

impl<P: Clone, const D: usize, A: Allocator + Clone> Clone for Tree<P, D, A> {
    /// O(1): bitwise-copies the header and, if a root exists, increments its
    /// ref-count. Every subtree stays shared until the next mutation on
    /// either handle privatises the spine it touches.
    fn clone(&self) -> Self {
        Self {
            rect: self.rect,
            root: self.root.clone(),
            count: self.count,
            height: self.height,
            hooks: self.hooks.clone(),
            alloc: self.alloc.clone(),
        }
    }
}

impl<P, const D: usize, A: Allocator> fmt::Debug for Tree<P, D, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("height", &self.height)
            .field("count", &self.count)
            .field("rect", &self.rect)
            .finish_non_exhaustive()
    }
}
