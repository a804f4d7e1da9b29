// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The node model: a tagged-variant container of either branch or leaf
//! entries, plus the bulk array operations (sort, split, sibling-order
//! maintenance) the tree operations drive.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::cow::HooksHandle;
use crate::rect::Rect;

/// Maximum number of entries a node may hold.
pub const MAX_ENTRIES: usize = 64;

const MIN_FILL_PERCENT: usize = 10;

/// Minimum number of entries a non-root node must hold, derived from
/// [`MAX_ENTRIES`] and a minimum-fill percentage, clamped to `MAX_ENTRIES / 2`
/// so that split-rebalance can never loop waiting for a donor that doesn't
/// exist (see DESIGN.md's Open Question resolution).
pub const fn min_entries() -> usize {
    let computed = MAX_ENTRIES * MIN_FILL_PERCENT / 100 + 1;
    let ceiling = MAX_ENTRIES / 2;
    if computed > ceiling { ceiling } else { computed }
}

/// The resolved [`min_entries`] value for [`MAX_ENTRIES`].
pub const MIN_ENTRIES: usize = min_entries();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Leaf,
    Branch,
}

/// One `(rectangle, payload)` or `(rectangle, child)` entry. A given node's
/// `entries` are all the same variant, matching its `kind`.
pub(crate) enum Entry<P, const D: usize> {
    Leaf { rect: Rect<D>, payload: P },
    Branch { rect: Rect<D>, child: Arc<Node<P, D>> },
}

impl<P, const D: usize> Entry<P, D> {
    pub(crate) fn rect(&self) -> &Rect<D> {
        match self {
            Entry::Leaf { rect, .. } | Entry::Branch { rect, .. } => rect,
        }
    }
}

/// A fixed-kind container of entries. `kind` is set at construction and
/// never changes; `entries` holds at most [`MAX_ENTRIES`] items of that kind.
pub(crate) struct Node<P, const D: usize> {
    pub(crate) kind: Kind,
    pub(crate) entries: Vec<Entry<P, D>>,
    pub(crate) hooks: Option<HooksHandle<P>>,
}

impl<P, const D: usize> Node<P, D> {
    pub(crate) fn empty(kind: Kind, hooks: Option<HooksHandle<P>>) -> Self {
        Self { kind, entries: Vec::new(), hooks }
    }

    /// Bounding union of every entry, or `None` for an empty node.
    pub(crate) fn try_rect_calc(&self) -> Option<Rect<D>> {
        let mut iter = self.entries.iter();
        let mut rect = *iter.next()?.rect();
        for entry in iter {
            rect.expand(entry.rect());
        }
        Some(rect)
    }

    /// Bounding union of every entry. Panics on an empty node; every call
    /// site holds `count >= 1` as a precondition.
    pub(crate) fn rect_calc(&self) -> Rect<D> {
        self.try_rect_calc()
            .expect("rect_calc requires at least one entry")
    }

    /// Linear scan returning the first index `i` with `rects[i].min[0] >= key`,
    /// else `entries.len()`.
    pub(crate) fn rsearch(&self, key: f64) -> usize {
        for (i, entry) in self.entries.iter().enumerate() {
            if !(entry.rect().min[0] < key) {
                return i;
            }
        }
        self.entries.len()
    }

    /// Restore (I5) by sorting by `min[0]` ascending.
    pub(crate) fn sort(&mut self) {
        let len = self.entries.len();
        self.sort_range(0, len, 0, false, false);
    }

    /// Sort `entries[s..e]` by `rects[k].min[axis]` (or `max[axis]` when
    /// `by_max`), ascending unless `reverse`. The spec's contract is the
    /// resulting order, not a particular partitioning strategy, so this
    /// reaches for a stable `sort_by` rather than hand-rolling the
    /// Hoare-style quicksort of the original.
    pub(crate) fn sort_range(&mut self, s: usize, e: usize, axis: usize, reverse: bool, by_max: bool) {
        let key = |entry: &Entry<P, D>| -> f64 {
            let r = entry.rect();
            if by_max { r.max[axis] } else { r.min[axis] }
        };
        if reverse {
            self.entries[s..e]
                .sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(core::cmp::Ordering::Equal));
        } else {
            self.entries[s..e]
                .sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(core::cmp::Ordering::Equal));
        }
    }

    /// Remove the entry at `idx` (by swap with the last entry) and append it
    /// to `into`.
    pub(crate) fn move_entry(&mut self, idx: usize, into: &mut Self) {
        let entry = self.entries.swap_remove(idx);
        into.entries.push(entry);
    }

    /// First-containing-child fast path, falling back to least enlargement
    /// (no area tie-break: the first strict minimiser wins).
    pub(crate) fn choose_subtree(&self, ir: &Rect<D>) -> usize {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.rect().contains(ir) {
                return i;
            }
        }
        let mut best = 0;
        let mut best_enlargement = f64::INFINITY;
        for (i, entry) in self.entries.iter().enumerate() {
            let r = entry.rect();
            let enlargement = r.union_area(ir) - r.area();
            if enlargement < best_enlargement {
                best_enlargement = enlargement;
                best = i;
            }
        }
        best
    }

    /// While `idx+1` exists and is out of order, swap and advance.
    pub(crate) fn order_to_right(&mut self, mut idx: usize) -> usize {
        while idx + 1 < self.entries.len()
            && self.entries[idx + 1].rect().min[0] < self.entries[idx].rect().min[0]
        {
            self.entries.swap(idx, idx + 1);
            idx += 1;
        }
        idx
    }

    /// The symmetric leftward bubble.
    pub(crate) fn order_to_left(&mut self, mut idx: usize) -> usize {
        while idx > 0 && self.entries[idx].rect().min[0] < self.entries[idx - 1].rect().min[0] {
            self.entries.swap(idx, idx - 1);
            idx -= 1;
        }
        idx
    }

    /// "Largest-axis edge snap" split: partitions `self` against
    /// `parent_rect`'s largest axis, rebalances either side up to
    /// [`MIN_ENTRIES`] by donation, and restores (I5) on both halves.
    pub(crate) fn split_largest_axis_edge_snap(
        &mut self,
        parent_rect: &Rect<D>,
        hooks: Option<HooksHandle<P>>,
    ) -> Self {
        let axis = parent_rect.largest_axis();
        let mut right = Self::empty(self.kind, hooks);

        let mut i = 0;
        while i < self.entries.len() {
            let (d_lo, d_hi) = {
                let r = self.entries[i].rect();
                (r.min[axis] - parent_rect.min[axis], parent_rect.max[axis] - r.max[axis])
            };
            if d_lo >= d_hi {
                self.move_entry(i, &mut right);
            } else {
                i += 1;
            }
        }

        if self.entries.len() < MIN_ENTRIES {
            let right_len = right.entries.len();
            right.sort_range(0, right_len, axis, true, false);
            while self.entries.len() < MIN_ENTRIES {
                let last = right.entries.len() - 1;
                right.move_entry(last, self);
            }
        } else if right.entries.len() < MIN_ENTRIES {
            let self_len = self.entries.len();
            self.sort_range(0, self_len, axis, true, true);
            while right.entries.len() < MIN_ENTRIES {
                let last = self.entries.len() - 1;
                self.move_entry(last, &mut right);
            }
        }

        right.sort();
        self.sort();
        right
    }
}

impl<P, const D: usize> Drop for Node<P, D> {
    /// A branch's children are `Arc`s and free themselves (recursively,
    /// through their own `Drop`) as their ref-counts fall to zero; a leaf's
    /// payloads are plain values the tree owns directly, so this is the one
    /// place they're released through the free hook, mirroring the
    /// original's `node_free`.
    fn drop(&mut self) {
        if self.kind != Kind::Leaf {
            return;
        }
        let Some(hooks) = self.hooks.take() else {
            return;
        };
        for entry in self.entries.drain(..) {
            let Entry::Leaf { payload, .. } = entry else {
                unreachable!("leaf node holds only leaf entries");
            };
            hooks.free_payload(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(points: &[(f64, f64)]) -> Node<u32, 2> {
        let mut node = Node::empty(Kind::Leaf, None);
        for (i, &(x, y)) in points.iter().enumerate() {
            node.entries.push(Entry::Leaf { rect: Rect::point([x, y]), payload: i as u32 });
        }
        node
    }

    #[test]
    fn rsearch_finds_first_at_or_past_key() {
        let node = leaf_with(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)]);
        assert_eq!(node.rsearch(5.0), 1);
        assert_eq!(node.rsearch(-1.0), 0);
        assert_eq!(node.rsearch(11.0), 3);
    }

    #[test]
    fn sort_restores_ascending_min0() {
        let mut node = leaf_with(&[(5.0, 0.0), (0.0, 0.0), (10.0, 0.0)]);
        node.sort();
        let mins: Vec<f64> = node.entries.iter().map(|e| e.rect().min[0]).collect();
        assert_eq!(mins, [0.0, 5.0, 10.0]);
    }

    #[test]
    fn split_respects_min_entries_on_both_sides() {
        // 20 points clustered so the naive edge-snap would starve one side.
        let mut node = Node::empty(Kind::Leaf, None);
        for i in 0..20 {
            let x = if i < 18 { 0.0 } else { 100.0 };
            node.entries.push(Entry::Leaf { rect: Rect::point([x, i as f64]), payload: i as u32 });
        }
        let parent_rect = node.rect_calc();
        let right = node.split_largest_axis_edge_snap(&parent_rect, None);
        assert!(node.entries.len() >= MIN_ENTRIES);
        assert!(right.entries.len() >= MIN_ENTRIES);
        assert_eq!(node.entries.len() + right.entries.len(), 20);
    }

    #[test]
    fn min_entries_never_exceeds_half_of_max_entries() {
        assert!(MIN_ENTRIES <= MAX_ENTRIES / 2);
    }
}
