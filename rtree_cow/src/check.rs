// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The invariant checker. Not asked for by the distilled spec directly, but
//! present in the original as `rtree_check`/`node_check_order`/
//! `node_check_rect` and exactly what the testable-properties scenarios and
//! property tests need to assert against after every mutation.

use core::fmt;

use crate::node::{Entry, Kind, Node};
use crate::rect::Rect;

/// A violated structural invariant, as found by [`Tree::check_invariants`](crate::Tree::check_invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CheckError {
    /// (I5): some node's entries are not non-decreasing by `min[0]`.
    OutOfOrder,
    /// (I3): some branch entry's stored rect doesn't equal the exact union
    /// of its child's entries.
    RectMismatch,
    /// A node had to be bounded but held no entries at all.
    EmptyRectCalc,
    /// (I4): the leftmost root-to-leaf path's length didn't match `height`.
    HeightMismatch,
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder => f.write_str("node entries are not sorted by min[0]"),
            Self::RectMismatch => f.write_str("branch rect does not equal its child's rect_calc"),
            Self::EmptyRectCalc => f.write_str("rect_calc requested on an empty node"),
            Self::HeightMismatch => f.write_str("leftmost root-to-leaf path length != tree height"),
        }
    }
}

impl core::error::Error for CheckError {}

pub(crate) fn check_order<P, const D: usize>(node: &Node<P, D>) -> Result<(), CheckError> {
    for i in 1..node.entries.len() {
        if node.entries[i].rect().min[0] < node.entries[i - 1].rect().min[0] {
            return Err(CheckError::OutOfOrder);
        }
    }
    if node.kind == Kind::Branch {
        for entry in &node.entries {
            if let Entry::Branch { child, .. } = entry {
                check_order(child)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn check_rect<P, const D: usize>(rect: &Rect<D>, node: &Node<P, D>) -> Result<(), CheckError> {
    let calculated = node.try_rect_calc().ok_or(CheckError::EmptyRectCalc)?;
    if !rect.equals(&calculated) {
        return Err(CheckError::RectMismatch);
    }
    if node.kind == Kind::Branch {
        for entry in &node.entries {
            if let Entry::Branch { rect, child } = entry {
                check_rect(rect, child)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn leftmost_height<P, const D: usize>(node: &Node<P, D>) -> Result<usize, CheckError> {
    match node.kind {
        Kind::Leaf => Ok(1),
        Kind::Branch => {
            let first = node.entries.first().ok_or(CheckError::HeightMismatch)?;
            let Entry::Branch { child, .. } = first else {
                unreachable!("branch node holds only branch entries");
            };
            Ok(1 + leftmost_height(child)?)
        }
    }
}
