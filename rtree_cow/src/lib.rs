// Copyright 2025 the rtree_cow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory, multi-dimensional R-tree with copy-on-write node sharing.
//!
//! [`Tree`] indexes `D`-dimensional axis-aligned rectangles (or points, as
//! degenerate rectangles) against arbitrary payloads, and supports:
//!
//! - [`Tree::insert`] and [`Tree::delete`] / [`Tree::delete_eq`]
//! - [`Tree::search`] for rectangle-intersection queries
//! - [`Tree::scan`] for an unfiltered walk of every entry
//! - an O(1) [`Clone`] that shares structure until the next mutation
//!   privatises the part of the tree it touches
//!
//! ```
//! use rtree_cow::Tree;
//!
//! let mut tree: Tree<&'static str, 2> = Tree::new();
//! tree.insert([0.0, 0.0], Some([1.0, 1.0]), "a").unwrap();
//! tree.insert([5.0, 5.0], None, "b").unwrap();
//!
//! let snapshot = tree.clone();
//! tree.delete_eq([0.0, 0.0], Some([1.0, 1.0]), &"a").unwrap();
//!
//! assert_eq!(tree.count(), 1);
//! assert_eq!(snapshot.count(), 2);
//! ```
//!
//! Payloads that need more than a bitwise copy (reference-counted handles,
//! resources with external teardown) can install [`PayloadHooks`] via
//! [`Tree::set_payload_hooks`] to customize how clone-on-write and deletion
//! treat them.

#![no_std]

extern crate alloc;

mod check;
mod cow;
mod error;
mod node;
mod rect;
mod tree;

pub use check::CheckError;
pub use cow::{Allocator, GlobalAllocator, HooksHandle, PayloadHooks};
pub use error::TreeError;
pub use rect::Rect;
pub use tree::Tree;
