// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer contract for renderers.
//!
//! `shadelist_core` owns the entry model, the rules and the pass pipeline.
//! Whatever draws the list (a view hierarchy, a terminal dump, a test
//! double) implements [`ListRenderer`] and is handed every committed pass.
//!
//! Renderers that only need the flattened row order can use
//! [`flatten_into`], which walks the committed list in stable-index order.

use alloc::vec::Vec;

use crate::builder::{ListBuilder, PassReport};
use crate::entry::{EntryId, ListEntry};

/// Applies a committed pass to a rendered list.
///
/// # Pass loop pseudocode
///
/// ```rust,ignore
/// fn on_upstream(events: Vec<ChangeEvent>) {
///     builder.enqueue_all(events);
///     if !builder.needs_build() {
///         return;
///     }
///     match builder.build_list(clock.now_ms(), &mut tracer) {
///         // Present: read the committed list and the per-pass delta
///         Ok(report) => renderer.apply(&builder, &report),
///         // Rolled back: the previous list is still on screen
///         Err(err) => log(err),
///     }
/// }
/// ```
pub trait ListRenderer {
    /// Applies the pass described by `report`, reading the committed list
    /// from `builder` as needed.
    fn apply(&mut self, builder: &ListBuilder, report: &PassReport);
}

/// One rendered row of the flattened list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Row {
    /// The entry drawn in this row.
    pub entry: EntryId,
    /// `0` for top-level rows, `1` for group summaries and children.
    pub depth: u8,
    /// The entry's stable index.
    pub stable_index: u32,
}

/// Appends the committed list to `out` as rows, in stable-index order.
///
/// Each group is followed by its summary and then its children.
pub fn flatten_into(builder: &ListBuilder, out: &mut Vec<Row>) {
    let row = |entry: ListEntry<'_>, depth: u8| Row {
        entry: entry.id(),
        depth,
        stable_index: entry.stable_index().unwrap_or(u32::MAX),
    };
    for top in builder.shade_list() {
        out.push(row(top, 0));
        if let Some(summary) = top.summary().and_then(|id| builder.entry(id)) {
            out.push(row(summary, 1));
        }
        out.extend(top.children().map(|child| row(child, 1)));
    }
}
