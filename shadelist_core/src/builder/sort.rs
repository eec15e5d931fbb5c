// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stable ordering and stable-index assignment.
//!
//! Top-level entries order by
//! `(section, [unstable: previous index], comparators, previous index, arrival)`
//! and group children by
//! `([unstable: previous index], child comparator, arrival)`.
//!
//! A missing previous index ranks after any present one, so entries already
//! on screen stay ahead of newcomers under equal keys. Arrival order is
//! unique, which makes both orders total.
//!
//! With the `std` feature a comparator that panics (or one that is not a
//! total order and trips the slice sort) is recorded as a [`RuleFailure`],
//! and that list is re-sorted without comparators.

use core::cmp::Ordering;
use core::mem;

use alloc::vec::Vec;

use super::ListBuilder;
use crate::entry::{EntryKind, EntryStore, INVALID, ListEntry};
use crate::rules::{RuleError, RuleFailure, RuleRef, RuleRegistry};

/// Orders two optional previous indices; `None` ranks last.
fn cmp_previous(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Compares two top-level candidates. Without `rules` the comparators are
/// skipped.
fn cmp_top_level(
    store: &EntryStore,
    rules: Option<&RuleRegistry>,
    unstable: bool,
    a: u32,
    b: u32,
) -> Ordering {
    let (ai, bi) = (a as usize, b as usize);
    let prev_a = store.previous[ai].stable_index;
    let prev_b = store.previous[bi].stable_index;
    store.current[ai]
        .section
        .cmp(&store.current[bi].section)
        .then_with(|| {
            if unstable {
                cmp_previous(prev_a, prev_b)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| {
            rules.map_or(Ordering::Equal, |rules| {
                rules.compare_top_level(&ListEntry::new(store, a), &ListEntry::new(store, b))
            })
        })
        .then_with(|| cmp_previous(prev_a, prev_b))
        .then_with(|| store.arrival[ai].cmp(&store.arrival[bi]))
}

/// Compares two children of the same group. Without `rules` the child
/// comparator is skipped.
fn cmp_children(
    store: &EntryStore,
    rules: Option<&RuleRegistry>,
    unstable: bool,
    a: u32,
    b: u32,
) -> Ordering {
    let (ai, bi) = (a as usize, b as usize);
    let previous = || {
        if unstable {
            cmp_previous(store.previous[ai].stable_index, store.previous[bi].stable_index)
        } else {
            Ordering::Equal
        }
    };
    previous()
        .then_with(|| {
            rules.map_or(Ordering::Equal, |rules| {
                rules.compare_children(&ListEntry::new(store, a), &ListEntry::new(store, b))
            })
        })
        .then_with(|| store.arrival[ai].cmp(&store.arrival[bi]))
}

/// Sorts `slots` by `cmp`, falling back to `fallback` if `cmp` panics.
///
/// Returns the slot that was being compared when the panic happened.
#[cfg(feature = "std")]
fn sort_guarded(
    slots: &mut [u32],
    mut cmp: impl FnMut(u32, u32) -> Ordering,
    mut fallback: impl FnMut(u32, u32) -> Ordering,
) -> Option<u32> {
    let mut last = None;
    let sorted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        slots.sort_by(|&a, &b| {
            last = Some(a);
            cmp(a, b)
        });
    }));
    if sorted.is_ok() {
        return None;
    }
    slots.sort_by(|&a, &b| fallback(a, b));
    last
}

#[cfg(not(feature = "std"))]
fn sort_guarded(
    slots: &mut [u32],
    mut cmp: impl FnMut(u32, u32) -> Ordering,
    fallback: impl FnMut(u32, u32) -> Ordering,
) -> Option<u32> {
    _ = fallback;
    slots.sort_by(|&a, &b| cmp(a, b));
    None
}

impl ListBuilder {
    /// Sorts the top level and every attached group, then assigns stable
    /// indices in flattened order (group, summary, children).
    ///
    /// Returns the number of attached entries.
    pub(super) fn sort(&mut self, failures: &mut Vec<RuleFailure>) -> usize {
        let unstable = self.suppressor.is_unstable();
        let Self {
            store,
            rules,
            scratch,
            ..
        } = self;
        let rules: &RuleRegistry = rules;

        {
            let store: &EntryStore = store;
            let panicked = sort_guarded(
                &mut scratch.top,
                |a, b| cmp_top_level(store, Some(rules), unstable, a, b),
                |a, b| cmp_top_level(store, None, unstable, a, b),
            );
            if let Some(slot) = panicked {
                failures.push(RuleFailure {
                    entry: store.id_at(slot),
                    rule: RuleRef::Comparator,
                    error: RuleError::Panicked,
                });
            }
        }

        let mut next = 0_u32;
        for &top in &scratch.top {
            let t = top as usize;
            store.current[t].stable_index = Some(next);
            next += 1;
            if store.kind[t] != EntryKind::Group {
                continue;
            }

            let summary = store.summary[t];
            if summary != INVALID {
                store.current[summary as usize].stable_index = Some(next);
                next += 1;
            }

            let mut children = mem::take(&mut store.children[t]);
            let view: &EntryStore = store;
            let panicked = sort_guarded(
                &mut children,
                |a, b| cmp_children(view, Some(rules), unstable, a, b),
                |a, b| cmp_children(view, None, unstable, a, b),
            );
            if let Some(slot) = panicked {
                failures.push(RuleFailure {
                    entry: view.id_at(slot),
                    rule: RuleRef::ChildComparator,
                    error: RuleError::Panicked,
                });
            }
            for &child in &children {
                store.current[child as usize].stable_index = Some(next);
                next += 1;
            }
            store.children[t] = children;
        }
        next as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_previous_index_ranks_last() {
        assert_eq!(cmp_previous(Some(4), None), Ordering::Less);
        assert_eq!(cmp_previous(None, Some(0)), Ordering::Greater);
        assert_eq!(cmp_previous(Some(1), Some(2)), Ordering::Less);
        assert_eq!(cmp_previous(None, None), Ordering::Equal);
    }
}
