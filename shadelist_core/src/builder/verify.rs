// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-of-pass consistency checks.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::entry::{EntryId, EntryKind, EntryStore, Parent};

/// A broken attach-state invariant found before commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvariantViolation {
    /// The entry hangs off a group that is not attached at the top level.
    OrphanedChild {
        /// The child.
        entry: EntryId,
        /// The group it claims as parent.
        parent: EntryId,
    },
    /// The entry is attached but has no stable index.
    MissingStableIndex {
        /// The entry.
        entry: EntryId,
    },
    /// The entry is detached but still carries a stable index.
    StaleStableIndex {
        /// The entry.
        entry: EntryId,
        /// The leftover index.
        index: u32,
    },
    /// Two entries share a stable index, or an index is out of range.
    StableIndexConflict {
        /// The second entry claiming the index.
        entry: EntryId,
        /// The index.
        index: u32,
    },
    /// The entry has a section while detached, or none while attached.
    SectionMismatch {
        /// The entry.
        entry: EntryId,
    },
    /// The entry is both excluded and promoted.
    ExcludedAndPromoted {
        /// The entry.
        entry: EntryId,
    },
    /// A group carries a filter or promoter reason.
    GroupWithRuleReason {
        /// The group.
        entry: EntryId,
    },
}

impl InvariantViolation {
    /// Returns the entry the violation was found on.
    #[must_use]
    pub const fn entry(&self) -> EntryId {
        match *self {
            Self::OrphanedChild { entry, .. }
            | Self::MissingStableIndex { entry }
            | Self::StaleStableIndex { entry, .. }
            | Self::StableIndexConflict { entry, .. }
            | Self::SectionMismatch { entry }
            | Self::ExcludedAndPromoted { entry }
            | Self::GroupWithRuleReason { entry } => entry,
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedChild { entry, parent } => {
                write!(f, "{entry:?} is attached to {parent:?}, which is not top-level")
            }
            Self::MissingStableIndex { entry } => {
                write!(f, "{entry:?} is attached without a stable index")
            }
            Self::StaleStableIndex { entry, index } => {
                write!(f, "{entry:?} is detached but keeps stable index {index}")
            }
            Self::StableIndexConflict { entry, index } => {
                write!(f, "{entry:?} claims stable index {index}, which is taken or out of range")
            }
            Self::SectionMismatch { entry } => {
                write!(f, "{entry:?} has a section that disagrees with its attachment")
            }
            Self::ExcludedAndPromoted { entry } => {
                write!(f, "{entry:?} is both excluded and promoted")
            }
            Self::GroupWithRuleReason { entry } => {
                write!(f, "group {entry:?} carries a filter or promoter reason")
            }
        }
    }
}

impl core::error::Error for InvariantViolation {}

/// Checks every live entry's `current` state.
///
/// Returns all violations found; an empty vector means the pass may commit.
pub(crate) fn verify(store: &EntryStore) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let attached = (0..store.len as usize)
        .filter(|&i| store.live[i] && store.current[i].is_attached())
        .count();
    let mut taken = vec![false; attached];

    for idx in 0..store.len {
        let i = idx as usize;
        if !store.live[i] {
            continue;
        }
        let entry = store.id_at(idx);
        let state = &store.current[i];

        match (state.is_attached(), state.stable_index) {
            (true, None) => violations.push(InvariantViolation::MissingStableIndex { entry }),
            (false, Some(index)) => {
                violations.push(InvariantViolation::StaleStableIndex { entry, index });
            }
            (true, Some(index)) => match taken.get_mut(index as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => violations.push(InvariantViolation::StableIndexConflict { entry, index }),
            },
            (false, None) => {}
        }

        if state.is_attached() != state.section.is_some() {
            violations.push(InvariantViolation::SectionMismatch { entry });
        }

        if state.excluding_filter.is_some() && state.promoter.is_some() {
            violations.push(InvariantViolation::ExcludedAndPromoted { entry });
        }

        if store.kind[i] == EntryKind::Group
            && (state.excluding_filter.is_some() || state.promoter.is_some())
        {
            violations.push(InvariantViolation::GroupWithRuleReason { entry });
        }

        if let Parent::Group(parent) = state.parent {
            let parent_ok = store.is_alive(parent)
                && store.kind[parent.idx as usize] == EntryKind::Group
                && store.current[parent.idx as usize].parent == Parent::Root;
            if !parent_ok {
                violations.push(InvariantViolation::OrphanedChild { entry, parent });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Notification;
    use crate::rules::{FilterId, PromoterId, SectionId};

    /// A store holding group `g` with child `x`, both correctly attached.
    fn consistent() -> (EntryStore, EntryId, EntryId) {
        let mut store = EntryStore::new();
        let x = store.post(Notification::new("x").in_group("g"));
        let g = store.group_by_key("g").expect("group");

        let group = &mut store.current[g.idx as usize];
        group.parent = Parent::Root;
        group.stable_index = Some(0);
        group.section = Some(SectionId::DEFAULT);

        let child = &mut store.current[x.idx as usize];
        child.parent = Parent::Group(g);
        child.stable_index = Some(1);
        child.section = Some(SectionId::DEFAULT);
        (store, g, x)
    }

    #[test]
    fn consistent_tree_passes() {
        let (store, _, _) = consistent();
        let violations = verify(&store);
        assert!(violations.is_empty(), "got {violations:?}");
    }

    #[test]
    fn child_of_detached_group_is_orphaned() {
        let (mut store, g, x) = consistent();
        let group = &mut store.current[g.idx as usize];
        group.parent = Parent::Detached;
        group.stable_index = None;
        group.section = None;

        let violations = verify(&store);
        assert!(
            violations.contains(&InvariantViolation::OrphanedChild {
                entry: x,
                parent: g,
            }),
            "got {violations:?}"
        );
    }

    #[test]
    fn detached_entry_with_index_is_stale() {
        let (mut store, _, _) = consistent();
        let y = store.post(Notification::new("y"));
        store.current[y.idx as usize].stable_index = Some(5);
        assert_eq!(
            verify(&store),
            [InvariantViolation::StaleStableIndex { entry: y, index: 5 }]
        );
    }

    #[test]
    fn duplicate_index_conflicts() {
        let (mut store, g, x) = consistent();
        store.current[x.idx as usize].stable_index = Some(0);
        // `x` occupies the lower slot, so the group is the second claimant.
        assert_eq!(
            verify(&store),
            [InvariantViolation::StableIndexConflict { entry: g, index: 0 }]
        );
    }

    #[test]
    fn rule_reasons_are_checked() {
        let (mut store, g, x) = consistent();
        store.current[g.idx as usize].promoter = Some(PromoterId(0));
        let child = &mut store.current[x.idx as usize];
        child.excluding_filter = Some(FilterId(0));
        child.promoter = Some(PromoterId(0));

        let violations = verify(&store);
        assert!(violations.contains(&InvariantViolation::GroupWithRuleReason { entry: g }));
        assert!(violations.contains(&InvariantViolation::ExcludedAndPromoted { entry: x }));
    }

    #[test]
    fn attached_without_section_mismatches() {
        let (mut store, _, x) = consistent();
        store.current[x.idx as usize].section = None;
        assert_eq!(verify(&store), [InvariantViolation::SectionMismatch { entry: x }]);
    }

    #[test]
    fn display_names_the_entry() {
        let (_, g, x) = consistent();
        let text = alloc::format!("{}", InvariantViolation::OrphanedChild { entry: x, parent: g });
        assert!(text.contains("not top-level"), "got {text}");
    }
}
