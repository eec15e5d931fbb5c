// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-entry attach state.
//!
//! Every entry owns two [`AttachState`] records: `previous`, the state
//! committed by the last pass, and `current`, the candidate being built by
//! the running pass. Both are plain `Copy` records that are mutated in place:
//! [`AttachState::reset`] clears one at the start of a pass and
//! [`Clone::clone_from`] snapshots `current` into `previous` at commit (or
//! `previous` back into `current` when a pass is rolled back).
//!
//! Each record carries a [`SuppressedChanges`] shadow holding what the pass
//! would have assigned had the stability suppressor not deferred it.

use super::id::EntryId;
use crate::rules::{FilterId, PromoterId, SectionId};

/// Where an entry hangs in the rendered tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Parent {
    /// Not part of the rendered list.
    #[default]
    Detached,
    /// A top-level entry.
    Root,
    /// A child (or the summary) of the given group.
    Group(EntryId),
}

impl Parent {
    /// Returns the owning group, if any.
    #[inline]
    #[must_use]
    pub const fn group(self) -> Option<EntryId> {
        match self {
            Self::Group(id) => Some(id),
            Self::Detached | Self::Root => None,
        }
    }

    /// Returns whether this places the entry in the rendered list.
    #[inline]
    #[must_use]
    pub const fn is_attached(self) -> bool {
        !matches!(self, Self::Detached)
    }
}

/// The assignment a pass would have made had suppression not intervened.
///
/// Has the same fields as [`AttachState`]. A field holding its reset value
/// means nothing was deferred for it. Stable index and exclusion are never
/// deferred, so those two stay `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SuppressedChanges {
    /// The parent the entry would have moved to.
    pub parent: Parent,
    /// Unused; see the type docs.
    pub stable_index: Option<u32>,
    /// The section the entry would have moved to.
    pub section: Option<SectionId>,
    /// Unused; see the type docs.
    pub excluding_filter: Option<FilterId>,
    /// The promoter that would have applied alongside a deferred parent.
    pub promoter: Option<PromoterId>,
}

impl SuppressedChanges {
    /// Clears every deferred field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns whether nothing is deferred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns whether `state` already carries every deferred assignment.
    ///
    /// Used after an unstable window closes to tell whether the fresh pass
    /// applied exactly what had been held back.
    #[must_use]
    pub fn matches(&self, state: &AttachState) -> bool {
        let parent_ok = match self.parent {
            Parent::Detached => true,
            parent => state.parent == parent && state.promoter == self.promoter,
        };
        let section_ok = self.section.is_none() || state.section == self.section;
        parent_ok && section_ok
    }
}

/// Where and why an entry sits in the rendered list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttachState {
    /// The entry's parent.
    pub parent: Parent,
    /// Rank in the flattened rendered list; `None` while unattached.
    pub stable_index: Option<u32>,
    /// The section the entry was sorted into. Children carry their group's
    /// section. `None` while unattached.
    pub section: Option<SectionId>,
    /// The filter excluding this entry. Always `None` for groups.
    pub excluding_filter: Option<FilterId>,
    /// The promoter that lifted this entry to the top level. Always `None`
    /// for groups.
    pub promoter: Option<PromoterId>,
    /// Assignments deferred by the stability suppressor this pass.
    pub suppressed_changes: SuppressedChanges,
}

impl AttachState {
    /// Creates a clean, unattached state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parent: Parent::Detached,
            stable_index: None,
            section: None,
            excluding_filter: None,
            promoter: None,
            suppressed_changes: SuppressedChanges {
                parent: Parent::Detached,
                stable_index: None,
                section: None,
                excluding_filter: None,
                promoter: None,
            },
        }
    }

    /// Resets back to the state produced by [`new`](Self::new), shadow
    /// included.
    pub fn reset(&mut self) {
        self.parent = Parent::Detached;
        self.stable_index = None;
        self.section = None;
        self.excluding_filter = None;
        self.promoter = None;
        self.suppressed_changes.reset();
    }

    /// Returns whether the entry is part of the rendered list.
    #[inline]
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.parent.is_attached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> EntryId {
        EntryId {
            idx: 3,
            generation: 1,
        }
    }

    fn populated() -> AttachState {
        AttachState {
            parent: Parent::Group(sample_id()),
            stable_index: Some(4),
            section: Some(SectionId(1)),
            excluding_filter: None,
            promoter: Some(PromoterId(0)),
            suppressed_changes: SuppressedChanges {
                parent: Parent::Root,
                section: Some(SectionId(2)),
                promoter: Some(PromoterId(1)),
                ..SuppressedChanges::default()
            },
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut fresh = AttachState::new();
        fresh.reset();
        let mut twice = populated();
        twice.reset();
        twice.reset();
        assert_eq!(fresh, AttachState::new());
        assert_eq!(twice, fresh);
        assert_eq!(AttachState::new(), AttachState::default());
    }

    #[test]
    fn reset_clears_the_shadow() {
        let mut state = populated();
        state.reset();
        assert!(state.suppressed_changes.is_empty());
        assert!(!state.is_attached());
        assert_eq!(state.stable_index, None);
    }

    #[test]
    fn clone_from_copies_fields_and_shadow() {
        let source = populated();
        let mut target = AttachState::new();
        target.clone_from(&source);
        assert_eq!(target, source);
        assert_eq!(target.suppressed_changes.parent, Parent::Root);
    }

    #[test]
    fn clone_from_is_not_aliased() {
        let mut source = populated();
        let mut target = AttachState::new();
        target.clone_from(&source);

        source.reset();
        source.suppressed_changes.section = Some(SectionId(9));

        assert_eq!(target, populated());
    }

    #[test]
    fn shadow_matches_applied_state() {
        let shadow = SuppressedChanges {
            parent: Parent::Root,
            promoter: Some(PromoterId(0)),
            ..SuppressedChanges::default()
        };
        let mut applied = AttachState::new();
        applied.parent = Parent::Root;
        applied.promoter = Some(PromoterId(0));
        assert!(shadow.matches(&applied));

        applied.promoter = None;
        assert!(!shadow.matches(&applied), "promoter differs");
    }

    #[test]
    fn empty_shadow_matches_anything() {
        assert!(SuppressedChanges::default().matches(&populated()));
        assert!(SuppressedChanges::default().matches(&AttachState::new()));
    }

    #[test]
    fn parent_accessors() {
        assert_eq!(Parent::Group(sample_id()).group(), Some(sample_id()));
        assert_eq!(Parent::Root.group(), None);
        assert!(Parent::Root.is_attached());
        assert!(!Parent::Detached.is_attached());
    }
}
