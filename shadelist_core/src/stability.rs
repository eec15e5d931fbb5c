// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visual stability suppression.
//!
//! While an *unstable window* is open (for example while the user drags the
//! shade), structural changes that would make rows jump are deferred. The
//! builder proposes each change to the [`Suppressor`]; a refused change keeps
//! the entry's previous placement and records the proposal in the entry's
//! [`SuppressedChanges`](crate::entry::SuppressedChanges) shadow.
//!
//! Which changes count as disruptive is configured with a
//! [`DisruptionPolicy`]. Pure reordering inside the same parent and section
//! is never suppressed here; the sort stage keeps previous order instead.

/// A structural change the builder may want to apply to an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The entry moves into, out of, or between groups.
    Reparent,
    /// The entry gains or loses a promoter while its parent changes.
    Promotion,
    /// The entry moves to another section.
    SectionMove,
}

impl ChangeKind {
    /// All change kinds, in pipeline order.
    pub const ALL: [Self; 3] = [Self::Reparent, Self::Promotion, Self::SectionMove];

    /// Bit used for this kind in a [`ChangeSet`].
    const fn bit(self) -> u8 {
        match self {
            Self::Reparent => 1,
            Self::Promotion => 2,
            Self::SectionMove => 4,
        }
    }
}

/// A small set of [`ChangeKind`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChangeSet(u8);

impl ChangeSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Adds a kind.
    pub fn insert(&mut self, kind: ChangeKind) {
        self.0 |= kind.bit();
    }

    /// Returns the kinds in either set.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns whether `kind` is in the set.
    #[must_use]
    pub const fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the contained kinds in pipeline order.
    pub fn iter(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |&k| self.contains(k))
    }
}

impl From<ChangeKind> for ChangeSet {
    fn from(kind: ChangeKind) -> Self {
        Self(kind.bit())
    }
}

/// Which structural changes are visually disruptive.
///
/// Only disruptive changes are deferred during an unstable window. The
/// default treats every kind as disruptive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisruptionPolicy {
    /// Moving an entry into, out of, or between groups.
    pub reparent: bool,
    /// Promoting a group child to the top level, or demoting it back.
    pub promotion: bool,
    /// Moving a top-level entry to another section.
    pub section_move: bool,
}

impl DisruptionPolicy {
    /// Every change kind is disruptive.
    pub const ALL: Self = Self {
        reparent: true,
        promotion: true,
        section_move: true,
    };

    /// Nothing is disruptive; suppression never applies.
    pub const NONE: Self = Self {
        reparent: false,
        promotion: false,
        section_move: false,
    };

    /// Returns whether `kind` is disruptive under this policy.
    #[must_use]
    pub const fn is_disruptive(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Reparent => self.reparent,
            ChangeKind::Promotion => self.promotion,
            ChangeKind::SectionMove => self.section_move,
        }
    }
}

impl Default for DisruptionPolicy {
    fn default() -> Self {
        Self::ALL
    }
}

/// Decides, per proposed change, whether it may be applied now.
#[derive(Clone, Copy, Debug, Default)]
pub struct Suppressor {
    policy: DisruptionPolicy,
    unstable: bool,
}

impl Suppressor {
    /// Creates a suppressor with the window closed.
    #[must_use]
    pub const fn new(policy: DisruptionPolicy) -> Self {
        Self {
            policy,
            unstable: false,
        }
    }

    /// Opens or closes the unstable window.
    pub fn set_unstable_window(&mut self, unstable: bool) {
        self.unstable = unstable;
    }

    /// Returns whether the unstable window is open.
    #[must_use]
    pub const fn is_unstable(&self) -> bool {
        self.unstable
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> DisruptionPolicy {
        self.policy
    }

    /// Returns whether a change of `kind` may be applied now.
    #[must_use]
    pub const fn allows(&self, kind: ChangeKind) -> bool {
        !(self.unstable && self.policy.is_disruptive(kind))
    }

    /// Returns whether every change in `changes` may be applied now.
    #[must_use]
    pub fn allows_all(&self, changes: ChangeSet) -> bool {
        changes.iter().all(|kind| self.allows(kind))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn stable_window_allows_everything() {
        let suppressor = Suppressor::new(DisruptionPolicy::ALL);
        for kind in ChangeKind::ALL {
            assert!(suppressor.allows(kind), "{kind:?} allowed while stable");
        }
    }

    #[test]
    fn unstable_window_defers_disruptive_kinds_only() {
        let mut suppressor = Suppressor::new(DisruptionPolicy {
            section_move: false,
            ..DisruptionPolicy::ALL
        });
        suppressor.set_unstable_window(true);
        assert!(suppressor.is_unstable());
        assert!(!suppressor.allows(ChangeKind::Reparent));
        assert!(!suppressor.allows(ChangeKind::Promotion));
        assert!(suppressor.allows(ChangeKind::SectionMove));

        suppressor.set_unstable_window(false);
        assert!(suppressor.allows(ChangeKind::Reparent));
    }

    #[test]
    fn permissive_policy_never_suppresses() {
        let mut suppressor = Suppressor::new(DisruptionPolicy::NONE);
        suppressor.set_unstable_window(true);
        let mut all = ChangeSet::EMPTY;
        for kind in ChangeKind::ALL {
            all.insert(kind);
        }
        assert!(suppressor.allows_all(all));
    }

    #[test]
    fn change_set_iterates_in_pipeline_order() {
        let mut set = ChangeSet::from(ChangeKind::SectionMove);
        set.insert(ChangeKind::Reparent);
        let kinds: Vec<ChangeKind> = set.iter().collect();
        assert_eq!(kinds, [ChangeKind::Reparent, ChangeKind::SectionMove]);
        assert!(!set.contains(ChangeKind::Promotion));
        assert!(ChangeSet::EMPTY.is_empty());
        let merged = set.union(ChangeKind::Promotion.into());
        assert_eq!(merged.iter().count(), 3);
    }

    #[test]
    fn default_policy_is_all() {
        assert_eq!(DisruptionPolicy::default(), DisruptionPolicy::ALL);
    }
}
