// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only entry views and traversal utilities.

use core::fmt;

use super::attach::{AttachState, Parent, SuppressedChanges};
use super::id::{EntryId, EntryKind, INVALID};
use super::notification::Notification;
use super::store::EntryStore;
use crate::rules::{FilterId, PromoterId, SectionId};

/// A read-only view of one entry in an [`EntryStore`].
///
/// This is what rules, renderers and diagnostics see. Attach-state accessors
/// read the *current* state, which during a pass is the candidate under
/// construction and between passes is the committed result.
#[derive(Clone, Copy)]
pub struct ListEntry<'a> {
    store: &'a EntryStore,
    idx: u32,
}

impl fmt::Debug for ListEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListEntry")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("key", &self.key())
            .field("attach", self.attach_state())
            .finish()
    }
}

impl<'a> ListEntry<'a> {
    pub(crate) fn new(store: &'a EntryStore, idx: u32) -> Self {
        Self { store, idx }
    }

    #[inline]
    fn i(&self) -> usize {
        self.idx as usize
    }

    /// Returns the entry handle.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.store.id_at(self.idx)
    }

    /// Returns whether this is a notification or a group.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.store.kind[self.i()]
    }

    /// Returns whether this is a group.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind() == EntryKind::Group
    }

    /// Returns the notification key, or the group key for groups.
    #[must_use]
    pub fn key(&self) -> &'a str {
        self.store.key[self.i()].as_str()
    }

    /// Returns the notification payload. Always `None` for groups.
    #[must_use]
    pub fn notification(&self) -> Option<&'a Notification> {
        self.store.notification[self.i()].as_ref()
    }

    /// Returns the notification a rule should inspect for this entry.
    ///
    /// Leaves return their own payload. Groups return their attached summary
    /// if they have one, then their first child.
    #[must_use]
    pub fn representative(&self) -> Option<&'a Notification> {
        match self.kind() {
            EntryKind::Notification => self.notification(),
            EntryKind::Group => {
                let summary = self.store.summary[self.i()];
                let first = if summary == INVALID {
                    self.store.children[self.i()].first().copied()?
                } else {
                    summary
                };
                self.store.notification[first as usize].as_ref()
            }
        }
    }

    /// Returns whether upstream removed this entry. Retired entries are
    /// destroyed when the next pass commits.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.store.retired[self.i()]
    }

    /// Returns the group this notification belongs to upstream, regardless of
    /// where it is attached.
    #[must_use]
    pub fn membership_group(&self) -> Option<EntryId> {
        let group = self.store.group_of[self.i()];
        (group != INVALID).then(|| self.store.id_at(group))
    }

    // -- Attach state --

    /// Returns the current attach state.
    #[must_use]
    pub fn attach_state(&self) -> &'a AttachState {
        &self.store.current[self.i()]
    }

    /// Returns the attach state committed by the last pass.
    #[must_use]
    pub fn previous_attach_state(&self) -> &'a AttachState {
        &self.store.previous[self.i()]
    }

    /// Returns the assignments deferred by the stability suppressor.
    #[must_use]
    pub fn suppressed_changes(&self) -> &'a SuppressedChanges {
        &self.attach_state().suppressed_changes
    }

    /// Returns the owning group, or `None` for top-level and detached
    /// entries.
    #[must_use]
    pub fn parent(&self) -> Option<EntryId> {
        self.attach_state().parent.group()
    }

    /// Returns the full parent assignment.
    #[must_use]
    pub fn parent_kind(&self) -> Parent {
        self.attach_state().parent
    }

    /// Returns the rank in the flattened rendered list.
    #[must_use]
    pub fn stable_index(&self) -> Option<u32> {
        self.attach_state().stable_index
    }

    /// Returns the assigned section.
    #[must_use]
    pub fn section(&self) -> Option<SectionId> {
        self.attach_state().section
    }

    /// Returns the filter that excluded this entry.
    #[must_use]
    pub fn excluding_filter(&self) -> Option<FilterId> {
        self.attach_state().excluding_filter
    }

    /// Returns the promoter that lifted this entry to the top level.
    #[must_use]
    pub fn promoter(&self) -> Option<PromoterId> {
        self.attach_state().promoter
    }

    /// Returns the parent the entry is heading for: the deferred parent if
    /// one is held, otherwise the current one.
    #[must_use]
    pub fn pending_parent(&self) -> Parent {
        let shadow = self.suppressed_changes();
        if shadow.parent.is_attached() {
            shadow.parent
        } else {
            self.parent_kind()
        }
    }

    /// Returns the section the entry is heading for.
    #[must_use]
    pub fn pending_section(&self) -> Option<SectionId> {
        self.suppressed_changes().section.or(self.section())
    }

    // -- Group layout --

    /// Returns the attached summary of a group.
    #[must_use]
    pub fn summary(&self) -> Option<EntryId> {
        let summary = self.store.summary[self.i()];
        (summary != INVALID).then(|| self.store.id_at(summary))
    }

    /// Returns the attached children of a group, in render order.
    #[must_use]
    pub fn children(&self) -> Children<'a> {
        Children::new(self.store, &self.store.children[self.i()])
    }

    /// Returns the number of attached children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.store.children[self.i()].len()
    }
}

/// An iterator over the attached children of a group.
///
/// Created by [`ListEntry::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a EntryStore,
    iter: core::slice::Iter<'a, u32>,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a EntryStore, children: &'a [u32]) -> Self {
        Self {
            store,
            iter: children.iter(),
        }
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = ListEntry<'a>;

    fn next(&mut self) -> Option<ListEntry<'a>> {
        self.iter.next().map(|&idx| ListEntry::new(self.store, idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl ExactSizeIterator for Children<'_> {}

/// An iterator over every live entry of a store, in slot order.
///
/// Created by [`EntryStore::entries`].
#[derive(Debug)]
pub struct Entries<'a> {
    store: &'a EntryStore,
    next: u32,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(store: &'a EntryStore) -> Self {
        Self { store, next: 0 }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = ListEntry<'a>;

    fn next(&mut self) -> Option<ListEntry<'a>> {
        while self.next < self.store.len {
            let idx = self.next;
            self.next += 1;
            if self.store.live[idx as usize] {
                return Some(ListEntry::new(self.store, idx));
            }
        }
        None
    }
}
