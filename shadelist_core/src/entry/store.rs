// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays entry storage with allocation, membership and attach-state
//! management.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::attach::AttachState;
use super::id::{EntryId, EntryKind, INVALID};
use super::notification::Notification;
use super::view::{Entries, ListEntry};
use crate::dirty;

/// Struct-of-arrays storage for every entry known to the builder.
///
/// Entries are addressed by [`EntryId`] handles. Each entry occupies a slot in
/// parallel arrays. Destroyed entries are recycled via a free list, and
/// generation counters prevent stale handle access.
///
/// Upstream removals only *retire* a slot: the entry drops out of the next
/// pass but keeps its slot (and its place in the committed list) until that
/// pass commits.
#[derive(Debug)]
pub struct EntryStore {
    // -- Identity --
    pub(crate) kind: Vec<EntryKind>,
    pub(crate) key: Vec<String>,
    pub(crate) notification: Vec<Option<Notification>>,
    pub(crate) arrival: Vec<u64>,

    // -- Membership (maintained from upstream events) --
    pub(crate) group_of: Vec<u32>,
    pub(crate) member_count: Vec<u32>,

    // -- Group layout (written by each pass) --
    pub(crate) children: Vec<Vec<u32>>,
    pub(crate) summary: Vec<u32>,
    pub(crate) committed_children: Vec<Vec<u32>>,
    pub(crate) committed_summary: Vec<u32>,

    // -- Attach state (double-buffered) --
    pub(crate) previous: Vec<AttachState>,
    pub(crate) current: Vec<AttachState>,
    pub(crate) suppressed_streak: Vec<u32>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) live: Vec<bool>,
    pub(crate) retired: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,
    next_arrival: u64,

    // -- Lookup --
    by_key: HashMap<String, u32>,
    groups_by_key: HashMap<String, u32>,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<EntryId>,
    pub(crate) pending_removed: Vec<EntryId>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: Vec::new(),
            key: Vec::new(),
            notification: Vec::new(),
            arrival: Vec::new(),
            group_of: Vec::new(),
            member_count: Vec::new(),
            children: Vec::new(),
            summary: Vec::new(),
            committed_children: Vec::new(),
            committed_summary: Vec::new(),
            previous: Vec::new(),
            current: Vec::new(),
            suppressed_streak: Vec::new(),
            generation: Vec::new(),
            live: Vec::new(),
            retired: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            next_arrival: 0,
            by_key: HashMap::new(),
            groups_by_key: HashMap::new(),
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
        }
    }

    // -- Upstream API --

    /// Posts a notification and returns its entry handle.
    ///
    /// A new key allocates a leaf entry (and its group, if the group key is
    /// new). A known key updates the payload in place, moving the entry
    /// between groups when the group key changed.
    pub fn post(&mut self, notification: Notification) -> EntryId {
        if let Some(&idx) = self.by_key.get(notification.key.as_str()) {
            self.update(idx, notification);
            return self.id_at(idx);
        }

        let idx = self.create_slot(EntryKind::Notification, notification.key.clone());
        self.by_key.insert(notification.key.clone(), idx);
        if let Some(group_key) = &notification.group_key {
            self.join_group(idx, group_key);
        }
        let is_summary = notification.is_group_summary;
        self.notification[idx as usize] = Some(notification);
        self.mark_content(idx, is_summary);
        self.id_at(idx)
    }

    /// Retires the entry with the given key.
    ///
    /// The entry leaves its group immediately and is destroyed when the next
    /// pass commits. Returns `None` for unknown keys.
    pub fn remove(&mut self, key: &str) -> Option<EntryId> {
        let idx = self.by_key.remove(key)?;
        self.leave_group(idx);
        self.retired[idx as usize] = true;
        self.dirty.mark(idx, dirty::MEMBERSHIP);
        Some(self.id_at(idx))
    }

    // -- Query API --

    /// Returns whether the given handle refers to a live entry.
    ///
    /// Retired entries stay alive until the pass that drops them commits.
    #[must_use]
    pub fn is_alive(&self, id: EntryId) -> bool {
        id.idx < self.len
            && self.generation[id.idx as usize] == id.generation
            && self.live[id.idx as usize]
    }

    /// Returns a read-only view of an entry, or `None` for a stale handle.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<ListEntry<'_>> {
        self.is_alive(id).then(|| ListEntry::new(self, id.idx))
    }

    /// Returns a read-only view of an entry.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> ListEntry<'_> {
        self.validate(id);
        ListEntry::new(self, id.idx)
    }

    /// Looks up a notification entry by key.
    #[must_use]
    pub fn by_key(&self, key: &str) -> Option<EntryId> {
        self.by_key.get(key).map(|&idx| self.id_at(idx))
    }

    /// Looks up a group entry by group key.
    #[must_use]
    pub fn group_by_key(&self, group_key: &str) -> Option<EntryId> {
        self.groups_by_key.get(group_key).map(|&idx| self.id_at(idx))
    }

    /// Returns the number of live entries, groups included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.iter().filter(|&&live| live).count()
    }

    /// Returns whether the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.live.iter().any(|&live| live)
    }

    /// Returns an iterator over all live entries in slot order.
    #[must_use]
    pub fn entries(&self) -> Entries<'_> {
        Entries::new(self)
    }

    // -- Crate-internal helpers for the builder --

    /// Builds a handle for a live slot.
    pub(crate) fn id_at(&self, idx: u32) -> EntryId {
        EntryId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns whether the slot takes part in the next pass.
    pub(crate) fn is_active(&self, idx: u32) -> bool {
        self.live[idx as usize] && !self.retired[idx as usize]
    }

    /// Returns whether `id` names a group that takes part in the next pass.
    pub(crate) fn is_active_group(&self, id: EntryId) -> bool {
        self.is_alive(id)
            && !self.retired[id.idx as usize]
            && self.kind[id.idx as usize] == EntryKind::Group
    }

    /// Fills `out` with the active entries of `kind`, in arrival order.
    pub(crate) fn collect_active(&self, kind: EntryKind, out: &mut Vec<u32>) {
        out.clear();
        out.extend((0..self.len).filter(|&idx| {
            self.is_active(idx) && self.kind[idx as usize] == kind
        }));
        out.sort_unstable_by_key(|&idx| self.arrival[idx as usize]);
    }

    /// Restores every `current` state and group layout from the last commit.
    pub(crate) fn roll_back(&mut self) {
        for i in 0..self.len as usize {
            if !self.live[i] {
                continue;
            }
            self.current[i].clone_from(&self.previous[i]);
            self.children[i].clone_from(&self.committed_children[i]);
            self.summary[i] = self.committed_summary[i];
        }
    }

    /// Snapshots every `current` state and group layout as committed.
    pub(crate) fn commit(&mut self) {
        for i in 0..self.len as usize {
            if !self.live[i] {
                continue;
            }
            self.previous[i].clone_from(&self.current[i]);
            self.committed_children[i].clone_from(&self.children[i]);
            self.committed_summary[i] = self.summary[i];
        }
    }

    /// Destroys retired notifications and groups left with no members and no
    /// attachment.
    ///
    /// Must run after [`commit`](Self::commit): a group emptied upstream may
    /// still be attached when suppression kept a child in it.
    pub(crate) fn destroy_retired(&mut self) {
        for idx in 0..self.len {
            let i = idx as usize;
            if !self.live[i] {
                continue;
            }
            let doomed = match self.kind[i] {
                EntryKind::Notification => self.retired[i],
                EntryKind::Group => self.member_count[i] == 0 && !self.current[i].is_attached(),
            };
            if doomed {
                if self.kind[i] == EntryKind::Group {
                    self.groups_by_key.remove(self.key[i].as_str());
                }
                self.free_slot(idx);
            }
        }
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    fn validate(&self, id: EntryId) {
        assert!(
            self.is_alive(id),
            "stale EntryId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    /// Allocates a slot in its clean state.
    fn create_slot(&mut self, kind: EntryKind, key: String) -> u32 {
        let arrival = self.next_arrival;
        self.next_arrival += 1;

        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot; its generation was bumped on free.
            let i = idx as usize;
            self.kind[i] = kind;
            self.key[i] = key;
            self.notification[i] = None;
            self.arrival[i] = arrival;
            self.group_of[i] = INVALID;
            self.member_count[i] = 0;
            self.children[i].clear();
            self.summary[i] = INVALID;
            self.committed_children[i].clear();
            self.committed_summary[i] = INVALID;
            self.previous[i].reset();
            self.current[i].reset();
            self.suppressed_streak[i] = 0;
            self.live[i] = true;
            self.retired[i] = false;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.kind.push(kind);
            self.key.push(key);
            self.notification.push(None);
            self.arrival.push(arrival);
            self.group_of.push(INVALID);
            self.member_count.push(0);
            self.children.push(Vec::new());
            self.summary.push(INVALID);
            self.committed_children.push(Vec::new());
            self.committed_summary.push(INVALID);
            self.previous.push(AttachState::new());
            self.current.push(AttachState::new());
            self.suppressed_streak.push(0);
            self.generation.push(0);
            self.live.push(true);
            self.retired.push(false);
            idx
        };

        self.pending_added.push(self.id_at(idx));
        self.dirty.mark(idx, dirty::MEMBERSHIP);
        idx
    }

    /// Frees a slot for reuse.
    fn free_slot(&mut self, idx: u32) {
        let i = idx as usize;
        let id = self.id_at(idx);

        self.dirty.remove_key(idx);

        // Bump generation so old handles immediately fail validation.
        self.generation[i] += 1;
        self.live[i] = false;
        self.retired[i] = false;
        self.notification[i] = None;
        self.key[i].clear();

        self.free_list.push(idx);
        self.pending_removed.push(id);
    }

    /// Replaces the payload of an existing notification.
    fn update(&mut self, idx: u32, notification: Notification) {
        let i = idx as usize;
        let regrouped = self.notification[i]
            .as_ref()
            .is_none_or(|old| old.group_key != notification.group_key);
        if regrouped {
            self.leave_group(idx);
            if let Some(group_key) = &notification.group_key {
                self.join_group(idx, group_key);
            }
            self.dirty.mark(idx, dirty::MEMBERSHIP);
        }
        let is_summary = notification.is_group_summary;
        self.notification[i] = Some(notification);
        self.mark_content(idx, is_summary);
    }

    /// Marks a content change; a summary also dirties its group's members.
    fn mark_content(&mut self, idx: u32, is_summary: bool) {
        self.dirty.mark(idx, dirty::CONTENT);
        let group = self.group_of[idx as usize];
        if is_summary && group != INVALID {
            self.dirty.mark_with(group, dirty::CONTENT, &EagerPolicy);
        }
    }

    /// Adds a notification to the group with `group_key`, creating the group
    /// on first use.
    fn join_group(&mut self, idx: u32, group_key: &str) {
        let group = match self.groups_by_key.get(group_key) {
            Some(&group) => group,
            None => {
                let group = self.create_slot(EntryKind::Group, String::from(group_key));
                self.groups_by_key.insert(String::from(group_key), group);
                group
            }
        };
        self.group_of[idx as usize] = group;
        self.member_count[group as usize] += 1;

        // Members depend on their group for CONTENT.
        let _ = self.dirty.add_dependency(idx, group, dirty::CONTENT);
        self.dirty.mark(group, dirty::MEMBERSHIP);
    }

    /// Removes a notification from its group, if it has one.
    fn leave_group(&mut self, idx: u32) {
        let group = self.group_of[idx as usize];
        if group == INVALID {
            return;
        }
        self.group_of[idx as usize] = INVALID;
        self.member_count[group as usize] -= 1;
        self.dirty.remove_dependency(idx, group, dirty::CONTENT);
        self.dirty.mark(group, dirty::MEMBERSHIP);
    }
}
