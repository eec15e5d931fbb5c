// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The stages of a pass, from applying upstream events to commit.
//!
//! Every stage returns the number of entries it produced, which the builder
//! forwards to the stage-end trace event.

use alloc::vec::Vec;
use core::mem;

use super::{ChangeEvent, ListBuilder, PassChanges, PassReport, Release, Suppression};
use crate::dirty;
use crate::entry::{EntryKind, EntryStore, INVALID, ListEntry, Parent};
use crate::rules::{PassContext, PromoterId};
use crate::stability::ChangeKind;
use crate::trace::{ReleaseEvent, StarvationEvent, SuppressionEvent, Tracer};

impl ListBuilder {
    /// Applies every queued upstream event to the store.
    pub(super) fn apply_events(&mut self) -> usize {
        let applied = self.queue.len();
        for event in self.queue.drain(..) {
            match event {
                ChangeEvent::Posted(notification) => {
                    self.store.post(notification);
                }
                ChangeEvent::Removed(key) => {
                    self.store.remove(&key);
                }
            }
        }
        applied
    }

    /// Resets every `current` state and the working group layout.
    pub(super) fn begin_pass(&mut self, ctx: &PassContext) {
        let store = &mut self.store;
        for i in 0..store.len as usize {
            if !store.live[i] {
                continue;
            }
            store.current[i].reset();
            store.children[i].clear();
            store.summary[i] = INVALID;
        }

        let scratch = &mut self.scratch;
        scratch.kept.clear();
        scratch.groups.clear();
        scratch.top.clear();
        scratch.promoted.clear();
        scratch.restored.clear();
        scratch.streaks.clear();

        self.rules.begin_pass(ctx);
    }

    /// Runs filters over every active leaf. Survivors go to `scratch.kept`.
    pub(super) fn filter(&mut self, ctx: &PassContext, report: &mut PassReport) -> usize {
        let Self {
            store,
            rules,
            scratch,
            ..
        } = self;
        store.collect_active(EntryKind::Notification, &mut scratch.leaves);
        for &leaf in &scratch.leaves {
            let excluded =
                rules.first_excluding(&ListEntry::new(store, leaf), ctx, &mut report.rule_failures);
            match excluded {
                Some(filter) => store.current[leaf as usize].excluding_filter = Some(filter),
                None => scratch.kept.push(leaf),
            }
        }
        scratch.kept.len()
    }

    /// Attaches surviving leaves to their groups.
    ///
    /// The first summary of a group becomes its summary; later ones are
    /// treated as ordinary children. Ungrouped leaves become top-level
    /// candidates, and every group that received a member becomes a group
    /// candidate (tentatively `Root` until pruning decides).
    pub(super) fn group(&mut self) -> usize {
        let Self { store, scratch, .. } = self;
        for &leaf in &scratch.kept {
            let i = leaf as usize;
            let group = store.group_of[i];
            if group == INVALID {
                store.current[i].parent = Parent::Root;
                scratch.top.push(leaf);
                continue;
            }

            let g = group as usize;
            let is_summary = store.notification[i]
                .as_ref()
                .is_some_and(|n| n.is_group_summary);
            if is_summary && store.summary[g] == INVALID {
                store.summary[g] = leaf;
            } else {
                store.children[g].push(leaf);
            }
            let parent = Parent::Group(store.id_at(group));
            store.current[i].parent = parent;

            if !store.current[g].is_attached() {
                store.current[g].parent = Parent::Root;
                scratch.groups.push(group);
            }
        }
        scratch
            .groups
            .sort_unstable_by_key(|&g| store.arrival[g as usize]);
        scratch.groups.len()
    }

    /// Runs promoters over each candidate group's children.
    pub(super) fn promote(&mut self, ctx: &PassContext, report: &mut PassReport) -> usize {
        let Self {
            store,
            rules,
            scratch,
            ..
        } = self;
        let mut promoted = 0;
        for &group in &scratch.groups {
            let g = group as usize;
            scratch.promoted.clear();
            for &child in &store.children[g] {
                let entry = ListEntry::new(store, child);
                if let Some(promoter) = rules.promoter_for(&entry, ctx, &mut report.rule_failures) {
                    scratch.promoted.push((child, promoter));
                }
            }
            if scratch.promoted.is_empty() {
                continue;
            }

            let lifted = &scratch.promoted;
            store.children[g].retain(|c| !lifted.iter().any(|&(p, _)| p == *c));
            for &(child, promoter) in lifted {
                let state = &mut store.current[child as usize];
                state.parent = Parent::Root;
                state.promoter = Some(promoter);
                scratch.top.push(child);
            }
            promoted += lifted.len();
        }
        promoted
    }

    /// Reverts reparent and promotion changes the suppressor refuses.
    ///
    /// A refused entry goes back to its previous parent (and promoter) and
    /// the proposal is recorded in its shadow. Entries that were detached
    /// last pass, or whose previous group no longer exists, always move.
    pub(super) fn suppress_structure(
        &mut self,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        let mut suppressed = 0;
        for k in 0..self.scratch.kept.len() {
            let leaf = self.scratch.kept[k];
            let i = leaf as usize;
            let prev = self.store.previous[i];
            let cur = self.store.current[i];
            if !prev.is_attached() || prev.parent == cur.parent {
                continue;
            }

            let kind = if prev.promoter == cur.promoter {
                ChangeKind::Reparent
            } else {
                ChangeKind::Promotion
            };
            if self.suppressor.allows(kind) || !self.can_restore(prev.parent) {
                continue;
            }

            self.detach_candidate(leaf, cur.parent);
            self.restore_parent(leaf, prev.parent, prev.promoter);
            let shadow = &mut self.store.current[i].suppressed_changes;
            shadow.parent = cur.parent;
            shadow.promoter = cur.promoter;

            note_suppression(
                report,
                tracer,
                SuppressionEvent {
                    pass_index: ctx.pass_index,
                    entry: self.store.id_at(leaf),
                    kinds: kind.into(),
                    kept_parent: prev.parent,
                    proposed_parent: cur.parent,
                    proposed_section: None,
                },
            );
            suppressed += 1;
        }
        suppressed
    }

    /// Attaches or flattens every candidate group.
    ///
    /// Groups with at least `min_group_children` children are attached at
    /// the top level. Smaller groups are flattened, unless the unstable
    /// window holds them together (see [`hold_group`](Self::hold_group)).
    pub(super) fn prune(
        &mut self,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        let min = self.config.min_group_children.max(1);
        let mut attached = 0;
        for k in 0..self.scratch.groups.len() {
            let group = self.scratch.groups[k];
            let g = group as usize;
            let has_members =
                !self.store.children[g].is_empty() || self.store.summary[g] != INVALID;
            if self.store.children[g].len() >= min || self.hold_group(group, ctx, report, tracer) {
                self.scratch.top.push(group);
                attached += 1;
            } else if has_members {
                self.flatten(group);
            } else {
                self.store.current[g].parent = Parent::Detached;
            }
        }
        attached
    }

    /// Assigns sections to top-level entries and propagates them into
    /// groups.
    pub(super) fn section(
        &mut self,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        for k in 0..self.scratch.top.len() {
            let top = self.scratch.top[k];
            let i = top as usize;
            let proposed = self.rules.section_for(
                &ListEntry::new(&self.store, top),
                ctx,
                &mut report.rule_failures,
            );

            let prev = self.store.previous[i];
            let parent_unchanged = prev.parent == self.store.current[i].parent;
            let section = match prev.section {
                Some(kept)
                    if parent_unchanged
                        && kept != proposed
                        && !self.suppressor.allows(ChangeKind::SectionMove) =>
                {
                    self.store.current[i].suppressed_changes.section = Some(proposed);
                    note_suppression(
                        report,
                        tracer,
                        SuppressionEvent {
                            pass_index: ctx.pass_index,
                            entry: self.store.id_at(top),
                            kinds: ChangeKind::SectionMove.into(),
                            kept_parent: prev.parent,
                            proposed_parent: prev.parent,
                            proposed_section: Some(proposed),
                        },
                    );
                    kept
                }
                _ => proposed,
            };
            self.store.current[i].section = Some(section);
        }

        let store = &mut self.store;
        for &top in &self.scratch.top {
            let t = top as usize;
            if store.kind[t] != EntryKind::Group {
                continue;
            }
            let section = store.current[t].section;
            let summary = store.summary[t];
            if summary != INVALID {
                store.current[summary as usize].section = section;
            }
            for k in 0..store.children[t].len() {
                let child = store.children[t][k] as usize;
                store.current[child].section = section;
            }
        }
        self.scratch.top.len()
    }

    /// Computes suppression streaks, starvation and releases.
    ///
    /// Nothing is written to the store here; the new streaks are applied at
    /// commit so that an aborted pass leaves them untouched.
    pub(super) fn finalize(&mut self, report: &mut PassReport) -> usize {
        let threshold = self.config.starvation_threshold;
        for idx in 0..self.store.len {
            let i = idx as usize;
            if !self.store.is_active(idx) {
                continue;
            }
            let id = self.store.id_at(idx);
            let streak = self.store.suppressed_streak[i];
            if report.suppression_of(id).is_some() {
                let next = streak.saturating_add(1);
                self.scratch.streaks.push((idx, next));
                if threshold > 0 && next >= threshold {
                    report.starving.push(id);
                }
            } else if streak > 0 {
                self.scratch.streaks.push((idx, 0));
                let matched = self.store.previous[i]
                    .suppressed_changes
                    .matches(&self.store.current[i]);
                report.releases.push(Release { entry: id, matched });
            }
        }
        report.suppressions.len()
    }

    /// Publishes the pass: snapshots `current` into `previous`, swaps in the
    /// new top-level list, destroys retired entries and drains dirty
    /// tracking into the report.
    pub(super) fn commit(
        &mut self,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        for &(idx, streak) in &self.scratch.streaks {
            self.store.suppressed_streak[idx as usize] = streak;
        }
        for release in &report.releases {
            tracer.release(&ReleaseEvent {
                pass_index: ctx.pass_index,
                entry: release.entry,
                matched: release.matched,
            });
        }
        for &entry in &report.starving {
            tracer.starvation(&StarvationEvent {
                pass_index: ctx.pass_index,
                entry,
                suppressed_passes: self.store.suppressed_streak[entry.idx as usize],
            });
        }

        #[cfg(feature = "trace-rich")]
        {
            let changes = attach_changes(&self.store);
            if !changes.is_empty() {
                tracer.attach_changes(ctx.pass_index, &changes);
            }
        }

        let store = &self.store;
        let list_changed = (0..store.len as usize)
            .any(|i| store.live[i] && store.current[i] != store.previous[i]);

        self.store.commit();
        let store = &self.store;
        self.top_level.clear();
        self.top_level
            .extend(self.scratch.top.iter().map(|&top| store.id_at(top)));

        self.store.destroy_retired();
        report.changes = self.drain_changes(list_changed);
        self.top_level.len()
    }

    /// Rolls every attach state and group layout back to the last commit.
    pub(super) fn roll_back(&mut self) {
        self.store.roll_back();
        // The upstream events of the aborted pass are applied but not yet
        // reflected in the list.
        self.invalidated = true;
    }

    // -- Helpers --

    /// Returns whether an entry can be put back under `parent` this pass.
    fn can_restore(&self, parent: Parent) -> bool {
        match parent {
            Parent::Root => true,
            Parent::Group(group) => self.store.is_active_group(group),
            Parent::Detached => false,
        }
    }

    /// Removes a leaf from the candidate position it was given this pass.
    fn detach_candidate(&mut self, leaf: u32, parent: Parent) {
        match parent {
            Parent::Root => self.scratch.top.retain(|&t| t != leaf),
            Parent::Group(group) => {
                let g = group.idx as usize;
                if self.store.summary[g] == leaf {
                    self.store.summary[g] = INVALID;
                } else {
                    self.store.children[g].retain(|&c| c != leaf);
                }
            }
            Parent::Detached => {}
        }
    }

    /// Puts a leaf back under its previous parent.
    fn restore_parent(&mut self, leaf: u32, parent: Parent, promoter: Option<PromoterId>) {
        let state = &mut self.store.current[leaf as usize];
        state.parent = parent;
        state.promoter = promoter;
        match parent {
            Parent::Root => self.scratch.top.push(leaf),
            Parent::Group(group) => {
                self.scratch.restored.push(leaf);
                let g = group.idx as usize;
                let was_summary = self.store.committed_summary[g] == leaf;
                if was_summary && self.store.summary[g] == INVALID {
                    self.store.summary[g] = leaf;
                } else {
                    self.store.children[g].push(leaf);
                }
                if !self.store.current[g].is_attached() {
                    self.store.current[g].parent = Parent::Root;
                    self.scratch.groups.push(group.idx);
                }
            }
            Parent::Detached => {}
        }
    }

    /// Keeps an undersized group attached while the unstable window is open.
    ///
    /// Applies only to a group that was attached last pass and only when
    /// flattening would move one of its previous members. Every such member
    /// is recorded as suppressed with its would-be parent in the shadow. A
    /// summary that flattening would detach has no parent to record and is
    /// kept without a suppression.
    ///
    /// A group that took back a member in
    /// [`suppress_structure`](Self::suppress_structure) is held whatever the
    /// policy says about reparenting, since flattening it would move that
    /// member anyway.
    fn hold_group(
        &mut self,
        group: u32,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        let g = group as usize;
        let id = self.store.id_at(group);
        let store = &self.store;
        let received = self
            .scratch
            .restored
            .iter()
            .any(|&leaf| store.current[leaf as usize].parent == Parent::Group(id));
        let defer_reparent = !self.suppressor.allows(ChangeKind::Reparent);
        if !received && (!defer_reparent || !self.store.previous[g].is_attached()) {
            return false;
        }
        let was_member = |store: &EntryStore, member: u32| {
            store.previous[member as usize].parent == Parent::Group(id)
        };

        let summary = self.store.summary[g];
        let children = mem::take(&mut self.store.children[g]);
        let summary_moves = summary != INVALID && was_member(&self.store, summary);
        if !summary_moves && !children.iter().any(|&c| was_member(&self.store, c)) {
            self.store.children[g] = children;
            return false;
        }
        if !defer_reparent {
            self.store.children[g] = children;
            return true;
        }

        // Flattening would lift the children, or the lone summary, to the top.
        let summary_target = if children.is_empty() {
            Parent::Root
        } else {
            Parent::Detached
        };
        let moved = children
            .iter()
            .map(|&c| (c, Parent::Root))
            .chain((summary != INVALID).then_some((summary, summary_target)));
        for (member, target) in moved {
            if target == Parent::Detached
                || !was_member(&self.store, member)
                || self.scratch.restored.contains(&member)
            {
                continue;
            }
            self.store.current[member as usize].suppressed_changes.parent = target;
            note_suppression(
                report,
                tracer,
                SuppressionEvent {
                    pass_index: ctx.pass_index,
                    entry: self.store.id_at(member),
                    kinds: ChangeKind::Reparent.into(),
                    kept_parent: Parent::Group(id),
                    proposed_parent: target,
                    proposed_section: None,
                },
            );
        }
        self.store.children[g] = children;
        true
    }

    /// Detaches a group, lifting its children (or its lone summary) to the
    /// top level.
    fn flatten(&mut self, group: u32) {
        let g = group as usize;
        let store = &mut self.store;
        let mut children = mem::take(&mut store.children[g]);
        let summary = mem::replace(&mut store.summary[g], INVALID);
        store.current[g].parent = Parent::Detached;

        if children.is_empty() {
            if summary != INVALID {
                store.current[summary as usize].parent = Parent::Root;
                self.scratch.top.push(summary);
            }
        } else {
            for &child in &children {
                store.current[child as usize].parent = Parent::Root;
                self.scratch.top.push(child);
            }
            if summary != INVALID {
                store.current[summary as usize].parent = Parent::Detached;
            }
        }

        // Hand the allocation back for the next pass.
        children.clear();
        store.children[g] = children;
    }

    /// Drains dirty tracking and lifecycle lists into [`PassChanges`].
    fn drain_changes(&mut self, list_changed: bool) -> PassChanges {
        let store = &mut self.store;
        let content: Vec<u32> = store
            .dirty
            .drain(dirty::CONTENT)
            .affected()
            .deterministic()
            .run()
            .collect();
        let membership: Vec<u32> = store
            .dirty
            .drain(dirty::MEMBERSHIP)
            .deterministic()
            .run()
            .collect();

        let mut changes = PassChanges {
            list_changed,
            ..PassChanges::default()
        };
        let store = &self.store;
        let live_ids = |slots: Vec<u32>| {
            slots
                .into_iter()
                .filter(|&i| store.live[i as usize])
                .map(|i| store.id_at(i))
                .collect()
        };
        changes.updated = live_ids(content);
        changes.regrouped = live_ids(membership);

        mem::swap(&mut self.store.pending_added, &mut changes.added);
        mem::swap(&mut self.store.pending_removed, &mut changes.removed);
        changes
    }
}

/// Records a deferred change in the report and the trace.
fn note_suppression(report: &mut PassReport, tracer: &mut Tracer<'_>, event: SuppressionEvent) {
    tracer.suppression(&event);
    match report.suppressions.iter_mut().find(|s| s.entry == event.entry) {
        Some(existing) => existing.kinds = existing.kinds.union(event.kinds),
        None => report.suppressions.push(Suppression {
            entry: event.entry,
            kinds: event.kinds,
        }),
    }
}

/// Lists every field that differs between `previous` and `current`.
#[cfg(feature = "trace-rich")]
fn attach_changes(store: &EntryStore) -> Vec<crate::trace::AttachChange> {
    use crate::trace::{AttachChange, AttachField};

    let mut changes = Vec::new();
    for idx in 0..store.len {
        let i = idx as usize;
        if !store.live[i] {
            continue;
        }
        let (prev, cur) = (&store.previous[i], &store.current[i]);
        let entry = store.id_at(idx);
        let fields = [
            (prev.parent != cur.parent, AttachField::Parent),
            (prev.stable_index != cur.stable_index, AttachField::StableIndex),
            (prev.section != cur.section, AttachField::Section),
            (prev.excluding_filter != cur.excluding_filter, AttachField::ExcludingFilter),
            (prev.promoter != cur.promoter, AttachField::Promoter),
            (
                prev.suppressed_changes != cur.suppressed_changes,
                AttachField::SuppressedChanges,
            ),
        ];
        changes.extend(
            fields
                .into_iter()
                .filter(|&(changed, _)| changed)
                .map(|(_, field)| AttachChange { entry, field }),
        );
    }
    changes
}
