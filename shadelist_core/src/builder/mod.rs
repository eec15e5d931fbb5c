// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The list builder: one atomic rebuild pass per upstream batch.
//!
//! [`ListBuilder::build_list`] runs the stages below strictly in order. The
//! stages write only to each entry's `current` attach state and to the
//! working group layout; nothing becomes visible until the final commit.
//!
//! ```text
//!  apply ─► reset ─► filter ─► group ─► promote ─► suppress ─► prune
//!                                                                │
//!  commit ◄─ verify ◄─ finalize ◄─ sort ◄─ section ◄─────────────┘
//! ```
//!
//! A pass whose result breaks an attach-state invariant is rolled back as a
//! whole and reported as [`PassError::InvariantViolations`]; the previously
//! committed list stays in place.

mod sort;
mod stages;
#[cfg(test)]
mod tests;
mod verify;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::entry::{EntryId, EntryStore, ListEntry, Notification};
use crate::rules::{
    Comparator, Filter, FilterId, PassContext, Promoter, PromoterId, RuleFailure, RuleRegistry,
    SectionId, Sectioner,
};
use crate::stability::{ChangeSet, DisruptionPolicy, Suppressor};
use crate::trace::{PassBeginEvent, PassEndEvent, PassOutcome, StageEvent, StageKind, Tracer};

pub use verify::InvariantViolation;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the [`ListBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Groups with fewer attached children are flattened: their children
    /// move to the top level and their summary is dropped. A group with no
    /// children at all is never attached regardless of this value.
    pub min_group_children: usize,
    /// Consecutive suppressed passes after which an entry is reported as
    /// starving. `0` disables starvation reporting.
    pub starvation_threshold: u32,
    /// Which structural changes are deferred during an unstable window.
    pub disruption: DisruptionPolicy,
}

impl BuilderConfig {
    /// Default configuration for a full notification shade.
    #[must_use]
    pub const fn shade() -> Self {
        Self {
            min_group_children: 1,
            starvation_threshold: 8,
            disruption: DisruptionPolicy::ALL,
        }
    }

    /// Configuration for compact surfaces (lock screen, popups): single
    /// children are flattened out of their group, and starvation is flagged
    /// sooner.
    #[must_use]
    pub const fn compact() -> Self {
        Self {
            min_group_children: 2,
            starvation_threshold: 4,
            disruption: DisruptionPolicy::ALL,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::shade()
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// An upstream change, applied at the start of the next pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A notification was posted or updated.
    Posted(Notification),
    /// The notification with this key was removed.
    Removed(String),
}

/// Entries touched by upstream events, as reported by dirty tracking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassChanges {
    /// Entries created since the last commit.
    pub added: Vec<EntryId>,
    /// Entries destroyed by this commit. The handles are already stale.
    pub removed: Vec<EntryId>,
    /// Surviving entries whose content changed, including members of groups
    /// whose summary changed.
    pub updated: Vec<EntryId>,
    /// Surviving entries whose group membership changed, and the groups
    /// involved.
    pub regrouped: Vec<EntryId>,
    /// Whether any entry's committed attach state changed.
    pub list_changed: bool,
}

/// One entry whose changes were deferred this pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Suppression {
    /// The entry.
    pub entry: EntryId,
    /// The kinds of change that were deferred.
    pub kinds: ChangeSet,
}

/// One entry whose held changes were resolved this pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Release {
    /// The entry.
    pub entry: EntryId,
    /// Whether the applied state is exactly what had been deferred.
    pub matched: bool,
}

/// What a committed pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass counter.
    pub pass_index: u64,
    /// Caller-supplied time in milliseconds.
    pub now: u64,
    /// Upstream changes folded into the list.
    pub changes: PassChanges,
    /// Rules that failed and were treated as no-ops.
    pub rule_failures: Vec<RuleFailure>,
    /// Entries with deferred changes.
    pub suppressions: Vec<Suppression>,
    /// Entries whose earlier deferred changes were resolved.
    pub releases: Vec<Release>,
    /// Entries suppressed for at least
    /// [`starvation_threshold`](BuilderConfig::starvation_threshold)
    /// consecutive passes.
    pub starving: Vec<EntryId>,
}

impl PassReport {
    fn new(ctx: &PassContext) -> Self {
        Self {
            pass_index: ctx.pass_index,
            now: ctx.now,
            ..Self::default()
        }
    }

    /// Returns the deferred kinds for `entry`, if it was suppressed.
    #[must_use]
    pub fn suppression_of(&self, entry: EntryId) -> Option<ChangeSet> {
        self.suppressions
            .iter()
            .find(|s| s.entry == entry)
            .map(|s| s.kinds)
    }
}

/// Why a pass did not commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassError {
    /// The pass produced an inconsistent tree and was rolled back.
    InvariantViolations(Vec<InvariantViolation>),
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvariantViolations(violations) => {
                write!(f, "pass rolled back after {} invariant violation", violations.len())?;
                if violations.len() != 1 {
                    f.write_str("s")?;
                }
                if let Some(first) = violations.first() {
                    write!(f, "; first: {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl core::error::Error for PassError {}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Per-pass working buffers, kept across passes to reuse their allocations.
#[derive(Debug, Default)]
struct Scratch {
    leaves: Vec<u32>,
    kept: Vec<u32>,
    groups: Vec<u32>,
    top: Vec<u32>,
    promoted: Vec<(u32, PromoterId)>,
    /// Leaves put back into their previous group by structure suppression.
    restored: Vec<u32>,
    /// `(slot, new streak)` for every entry whose streak changes at commit.
    streaks: Vec<(u32, u32)>,
}

/// Rebuilds the notification list from upstream events and pluggable rules.
///
/// # Example
///
/// ```
/// use shadelist_core::builder::{BuilderConfig, ChangeEvent, ListBuilder};
/// use shadelist_core::entry::Notification;
/// use shadelist_core::rules::FilterFn;
/// use shadelist_core::trace::Tracer;
///
/// let mut builder = ListBuilder::new(BuilderConfig::shade());
/// builder.add_filter(FilterFn::new("hide-b", |e, _| Ok(e.key() == "b")));
/// builder.enqueue_all([
///     ChangeEvent::Posted(Notification::new("a")),
///     ChangeEvent::Posted(Notification::new("b")),
/// ]);
/// builder.build_list(0, &mut Tracer::none()).unwrap();
///
/// let keys: Vec<&str> = builder.shade_list().map(|e| e.key()).collect();
/// assert_eq!(keys, ["a"]);
/// ```
pub struct ListBuilder {
    config: BuilderConfig,
    store: EntryStore,
    rules: RuleRegistry,
    suppressor: Suppressor,
    queue: Vec<ChangeEvent>,
    invalidated: bool,
    pass_index: u64,
    top_level: Vec<EntryId>,
    scratch: Scratch,
    #[cfg(test)]
    corrupt_before_verify: Option<fn(&mut EntryStore)>,
}

impl fmt::Debug for ListBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListBuilder")
            .field("config", &self.config)
            .field("rules", &self.rules)
            .field("unstable", &self.suppressor.is_unstable())
            .field("pending_events", &self.queue.len())
            .field("pass_index", &self.pass_index)
            .field("top_level", &self.top_level)
            .finish_non_exhaustive()
    }
}

impl Default for ListBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

impl ListBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            store: EntryStore::new(),
            rules: RuleRegistry::new(),
            suppressor: Suppressor::new(config.disruption),
            queue: Vec::new(),
            invalidated: false,
            pass_index: 0,
            top_level: Vec::new(),
            scratch: Scratch::default(),
            #[cfg(test)]
            corrupt_before_verify: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    // -- Rules --

    /// Returns the rule registry.
    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Returns the rule registry for registration.
    pub fn rules_mut(&mut self) -> &mut RuleRegistry {
        self.invalidated = true;
        &mut self.rules
    }

    /// Registers a filter. See [`RuleRegistry::add_filter`].
    pub fn add_filter(&mut self, filter: impl Filter + 'static) -> FilterId {
        self.rules_mut().add_filter(filter)
    }

    /// Registers a promoter. See [`RuleRegistry::add_promoter`].
    pub fn add_promoter(&mut self, promoter: impl Promoter + 'static) -> PromoterId {
        self.rules_mut().add_promoter(promoter)
    }

    /// Registers a section. See [`RuleRegistry::add_sectioner`].
    pub fn add_sectioner(&mut self, sectioner: impl Sectioner + 'static) -> SectionId {
        self.rules_mut().add_sectioner(sectioner)
    }

    /// Registers a top-level comparator. See [`RuleRegistry::add_comparator`].
    pub fn add_comparator(&mut self, comparator: impl Comparator + 'static) {
        self.rules_mut().add_comparator(comparator);
    }

    /// Sets the group child comparator. See
    /// [`RuleRegistry::set_child_comparator`].
    pub fn set_child_comparator(&mut self, comparator: impl Comparator + 'static) {
        self.rules_mut().set_child_comparator(comparator);
    }

    // -- Inputs --

    /// Queues an upstream change for the next pass.
    pub fn enqueue(&mut self, event: ChangeEvent) {
        self.queue.push(event);
    }

    /// Queues several upstream changes; they coalesce into the next pass.
    pub fn enqueue_all(&mut self, events: impl IntoIterator<Item = ChangeEvent>) {
        self.queue.extend(events);
    }

    /// Opens or closes the unstable window. Takes effect at the next pass.
    pub fn set_unstable_window(&mut self, unstable: bool) {
        if unstable != self.suppressor.is_unstable() {
            self.invalidated = true;
        }
        self.suppressor.set_unstable_window(unstable);
    }

    /// Returns whether the unstable window is open.
    #[must_use]
    pub fn is_unstable(&self) -> bool {
        self.suppressor.is_unstable()
    }

    /// Requests a pass even without upstream changes, for example because a
    /// rule's inputs changed.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Returns whether a pass would change anything.
    #[must_use]
    pub fn needs_build(&self) -> bool {
        self.invalidated || !self.queue.is_empty()
    }

    // -- Output --

    /// Returns the committed top-level entries in render order.
    #[must_use]
    pub fn top_level(&self) -> &[EntryId] {
        &self.top_level
    }

    /// Iterates the committed top-level entries in render order.
    #[must_use]
    pub fn shade_list(&self) -> ShadeList<'_> {
        ShadeList {
            store: &self.store,
            iter: self.top_level.iter(),
        }
    }

    /// Returns a view of an entry, or `None` for a stale handle.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<ListEntry<'_>> {
        self.store.get(id)
    }

    /// Returns a view of the notification with this key.
    #[must_use]
    pub fn entry_by_key(&self, key: &str) -> Option<ListEntry<'_>> {
        self.store.by_key(key).and_then(|id| self.store.get(id))
    }

    /// Returns a view of the group with this group key.
    #[must_use]
    pub fn group_by_key(&self, group_key: &str) -> Option<ListEntry<'_>> {
        self.store.group_by_key(group_key).and_then(|id| self.store.get(id))
    }

    /// Returns how many consecutive committed passes suppressed `id`.
    #[must_use]
    pub fn suppressed_pass_count(&self, id: EntryId) -> u32 {
        if self.store.is_alive(id) {
            self.store.suppressed_streak[id.idx as usize]
        } else {
            0
        }
    }

    /// Returns the index the next pass will carry.
    #[must_use]
    pub fn pass_index(&self) -> u64 {
        self.pass_index
    }

    /// Returns the entry store.
    #[must_use]
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    // -- Pass --

    /// Runs one full pass at time `now` (milliseconds).
    ///
    /// Every queued event is applied first. On success the new list is
    /// committed and a [`PassReport`] returned. On
    /// [`PassError::InvariantViolations`] every attach state is restored to
    /// the last committed pass; the upstream events stay applied and the next
    /// pass retries.
    pub fn build_list(
        &mut self,
        now: u64,
        tracer: &mut Tracer<'_>,
    ) -> Result<PassReport, PassError> {
        let ctx = PassContext {
            pass_index: self.pass_index,
            now,
        };
        self.pass_index += 1;
        self.invalidated = false;
        let mut report = PassReport::new(&ctx);

        tracer.pass_begin(&PassBeginEvent {
            pass_index: ctx.pass_index,
            now,
            pending_events: self.queue.len(),
            unstable: self.suppressor.is_unstable(),
        });

        let report = &mut report;
        self.stage(StageKind::Apply, &ctx, report, tracer, |b, ctx, _, _| {
            let applied = b.apply_events();
            b.begin_pass(ctx);
            applied
        });
        self.stage(StageKind::Filter, &ctx, report, tracer, |b, ctx, r, _| {
            b.filter(ctx, r)
        });
        self.stage(StageKind::Group, &ctx, report, tracer, |b, _, _, _| b.group());
        self.stage(StageKind::Promote, &ctx, report, tracer, |b, ctx, r, _| {
            b.promote(ctx, r)
        });
        self.stage(StageKind::SuppressStructure, &ctx, report, tracer, |b, ctx, r, t| {
            b.suppress_structure(ctx, r, t)
        });
        self.stage(StageKind::Prune, &ctx, report, tracer, |b, ctx, r, t| {
            b.prune(ctx, r, t)
        });
        self.stage(StageKind::Section, &ctx, report, tracer, |b, ctx, r, t| {
            b.section(ctx, r, t)
        });
        self.stage(StageKind::Sort, &ctx, report, tracer, |b, _, r, _| {
            b.sort(&mut r.rule_failures)
        });
        self.stage(StageKind::Finalize, &ctx, report, tracer, |b, _, r, _| b.finalize(r));

        for failure in &report.rule_failures {
            tracer.rule_failure(ctx.pass_index, failure);
        }

        #[cfg(test)]
        if let Some(corrupt) = self.corrupt_before_verify {
            corrupt(&mut self.store);
        }

        tracer.stage_begin(&StageEvent {
            pass_index: ctx.pass_index,
            stage: StageKind::Verify,
            entries: self.store.len(),
        });
        let violations = verify::verify(&self.store);
        tracer.stage_end(&StageEvent {
            pass_index: ctx.pass_index,
            stage: StageKind::Verify,
            entries: violations.len(),
        });
        if !violations.is_empty() {
            for violation in &violations {
                tracer.invariant_violation(ctx.pass_index, violation);
            }
            self.roll_back();
            tracer.pass_end(&PassEndEvent {
                pass_index: ctx.pass_index,
                now,
                outcome: PassOutcome::Aborted,
                top_level: self.top_level.len(),
                attached: self.attached_count(),
                suppressed: 0,
                rule_failures: report.rule_failures.len(),
            });
            return Err(PassError::InvariantViolations(violations));
        }

        self.stage(StageKind::Commit, &ctx, report, tracer, |b, ctx, r, t| {
            b.commit(ctx, r, t)
        });

        tracer.pass_end(&PassEndEvent {
            pass_index: ctx.pass_index,
            now,
            outcome: PassOutcome::Committed,
            top_level: self.top_level.len(),
            attached: self.attached_count(),
            suppressed: report.suppressions.len(),
            rule_failures: report.rule_failures.len(),
        });
        Ok(core::mem::take(report))
    }

    /// Runs one stage between its begin and end trace events.
    ///
    /// The stage returns the number of entries it produced; the begin event
    /// carries the number of live entries.
    fn stage(
        &mut self,
        stage: StageKind,
        ctx: &PassContext,
        report: &mut PassReport,
        tracer: &mut Tracer<'_>,
        run: impl FnOnce(&mut Self, &PassContext, &mut PassReport, &mut Tracer<'_>) -> usize,
    ) {
        tracer.stage_begin(&StageEvent {
            pass_index: ctx.pass_index,
            stage,
            entries: self.store.len(),
        });
        let entries = run(self, ctx, report, tracer);
        tracer.stage_end(&StageEvent {
            pass_index: ctx.pass_index,
            stage,
            entries,
        });
    }

    /// Counts entries attached in the current state.
    fn attached_count(&self) -> usize {
        self.store
            .entries()
            .filter(|e| e.attach_state().is_attached())
            .count()
    }
}

/// An iterator over the committed top-level entries.
///
/// Created by [`ListBuilder::shade_list`].
#[derive(Debug)]
pub struct ShadeList<'a> {
    store: &'a EntryStore,
    iter: core::slice::Iter<'a, EntryId>,
}

impl<'a> Iterator for ShadeList<'a> {
    type Item = ListEntry<'a>;

    fn next(&mut self) -> Option<ListEntry<'a>> {
        self.iter.next().map(|&id| self.store.entry(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl ExactSizeIterator for ShadeList<'_> {}
