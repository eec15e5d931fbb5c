// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for list-building passes.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! builder calls as a pass runs. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates [`AttachChange`] events and the
//!   corresponding `TraceSink` method.

use crate::builder::InvariantViolation;
use crate::entry::{EntryId, Parent};
use crate::rules::{RuleFailure, SectionId};
use crate::stability::ChangeSet;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which stage of a pass is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Applying queued upstream events.
    Apply,
    /// Running filters over leaves.
    Filter,
    /// Attaching leaves to their groups.
    Group,
    /// Running promoters over group children.
    Promote,
    /// Checking reparent and promotion changes against the suppressor.
    SuppressStructure,
    /// Dropping and flattening undersized groups.
    Prune,
    /// Assigning sections to top-level entries.
    Section,
    /// Ordering entries and assigning stable indices.
    Sort,
    /// Suppression bookkeeping.
    Finalize,
    /// Checking attach-state invariants.
    Verify,
    /// Publishing the pass.
    Commit,
}

impl StageKind {
    /// Every stage, in execution order.
    pub const ALL: [Self; 11] = [
        Self::Apply,
        Self::Filter,
        Self::Group,
        Self::Promote,
        Self::SuppressStructure,
        Self::Prune,
        Self::Section,
        Self::Sort,
        Self::Finalize,
        Self::Verify,
        Self::Commit,
    ];

    /// Short lowercase name, for logs and trace files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Filter => "filter",
            Self::Group => "group",
            Self::Promote => "promote",
            Self::SuppressStructure => "suppress",
            Self::Prune => "prune",
            Self::Section => "section",
            Self::Sort => "sort",
            Self::Finalize => "finalize",
            Self::Verify => "verify",
            Self::Commit => "commit",
        }
    }
}

/// How a pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassOutcome {
    /// The pass was committed.
    Committed,
    /// Verification failed and the pass was rolled back.
    Aborted,
}

/// Which attach-state field changed.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachField {
    /// Parent assignment.
    Parent,
    /// Stable index.
    StableIndex,
    /// Section.
    Section,
    /// Excluding filter.
    ExcludingFilter,
    /// Promoter.
    Promoter,
    /// Suppression shadow.
    SuppressedChanges,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a pass starts.
#[derive(Clone, Copy, Debug)]
pub struct PassBeginEvent {
    /// Monotonic pass counter.
    pub pass_index: u64,
    /// Caller-supplied time in milliseconds.
    pub now: u64,
    /// Number of queued upstream events coalesced into this pass.
    pub pending_events: usize,
    /// Whether the unstable window is open.
    pub unstable: bool,
}

/// Emitted at the beginning and end of each stage.
#[derive(Clone, Copy, Debug)]
pub struct StageEvent {
    /// Pass counter.
    pub pass_index: u64,
    /// Which stage.
    pub stage: StageKind,
    /// Number of entries the stage is working on (at begin) or produced
    /// (at end).
    pub entries: usize,
}

/// Emitted when the suppressor defers a change.
#[derive(Clone, Copy, Debug)]
pub struct SuppressionEvent {
    /// Pass counter.
    pub pass_index: u64,
    /// The affected entry.
    pub entry: EntryId,
    /// What kinds of change were deferred.
    pub kinds: ChangeSet,
    /// The parent kept in place.
    pub kept_parent: Parent,
    /// The parent that was proposed.
    pub proposed_parent: Parent,
    /// The section that was proposed, for section moves.
    pub proposed_section: Option<SectionId>,
}

/// Emitted when an entry's held shadow is resolved after the window closes.
#[derive(Clone, Copy, Debug)]
pub struct ReleaseEvent {
    /// Pass counter.
    pub pass_index: u64,
    /// The affected entry.
    pub entry: EntryId,
    /// Whether the fresh pass applied exactly the deferred change. `false`
    /// means the stale shadow was discarded in favor of a newer change.
    pub matched: bool,
}

/// Emitted when an entry has been suppressed for too many passes in a row.
#[derive(Clone, Copy, Debug)]
pub struct StarvationEvent {
    /// Pass counter.
    pub pass_index: u64,
    /// The starving entry.
    pub entry: EntryId,
    /// Consecutive suppressed passes so far.
    pub suppressed_passes: u32,
}

/// Emitted when a pass finishes, committed or not.
#[derive(Clone, Copy, Debug)]
pub struct PassEndEvent {
    /// Pass counter.
    pub pass_index: u64,
    /// Caller-supplied time in milliseconds.
    pub now: u64,
    /// Whether the pass committed.
    pub outcome: PassOutcome,
    /// Number of top-level entries in the committed list.
    pub top_level: usize,
    /// Number of attached entries (top-level, summaries and children).
    pub attached: usize,
    /// Number of entries with deferred changes.
    pub suppressed: usize,
    /// Number of rule failures during the pass.
    pub rule_failures: usize,
}

/// A per-pass attach-state change record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct AttachChange {
    /// The entry whose state changed between `previous` and `current`.
    pub entry: EntryId,
    /// Which field changed.
    pub field: AttachField,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the list builder.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a pass starts.
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a stage.
    fn on_stage_begin(&mut self, e: &StageEvent) {
        _ = e;
    }

    /// Called at the end of a stage.
    fn on_stage_end(&mut self, e: &StageEvent) {
        _ = e;
    }

    /// Called for every rule failure.
    fn on_rule_failure(&mut self, pass_index: u64, failure: &RuleFailure) {
        _ = (pass_index, failure);
    }

    /// Called when a change is deferred.
    fn on_suppression(&mut self, e: &SuppressionEvent) {
        _ = e;
    }

    /// Called when a held shadow is resolved.
    fn on_release(&mut self, e: &ReleaseEvent) {
        _ = e;
    }

    /// Called when an entry is starving.
    fn on_starvation(&mut self, e: &StarvationEvent) {
        _ = e;
    }

    /// Called for every invariant violation of an aborted pass.
    fn on_invariant_violation(&mut self, pass_index: u64, violation: &InvariantViolation) {
        _ = (pass_index, violation);
    }

    /// Called when a pass ends.
    fn on_pass_end(&mut self, e: &PassEndEvent) {
        _ = e;
    }

    /// Called with the committed attach-state changes (requires `trace-rich`
    /// feature).
    #[cfg(feature = "trace-rich")]
    fn on_attach_changes(&mut self, pass_index: u64, changes: &[AttachChange]) {
        _ = (pass_index, changes);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Generates a `Tracer` method forwarding one event reference to the sink.
macro_rules! forward {
    ($(#[$doc:meta])* $name:ident => $hook:ident($ty:ty)) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$ty) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$hook(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    forward!(
        /// Emits a [`PassBeginEvent`].
        pass_begin => on_pass_begin(PassBeginEvent)
    );
    forward!(
        /// Emits a stage-begin [`StageEvent`].
        stage_begin => on_stage_begin(StageEvent)
    );
    forward!(
        /// Emits a stage-end [`StageEvent`].
        stage_end => on_stage_end(StageEvent)
    );
    forward!(
        /// Emits a [`SuppressionEvent`].
        suppression => on_suppression(SuppressionEvent)
    );
    forward!(
        /// Emits a [`ReleaseEvent`].
        release => on_release(ReleaseEvent)
    );
    forward!(
        /// Emits a [`StarvationEvent`].
        starvation => on_starvation(StarvationEvent)
    );
    forward!(
        /// Emits a [`PassEndEvent`].
        pass_end => on_pass_end(PassEndEvent)
    );

    /// Emits a [`RuleFailure`].
    #[inline]
    pub fn rule_failure(&mut self, pass_index: u64, failure: &RuleFailure) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_rule_failure(pass_index, failure);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = (pass_index, failure);
        }
    }

    /// Emits an [`InvariantViolation`].
    #[inline]
    pub fn invariant_violation(&mut self, pass_index: u64, violation: &InvariantViolation) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_invariant_violation(pass_index, violation);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = (pass_index, violation);
        }
    }

    /// Emits attach-state changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn attach_changes(&mut self, pass_index: u64, changes: &[AttachChange]) {
        if let Some(s) = &mut self.sink {
            s.on_attach_changes(pass_index, changes);
        }
    }

    /// Returns whether events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }
}
