// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`].
//!
//! Entry handles are recorded as their raw index and generation, and decode
//! to [`EntryRef`]. Rule failures keep their reason text. Rich
//! [`on_attach_changes`](TraceSink::on_attach_changes) events store only the
//! count.

use std::fmt;

use shadelist_core::builder::InvariantViolation;
use shadelist_core::entry::{EntryId, Parent};
use shadelist_core::rules::{RuleError, RuleFailure, RuleRef};
use shadelist_core::stability::{ChangeKind, ChangeSet};
use shadelist_core::trace::{
    AttachChange, PassBeginEvent, PassEndEvent, PassOutcome, ReleaseEvent, StageEvent, StageKind,
    StarvationEvent, SuppressionEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_PASS_BEGIN: u8 = 1;
const TAG_STAGE_BEGIN: u8 = 2;
const TAG_STAGE_END: u8 = 3;
const TAG_RULE_FAILURE: u8 = 4;
const TAG_SUPPRESSION: u8 = 5;
const TAG_RELEASE: u8 = 6;
const TAG_STARVATION: u8 = 7;
const TAG_INVARIANT_VIOLATION: u8 = 8;
const TAG_PASS_END: u8 = 9;
const TAG_ATTACH_CHANGES_COUNT: u8 = 10;

/// Sentinel for an absent section.
const NO_SECTION: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Decoded value types
// ---------------------------------------------------------------------------

/// A recorded entry handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef {
    /// Slot index.
    pub index: u32,
    /// Generation of the slot when the event was recorded.
    pub generation: u32,
}

impl From<EntryId> for EntryRef {
    fn from(id: EntryId) -> Self {
        Self {
            index: id.index(),
            generation: id.generation(),
        }
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@gen{}", self.index, self.generation)
    }
}

/// A recorded parent assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedParent {
    /// Not attached.
    Detached,
    /// Top level.
    Root,
    /// Inside the given group.
    Group(EntryRef),
}

impl From<Parent> for RecordedParent {
    fn from(parent: Parent) -> Self {
        match parent {
            Parent::Detached => Self::Detached,
            Parent::Root => Self::Root,
            Parent::Group(group) => Self::Group(group.into()),
        }
    }
}

/// A recorded rule reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedRule {
    /// Filter slot.
    Filter(u16),
    /// Promoter slot.
    Promoter(u16),
    /// Sectioner slot.
    Sectioner(u16),
    /// The top-level comparator chain.
    Comparator,
    /// The child comparator.
    ChildComparator,
}

impl From<RuleRef> for RecordedRule {
    fn from(rule: RuleRef) -> Self {
        match rule {
            RuleRef::Filter(id) => Self::Filter(id.index()),
            RuleRef::Promoter(id) => Self::Promoter(id.index()),
            RuleRef::Sectioner(id) => Self::Sectioner(id.index()),
            RuleRef::Comparator => Self::Comparator,
            RuleRef::ChildComparator => Self::ChildComparator,
        }
    }
}

/// The kind of a recorded invariant violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// See [`InvariantViolation::OrphanedChild`].
    OrphanedChild,
    /// See [`InvariantViolation::MissingStableIndex`].
    MissingStableIndex,
    /// See [`InvariantViolation::StaleStableIndex`].
    StaleStableIndex,
    /// See [`InvariantViolation::StableIndexConflict`].
    StableIndexConflict,
    /// See [`InvariantViolation::SectionMismatch`].
    SectionMismatch,
    /// See [`InvariantViolation::ExcludedAndPromoted`].
    ExcludedAndPromoted,
    /// See [`InvariantViolation::GroupWithRuleReason`].
    GroupWithRuleReason,
}

impl ViolationKind {
    const ALL: [Self; 7] = [
        Self::OrphanedChild,
        Self::MissingStableIndex,
        Self::StaleStableIndex,
        Self::StableIndexConflict,
        Self::SectionMismatch,
        Self::ExcludedAndPromoted,
        Self::GroupWithRuleReason,
    ];

    fn of(violation: &InvariantViolation) -> Self {
        match violation {
            InvariantViolation::OrphanedChild { .. } => Self::OrphanedChild,
            InvariantViolation::MissingStableIndex { .. } => Self::MissingStableIndex,
            InvariantViolation::StaleStableIndex { .. } => Self::StaleStableIndex,
            InvariantViolation::StableIndexConflict { .. } => Self::StableIndexConflict,
            InvariantViolation::SectionMismatch { .. } => Self::SectionMismatch,
            InvariantViolation::ExcludedAndPromoted { .. } => Self::ExcludedAndPromoted,
            InvariantViolation::GroupWithRuleReason { .. } => Self::GroupWithRuleReason,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::OrphanedChild => 0,
            Self::MissingStableIndex => 1,
            Self::StaleStableIndex => 2,
            Self::StableIndexConflict => 3,
            Self::SectionMismatch => 4,
            Self::ExcludedAndPromoted => 5,
            Self::GroupWithRuleReason => 6,
        }
    }
}

fn stage_tag(stage: StageKind) -> u8 {
    match stage {
        StageKind::Apply => 0,
        StageKind::Filter => 1,
        StageKind::Group => 2,
        StageKind::Promote => 3,
        StageKind::SuppressStructure => 4,
        StageKind::Prune => 5,
        StageKind::Section => 6,
        StageKind::Sort => 7,
        StageKind::Finalize => 8,
        StageKind::Verify => 9,
        StageKind::Commit => 10,
    }
}

fn change_bits(kinds: ChangeSet) -> u8 {
    kinds
        .iter()
        .map(|kind| match kind {
            ChangeKind::Reparent => 1,
            ChangeKind::Promotion => 2,
            ChangeKind::SectionMove => 4,
        })
        .fold(0, |bits, bit| bits | bit)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_entry(&mut self, id: EntryId) {
        self.write_u32(id.index());
        self.write_u32(id.generation());
    }

    fn write_parent(&mut self, parent: Parent) {
        match parent {
            Parent::Detached => self.write_u8(0),
            Parent::Root => self.write_u8(1),
            Parent::Group(group) => {
                self.write_u8(2);
                self.write_entry(group);
            }
        }
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(count(s.len()));
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn write_stage(&mut self, tag: u8, e: &StageEvent) {
        self.write_u8(tag);
        self.write_u64(e.pass_index);
        self.write_u8(stage_tag(e.stage));
        self.write_u32(count(e.entries));
    }
}

impl TraceSink for RecorderSink {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        self.write_u8(TAG_PASS_BEGIN);
        self.write_u64(e.pass_index);
        self.write_u64(e.now);
        self.write_u32(count(e.pending_events));
        self.write_u8(u8::from(e.unstable));
    }

    fn on_stage_begin(&mut self, e: &StageEvent) {
        self.write_stage(TAG_STAGE_BEGIN, e);
    }

    fn on_stage_end(&mut self, e: &StageEvent) {
        self.write_stage(TAG_STAGE_END, e);
    }

    fn on_rule_failure(&mut self, pass_index: u64, failure: &RuleFailure) {
        self.write_u8(TAG_RULE_FAILURE);
        self.write_u64(pass_index);
        self.write_entry(failure.entry);
        let (kind, slot) = match failure.rule {
            RuleRef::Filter(id) => (0, id.index()),
            RuleRef::Promoter(id) => (1, id.index()),
            RuleRef::Sectioner(id) => (2, id.index()),
            RuleRef::Comparator => (3, 0),
            RuleRef::ChildComparator => (4, 0),
        };
        self.write_u8(kind);
        self.write_u32(u32::from(slot));
        match &failure.error {
            RuleError::Failed { reason } => {
                self.write_u8(0);
                self.write_str(reason);
            }
            RuleError::Panicked => self.write_u8(1),
        }
    }

    fn on_suppression(&mut self, e: &SuppressionEvent) {
        self.write_u8(TAG_SUPPRESSION);
        self.write_u64(e.pass_index);
        self.write_entry(e.entry);
        self.write_u8(change_bits(e.kinds));
        self.write_parent(e.kept_parent);
        self.write_parent(e.proposed_parent);
        self.write_u32(e.proposed_section.map_or(NO_SECTION, |s| u32::from(s.index())));
    }

    fn on_release(&mut self, e: &ReleaseEvent) {
        self.write_u8(TAG_RELEASE);
        self.write_u64(e.pass_index);
        self.write_entry(e.entry);
        self.write_u8(u8::from(e.matched));
    }

    fn on_starvation(&mut self, e: &StarvationEvent) {
        self.write_u8(TAG_STARVATION);
        self.write_u64(e.pass_index);
        self.write_entry(e.entry);
        self.write_u32(e.suppressed_passes);
    }

    fn on_invariant_violation(&mut self, pass_index: u64, violation: &InvariantViolation) {
        self.write_u8(TAG_INVARIANT_VIOLATION);
        self.write_u64(pass_index);
        self.write_entry(violation.entry());
        self.write_u8(ViolationKind::of(violation).tag());
    }

    fn on_pass_end(&mut self, e: &PassEndEvent) {
        self.write_u8(TAG_PASS_END);
        self.write_u64(e.pass_index);
        self.write_u64(e.now);
        self.write_u8(match e.outcome {
            PassOutcome::Committed => 0,
            PassOutcome::Aborted => 1,
        });
        self.write_u32(count(e.top_level));
        self.write_u32(count(e.attached));
        self.write_u32(count(e.suppressed));
        self.write_u32(count(e.rule_failures));
    }

    fn on_attach_changes(&mut self, pass_index: u64, changes: &[AttachChange]) {
        self.write_u8(TAG_ATTACH_CHANGES_COUNT);
        self.write_u64(pass_index);
        self.write_u32(count(changes.len()));
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`PassBeginEvent`].
    PassBegin {
        /// Pass counter.
        pass_index: u64,
        /// Caller-supplied time in milliseconds.
        now: u64,
        /// Coalesced upstream events.
        pending_events: u32,
        /// Whether the unstable window was open.
        unstable: bool,
    },
    /// A stage-begin [`StageEvent`].
    StageBegin {
        /// Pass counter.
        pass_index: u64,
        /// Which stage.
        stage: StageKind,
        /// Live entries.
        entries: u32,
    },
    /// A stage-end [`StageEvent`].
    StageEnd {
        /// Pass counter.
        pass_index: u64,
        /// Which stage.
        stage: StageKind,
        /// Entries the stage produced.
        entries: u32,
    },
    /// A [`RuleFailure`].
    RuleFailure {
        /// Pass counter.
        pass_index: u64,
        /// The entry the rule was asked about.
        entry: EntryRef,
        /// The failing rule.
        rule: RecordedRule,
        /// The failure reason; `None` when the rule panicked.
        reason: Option<String>,
    },
    /// A [`SuppressionEvent`].
    Suppression {
        /// Pass counter.
        pass_index: u64,
        /// The affected entry.
        entry: EntryRef,
        /// Deferred change kinds.
        kinds: ChangeSet,
        /// The parent kept in place.
        kept_parent: RecordedParent,
        /// The parent that was proposed.
        proposed_parent: RecordedParent,
        /// The proposed section slot, for section moves.
        proposed_section: Option<u16>,
    },
    /// A [`ReleaseEvent`].
    Release {
        /// Pass counter.
        pass_index: u64,
        /// The affected entry.
        entry: EntryRef,
        /// Whether the deferred change was applied as held.
        matched: bool,
    },
    /// A [`StarvationEvent`].
    Starvation {
        /// Pass counter.
        pass_index: u64,
        /// The starving entry.
        entry: EntryRef,
        /// Consecutive suppressed passes.
        suppressed_passes: u32,
    },
    /// An [`InvariantViolation`].
    InvariantViolation {
        /// Pass counter.
        pass_index: u64,
        /// The offending entry.
        entry: EntryRef,
        /// Which invariant broke.
        kind: ViolationKind,
    },
    /// A [`PassEndEvent`].
    PassEnd {
        /// Pass counter.
        pass_index: u64,
        /// Caller-supplied time in milliseconds.
        now: u64,
        /// How the pass ended.
        outcome: PassOutcome,
        /// Top-level entries.
        top_level: u32,
        /// Attached entries.
        attached: u32,
        /// Entries with deferred changes.
        suppressed: u32,
        /// Rule failures.
        rule_failures: u32,
    },
    /// Attach-change count for a pass.
    AttachChangesCount {
        /// Pass counter.
        pass_index: u64,
        /// Number of attach-field changes.
        count: u32,
    },
}

impl RecordedEvent {
    /// Returns the pass the event belongs to.
    #[must_use]
    pub fn pass_index(&self) -> u64 {
        match *self {
            Self::PassBegin { pass_index, .. }
            | Self::StageBegin { pass_index, .. }
            | Self::StageEnd { pass_index, .. }
            | Self::RuleFailure { pass_index, .. }
            | Self::Suppression { pass_index, .. }
            | Self::Release { pass_index, .. }
            | Self::Starvation { pass_index, .. }
            | Self::InvariantViolation { pass_index, .. }
            | Self::PassEnd { pass_index, .. }
            | Self::AttachChangesCount { pass_index, .. } => pass_index,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, len: usize) -> Option<&[u8]> {
        if self.remaining() < len {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.read_bytes(4)?.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.read_bytes(8)?.try_into().ok()?))
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_entry(&mut self) -> Option<EntryRef> {
        Some(EntryRef {
            index: self.read_u32()?,
            generation: self.read_u32()?,
        })
    }

    fn read_parent(&mut self) -> Option<RecordedParent> {
        Some(match self.read_u8()? {
            0 => RecordedParent::Detached,
            1 => RecordedParent::Root,
            _ => RecordedParent::Group(self.read_entry()?),
        })
    }

    fn read_string(&mut self) -> Option<String> {
        let len = usize::try_from(self.read_u32()?).ok()?;
        let bytes = self.read_bytes(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_stage(&mut self) -> Option<StageKind> {
        let tag = usize::from(self.read_u8()?);
        StageKind::ALL.get(tag).copied()
    }

    fn read_change_set(&mut self) -> Option<ChangeSet> {
        let bits = self.read_u8()?;
        let mut kinds = ChangeSet::EMPTY;
        for (bit, kind) in [1, 2, 4].into_iter().zip(ChangeKind::ALL) {
            if bits & bit != 0 {
                kinds.insert(kind);
            }
        }
        Some(kinds)
    }

    fn decode_pass_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassBegin {
            pass_index: self.read_u64()?,
            now: self.read_u64()?,
            pending_events: self.read_u32()?,
            unstable: self.read_bool()?,
        })
    }

    fn decode_stage(&mut self, begin: bool) -> Option<RecordedEvent> {
        let pass_index = self.read_u64()?;
        let stage = self.read_stage()?;
        let entries = self.read_u32()?;
        Some(if begin {
            RecordedEvent::StageBegin {
                pass_index,
                stage,
                entries,
            }
        } else {
            RecordedEvent::StageEnd {
                pass_index,
                stage,
                entries,
            }
        })
    }

    fn decode_rule_failure(&mut self) -> Option<RecordedEvent> {
        let pass_index = self.read_u64()?;
        let entry = self.read_entry()?;
        let kind = self.read_u8()?;
        let slot = u16::try_from(self.read_u32()?).ok()?;
        let rule = match kind {
            0 => RecordedRule::Filter(slot),
            1 => RecordedRule::Promoter(slot),
            2 => RecordedRule::Sectioner(slot),
            3 => RecordedRule::Comparator,
            _ => RecordedRule::ChildComparator,
        };
        let reason = match self.read_u8()? {
            0 => Some(self.read_string()?),
            _ => None,
        };
        Some(RecordedEvent::RuleFailure {
            pass_index,
            entry,
            rule,
            reason,
        })
    }

    fn decode_suppression(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Suppression {
            pass_index: self.read_u64()?,
            entry: self.read_entry()?,
            kinds: self.read_change_set()?,
            kept_parent: self.read_parent()?,
            proposed_parent: self.read_parent()?,
            proposed_section: match self.read_u32()? {
                NO_SECTION => None,
                slot => Some(u16::try_from(slot).ok()?),
            },
        })
    }

    fn decode_release(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Release {
            pass_index: self.read_u64()?,
            entry: self.read_entry()?,
            matched: self.read_bool()?,
        })
    }

    fn decode_starvation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Starvation {
            pass_index: self.read_u64()?,
            entry: self.read_entry()?,
            suppressed_passes: self.read_u32()?,
        })
    }

    fn decode_invariant_violation(&mut self) -> Option<RecordedEvent> {
        let pass_index = self.read_u64()?;
        let entry = self.read_entry()?;
        let kind = *ViolationKind::ALL.get(usize::from(self.read_u8()?))?;
        Some(RecordedEvent::InvariantViolation {
            pass_index,
            entry,
            kind,
        })
    }

    fn decode_pass_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassEnd {
            pass_index: self.read_u64()?,
            now: self.read_u64()?,
            outcome: match self.read_u8()? {
                0 => PassOutcome::Committed,
                _ => PassOutcome::Aborted,
            },
            top_level: self.read_u32()?,
            attached: self.read_u32()?,
            suppressed: self.read_u32()?,
            rule_failures: self.read_u32()?,
        })
    }

    fn decode_attach_changes_count(&mut self) -> Option<RecordedEvent> {
        let pass_index = self.read_u64()?;
        let count = self.read_u32()?;
        Some(RecordedEvent::AttachChangesCount { pass_index, count })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_PASS_BEGIN => self.decode_pass_begin(),
            TAG_STAGE_BEGIN => self.decode_stage(true),
            TAG_STAGE_END => self.decode_stage(false),
            TAG_RULE_FAILURE => self.decode_rule_failure(),
            TAG_SUPPRESSION => self.decode_suppression(),
            TAG_RELEASE => self.decode_release(),
            TAG_STARVATION => self.decode_starvation(),
            TAG_INVARIANT_VIOLATION => self.decode_invariant_violation(),
            TAG_PASS_END => self.decode_pass_end(),
            TAG_ATTACH_CHANGES_COUNT => self.decode_attach_changes_count(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
