// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).
//! [`write_tree`] dumps the committed list as indented text.

use std::io::{self, Write};

use shadelist_core::builder::{InvariantViolation, ListBuilder};
use shadelist_core::entry::{ListEntry, Parent};
use shadelist_core::rules::{RuleFailure, RuleRef};
use shadelist_core::trace::{
    AttachChange, PassBeginEvent, PassEndEvent, ReleaseEvent, StageEvent, StarvationEvent,
    SuppressionEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    stages: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer,
            stages: false,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            stages: false,
        }
    }

    /// Also prints stage begin and end lines.
    #[must_use]
    pub fn with_stages(mut self) -> Self {
        self.stages = true;
        self
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn parent_label(parent: Parent) -> String {
    match parent {
        Parent::Detached => "detached".into(),
        Parent::Root => "root".into(),
        Parent::Group(group) => format!("group#{}", group.index()),
    }
}

fn rule_label(rule: RuleRef) -> String {
    match rule {
        RuleRef::Filter(id) => format!("filter#{}", id.index()),
        RuleRef::Promoter(id) => format!("promoter#{}", id.index()),
        RuleRef::Sectioner(id) => format!("section#{}", id.index()),
        RuleRef::Comparator => "comparators".into(),
        RuleRef::ChildComparator => "child-comparator".into(),
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:begin] pass={} now={}ms events={}{}",
            e.pass_index,
            e.now,
            e.pending_events,
            if e.unstable { " UNSTABLE" } else { "" },
        );
    }

    fn on_stage_begin(&mut self, e: &StageEvent) {
        if self.stages {
            let _ = writeln!(
                self.writer,
                "[stage:begin] pass={} {} live={}",
                e.pass_index,
                e.stage.name(),
                e.entries,
            );
        }
    }

    fn on_stage_end(&mut self, e: &StageEvent) {
        if self.stages {
            let _ = writeln!(
                self.writer,
                "[stage:end] pass={} {} produced={}",
                e.pass_index,
                e.stage.name(),
                e.entries,
            );
        }
    }

    fn on_rule_failure(&mut self, pass_index: u64, failure: &RuleFailure) {
        let _ = writeln!(
            self.writer,
            "[rule] pass={pass_index} entry={:?} {} {}",
            failure.entry,
            rule_label(failure.rule),
            failure.error,
        );
    }

    fn on_suppression(&mut self, e: &SuppressionEvent) {
        let kinds: Vec<String> = e.kinds.iter().map(|k| format!("{k:?}")).collect();
        let _ = write!(
            self.writer,
            "[suppress] pass={} entry={:?} kinds={} kept={} proposed={}",
            e.pass_index,
            e.entry,
            kinds.join("+"),
            parent_label(e.kept_parent),
            parent_label(e.proposed_parent),
        );
        let _ = match e.proposed_section {
            Some(section) => writeln!(self.writer, " section=#{}", section.index()),
            None => writeln!(self.writer),
        };
    }

    fn on_release(&mut self, e: &ReleaseEvent) {
        let _ = writeln!(
            self.writer,
            "[release] pass={} entry={:?} {}",
            e.pass_index,
            e.entry,
            if e.matched { "applied" } else { "discarded" },
        );
    }

    fn on_starvation(&mut self, e: &StarvationEvent) {
        let _ = writeln!(
            self.writer,
            "[starving] pass={} entry={:?} passes={}",
            e.pass_index, e.entry, e.suppressed_passes,
        );
    }

    fn on_invariant_violation(&mut self, pass_index: u64, violation: &InvariantViolation) {
        let _ = writeln!(self.writer, "[VIOLATION] pass={pass_index} {violation}");
    }

    fn on_pass_end(&mut self, e: &PassEndEvent) {
        let _ = writeln!(
            self.writer,
            "[pass:end] pass={} {:?} top={} attached={} suppressed={} failures={}",
            e.pass_index, e.outcome, e.top_level, e.attached, e.suppressed, e.rule_failures,
        );
    }

    fn on_attach_changes(&mut self, pass_index: u64, changes: &[AttachChange]) {
        let _ = writeln!(
            self.writer,
            "[attach] pass={pass_index} changes={}",
            changes.len(),
        );
    }
}

/// Writes the committed list as indented text, one entry per line.
///
/// Group summaries are marked with `*`, and entries with a held shadow with
/// `~`.
pub fn write_tree(builder: &ListBuilder, writer: &mut dyn Write) -> io::Result<()> {
    for top in builder.shade_list() {
        write_row(builder, &top, 0, "", writer)?;
        if let Some(summary) = top.summary().and_then(|id| builder.entry(id)) {
            write_row(builder, &summary, 1, "*", writer)?;
        }
        for child in top.children() {
            write_row(builder, &child, 1, "", writer)?;
        }
    }
    Ok(())
}

fn write_row(
    builder: &ListBuilder,
    entry: &ListEntry<'_>,
    depth: usize,
    marker: &str,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let index = entry
        .stable_index()
        .map_or_else(|| "-".into(), |i| i.to_string());
    let section = entry
        .section()
        .and_then(|s| builder.rules().section_name(s))
        .unwrap_or("?");
    let held = if entry.suppressed_changes().is_empty() {
        ""
    } else {
        " ~"
    };
    writeln!(
        writer,
        "{:indent$}{index:>3} {marker}{} [{section}]{held}",
        "",
        entry.key(),
        indent = depth * 2,
    )
}
