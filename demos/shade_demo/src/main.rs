// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated notification feed that exercises the list builder and the
//! diagnostics pipeline.
//!
//! Runs 40 synthetic upstream batches through a [`ListBuilder`], with a shade
//! gesture holding the list steady for a stretch in the middle. Events go to
//! both a [`PrettyPrintSink`] and a [`RecorderSink`]; at the end the demo
//! prints the committed list, then writes a JSON snapshot and a Chrome trace.

use std::fs::File;
use std::io::{BufWriter, Write};

use shadelist_core::builder::{
    BuilderConfig, ChangeEvent, InvariantViolation, ListBuilder, PassReport,
};
use shadelist_core::consumer::{ListRenderer, Row, flatten_into};
use shadelist_core::entry::{ListEntry, Notification};
use shadelist_core::rules::{
    ComparatorFn, FilterFn, PassContext, Promoter, PromoterFn, RuleError, RuleFailure, SectionFn,
};
use shadelist_core::trace::{
    AttachChange, PassBeginEvent, PassEndEvent, ReleaseEvent, StageEvent, StarvationEvent,
    SuppressionEvent, TraceSink, Tracer,
};

use shadelist_debug::pretty::{PrettyPrintSink, write_tree};
use shadelist_debug::recorder::RecorderSink;

const BATCH_COUNT: u64 = 40;
/// Time between upstream batches in milliseconds.
const BATCH_INTERVAL_MS: u64 = 250;
/// Batches during which the user is dragging the shade.
const GESTURE: std::ops::Range<u64> = 12..20;

const SENDERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Forwards every event to two sinks.
struct Tee<'a, A, B> {
    a: &'a mut A,
    b: &'a mut B,
}

macro_rules! tee {
    ($($method:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) {
                self.a.$method($($arg),*);
                self.b.$method($($arg),*);
            }
        )*
    };
}

impl<A: TraceSink, B: TraceSink> TraceSink for Tee<'_, A, B> {
    tee! {
        on_pass_begin(e: &PassBeginEvent);
        on_stage_begin(e: &StageEvent);
        on_stage_end(e: &StageEvent);
        on_rule_failure(pass_index: u64, failure: &RuleFailure);
        on_suppression(e: &SuppressionEvent);
        on_release(e: &ReleaseEvent);
        on_starvation(e: &StarvationEvent);
        on_invariant_violation(pass_index: u64, violation: &InvariantViolation);
        on_pass_end(e: &PassEndEvent);
        on_attach_changes(pass_index: u64, changes: &[AttachChange]);
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Counts how many rows moved between consecutive redraws.
#[derive(Default)]
struct JumpCounter {
    rows: Vec<Row>,
    scratch: Vec<Row>,
    jumps: usize,
}

impl ListRenderer for JumpCounter {
    fn apply(&mut self, builder: &ListBuilder, report: &PassReport) {
        if !report.changes.list_changed {
            return;
        }
        self.scratch.clear();
        flatten_into(builder, &mut self.scratch);
        self.jumps += self
            .scratch
            .iter()
            .filter(|row| {
                self.rows
                    .iter()
                    .any(|old| old.entry == row.entry && old.stable_index != row.stable_index)
            })
            .count();
        std::mem::swap(&mut self.rows, &mut self.scratch);
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Lifts urgent messages out of their conversation, except at night.
#[derive(Debug, Default)]
struct UrgentPromoter {
    quiet_hours: bool,
}

impl Promoter for UrgentPromoter {
    fn name(&self) -> &str {
        "urgent"
    }

    fn on_pass_begin(&mut self, ctx: &PassContext) {
        // One simulated "night" every 10 seconds.
        self.quiet_hours = (ctx.now / 5_000) % 2 == 1;
    }

    fn should_promote_to_top_level(
        &self,
        entry: &ListEntry<'_>,
        _ctx: &PassContext,
    ) -> Result<bool, RuleError> {
        Ok(!self.quiet_hours && importance(entry) >= 8)
    }
}

fn importance(entry: &ListEntry<'_>) -> u8 {
    entry.representative().map_or(0, |n| n.importance)
}

fn post_time(entry: &ListEntry<'_>) -> u64 {
    entry.representative().map_or(0, |n| n.post_time)
}

fn install_rules(builder: &mut ListBuilder) {
    builder.add_filter(FilterFn::new("spam", |e, _| Ok(e.key().starts_with("spam:"))));
    builder.add_filter(FilterFn::new("flaky-remote", |e, ctx| {
        if e.key().ends_with(":7") && ctx.pass_index % 5 == 0 {
            Err(RuleError::failed("remote blocklist unavailable"))
        } else {
            Ok(false)
        }
    }));
    builder.add_promoter(UrgentPromoter::default());
    builder.add_promoter(PromoterFn::new("pinned", |e, _| Ok(e.key().starts_with("pin:"))));
    builder.add_sectioner(SectionFn::new("alerts", |e, _| Ok(importance(e) >= 6)));
    builder.add_sectioner(SectionFn::new("conversations", |e, _| Ok(e.is_group())));
    builder.add_sectioner(SectionFn::new("silent", |e, _| Ok(importance(e) <= 1)));
    builder.add_comparator(ComparatorFn::new("importance", |a, b| {
        importance(b).cmp(&importance(a))
    }));
    builder.add_comparator(ComparatorFn::new("recent", |a, b| post_time(b).cmp(&post_time(a))));
    builder.set_child_comparator(ComparatorFn::new("recent", |a, b| {
        post_time(b).cmp(&post_time(a))
    }));
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Small deterministic generator so every run produces the same trace.
struct Feed {
    state: u64,
    next_id: u64,
    live: Vec<String>,
}

impl Feed {
    fn new(seed: u64) -> Self {
        Self {
            state: seed,
            next_id: 0,
            live: Vec::new(),
        }
    }

    fn roll(&mut self, n: u64) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 33) % n
    }

    fn batch(&mut self, now: u64) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for _ in 0..=self.roll(3) {
            let id = self.next_id;
            self.next_id += 1;
            let sender = SENDERS[usize::try_from(self.roll(4)).unwrap_or(0)];
            let importance = u8::try_from(self.roll(10)).unwrap_or(0);
            let notification = match self.roll(8) {
                0 => Notification::new(format!("spam:{id}")),
                1 => Notification::new(format!("pin:{id}")),
                2 => Notification::new(format!("{sender}:summary"))
                    .in_group(format!("chat:{sender}"))
                    .as_summary(),
                3 | 4 => Notification::new(format!("alert:{id}")),
                _ => Notification::new(format!("msg:{id}")).in_group(format!("chat:{sender}")),
            };
            let notification = notification
                .with_importance(importance)
                .with_post_time(now);
            self.live.push(notification.key.clone());
            events.push(ChangeEvent::Posted(notification));
        }
        if self.live.len() > 6 && self.roll(2) == 0 {
            let len = u64::try_from(self.live.len()).unwrap_or(u64::MAX);
            let victim = usize::try_from(self.roll(len)).unwrap_or(0);
            events.push(ChangeEvent::Removed(self.live.swap_remove(victim)));
        }
        events
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    // -- sinks -------------------------------------------------------------
    let mut pretty = PrettyPrintSink::new(Box::new(std::io::stdout()));
    let mut recorder = RecorderSink::new();
    let mut renderer = JumpCounter::default();

    // -- builder -----------------------------------------------------------
    let mut builder = ListBuilder::new(BuilderConfig::shade());
    install_rules(&mut builder);
    let mut feed = Feed::new(0x5eed);

    // -- simulated feed ----------------------------------------------------
    let mut now = 1_000;
    let mut aborted = 0;
    for batch in 0..BATCH_COUNT {
        builder.set_unstable_window(GESTURE.contains(&batch));
        builder.enqueue_all(feed.batch(now));

        let mut tee = Tee {
            a: &mut pretty,
            b: &mut recorder,
        };
        match builder.build_list(now, &mut Tracer::new(&mut tee)) {
            Ok(report) => renderer.apply(&builder, &report),
            Err(err) => {
                aborted += 1;
                eprintln!("pass {batch} rolled back: {err}");
            }
        }

        now += BATCH_INTERVAL_MS;
    }

    // -- committed list ----------------------------------------------------
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "\nCommitted list after {BATCH_COUNT} batches:").expect("stdout");
    write_tree(&builder, &mut out).expect("stdout");
    writeln!(out, "row jumps seen by the renderer: {}", renderer.jumps).expect("stdout");
    drop(out);

    // -- export snapshot and Chrome trace ----------------------------------
    let file = File::create("shade.json").expect("failed to create shade.json");
    let mut writer = BufWriter::new(file);
    shadelist_debug::snapshot::write_snapshot(&builder, &mut writer)
        .expect("failed to write snapshot");

    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    shadelist_debug::chrome::export(recorder.as_bytes(), &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote shade.json and {path} ({BATCH_COUNT} passes, {aborted} rolled back)");
}
