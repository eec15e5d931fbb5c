// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end pass tests.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;

use super::*;
use crate::entry::{EntryStore, Parent};
use crate::rules::{ComparatorFn, FilterFn, PromoterFn, RuleError, RuleRef, SectionFn};
use crate::stability::{ChangeKind, DisruptionPolicy};

fn posted(notification: Notification) -> ChangeEvent {
    ChangeEvent::Posted(notification)
}

fn removed(key: &str) -> ChangeEvent {
    ChangeEvent::Removed(String::from(key))
}

fn build(builder: &mut ListBuilder, now: u64) -> PassReport {
    builder
        .build_list(now, &mut Tracer::none())
        .expect("pass commits")
}

fn keys(builder: &ListBuilder) -> Vec<&str> {
    builder.shade_list().map(|e| e.key()).collect()
}

/// Keys in flattened render order: each group, its summary, its children.
fn flattened(builder: &ListBuilder) -> Vec<&str> {
    let mut out = Vec::new();
    for entry in builder.shade_list() {
        out.push(entry.key());
        if let Some(summary) = entry.summary().and_then(|id| builder.entry(id)) {
            out.push(summary.key());
        }
        out.extend(entry.children().map(|c| c.key()));
    }
    out
}

fn importance(entry: &ListEntry<'_>) -> u8 {
    entry.representative().map_or(0, |n| n.importance)
}

fn id_of(builder: &ListBuilder, key: &str) -> EntryId {
    builder.entry_by_key(key).expect("entry exists").id()
}

// -- Filtering, sectioning, grouping --

#[test]
fn filtered_entry_stays_in_memory_detached() {
    let mut builder = ListBuilder::default();
    let hide_b = builder.add_filter(FilterFn::new("hide-b", |e, _| Ok(e.key() == "b")));
    let first = builder.add_sectioner(SectionFn::new("first", |e, _| Ok(e.key() == "a")));
    let second = builder.add_sectioner(SectionFn::new("second", |e, _| Ok(e.key() == "c")));
    builder.enqueue_all([
        posted(Notification::new("a")),
        posted(Notification::new("b")),
        posted(Notification::new("c")),
    ]);
    build(&mut builder, 0);

    assert_eq!(keys(&builder), ["a", "c"]);
    let a = builder.entry_by_key("a").expect("a");
    assert_eq!((a.stable_index(), a.section()), (Some(0), Some(first)));
    let c = builder.entry_by_key("c").expect("c");
    assert_eq!((c.stable_index(), c.section()), (Some(1), Some(second)));

    let b = builder.entry_by_key("b").expect("b stays in memory");
    assert_eq!(b.excluding_filter(), Some(hide_b));
    assert_eq!(b.stable_index(), None);
    assert_eq!(b.section(), None);
    assert_eq!(b.parent_kind(), Parent::Detached);
}

#[test]
fn promoted_child_leaves_its_group() {
    let mut builder = ListBuilder::default();
    let lift = builder.add_promoter(PromoterFn::new("lift-x", |e, _| Ok(e.key() == "x")));
    let people = builder.add_sectioner(SectionFn::new("people", |e, _| Ok(e.is_group())));
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);

    assert_eq!(keys(&builder), ["g", "x"]);
    assert_eq!(flattened(&builder), ["g", "y", "x"]);

    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.promoter(), Some(lift));
    assert_eq!(x.parent(), None);
    assert_eq!(x.section(), Some(SectionId::DEFAULT));

    let g = builder.group_by_key("g").expect("g");
    let y = builder.entry_by_key("y").expect("y");
    assert_eq!(g.section(), Some(people));
    assert_eq!(y.section(), Some(people), "group section propagates");
    assert_eq!(y.parent(), Some(g.id()));
    assert_eq!(g.promoter(), None);
}

#[test]
fn summary_precedes_children_in_stable_order() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);

    assert_eq!(flattened(&builder), ["g", "s", "x", "y"]);
    let indices: Vec<Option<u32>> = ["s", "x", "y"]
        .iter()
        .map(|k| builder.entry_by_key(k).and_then(|e| e.stable_index()))
        .collect();
    assert_eq!(indices, [Some(1), Some(2), Some(3)]);
    let g = builder.group_by_key("g").expect("g");
    assert_eq!(g.stable_index(), Some(0));
    assert_eq!(builder.entry_by_key("s").and_then(|e| e.parent()), Some(g.id()));
}

#[test]
fn lone_summary_is_lifted_to_top_level() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
    ]);
    build(&mut builder, 0);
    assert_eq!(keys(&builder), ["g"]);

    builder.enqueue(removed("x"));
    build(&mut builder, 1);
    assert_eq!(keys(&builder), ["s"]);
    let g = builder.group_by_key("g").expect("group still has a member");
    assert_eq!(g.parent_kind(), Parent::Detached);
    assert_eq!(g.stable_index(), None);
}

#[test]
fn compact_config_flattens_single_child_groups() {
    let mut builder = ListBuilder::new(BuilderConfig::compact());
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
    ]);
    build(&mut builder, 0);

    assert_eq!(keys(&builder), ["x"]);
    let s = builder.entry_by_key("s").expect("s");
    assert_eq!(s.parent_kind(), Parent::Detached, "summary of a flattened group is dropped");

    builder.enqueue(posted(Notification::new("y").in_group("g")));
    build(&mut builder, 1);
    assert_eq!(flattened(&builder), ["g", "s", "x", "y"]);
}

#[test]
fn empty_group_is_destroyed_at_commit() {
    let mut builder = ListBuilder::default();
    builder.enqueue(posted(Notification::new("x").in_group("g")));
    build(&mut builder, 0);
    let g = builder.group_by_key("g").expect("g").id();

    builder.enqueue(removed("x"));
    let report = build(&mut builder, 1);
    assert!(keys(&builder).is_empty());
    assert!(builder.group_by_key("g").is_none());
    assert!(builder.entry(g).is_none(), "group handle is stale");
    assert!(report.changes.removed.contains(&g));
}

#[test]
fn regrouping_moves_entry_between_groups() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g1")),
        posted(Notification::new("y").in_group("g1")),
    ]);
    build(&mut builder, 0);

    builder.enqueue(posted(Notification::new("x").in_group("g2")));
    let report = build(&mut builder, 1);
    assert_eq!(flattened(&builder), ["g1", "y", "g2", "x"]);
    assert!(report.changes.regrouped.contains(&id_of(&builder, "x")));
}

// -- Ordering --

#[test]
fn unstable_window_keeps_previous_order() {
    let mut builder = ListBuilder::default();
    builder.add_comparator(ComparatorFn::new("importance", |a, b| {
        importance(b).cmp(&importance(a))
    }));
    builder.enqueue_all([
        posted(Notification::new("a").with_importance(3)),
        posted(Notification::new("b").with_importance(5)),
        posted(Notification::new("c").with_importance(4)),
    ]);
    build(&mut builder, 0);
    assert_eq!(keys(&builder), ["b", "c", "a"]);

    builder.set_unstable_window(true);
    builder.enqueue_all([
        posted(Notification::new("d").with_importance(9)),
        posted(Notification::new("a").with_importance(7)),
    ]);
    build(&mut builder, 1);
    assert_eq!(keys(&builder), ["b", "c", "a", "d"], "newcomers go last");

    builder.set_unstable_window(false);
    build(&mut builder, 2);
    assert_eq!(keys(&builder), ["d", "a", "b", "c"]);
}

#[test]
fn child_comparator_orders_children() {
    let mut builder = ListBuilder::default();
    builder.set_child_comparator(ComparatorFn::new("importance", |a, b| {
        importance(b).cmp(&importance(a))
    }));
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g").with_importance(1)),
        posted(Notification::new("y").in_group("g").with_importance(6)),
        posted(Notification::new("z").in_group("g").with_importance(6)),
    ]);
    build(&mut builder, 0);
    assert_eq!(flattened(&builder), ["g", "y", "z", "x"]);
}

#[test]
fn passes_are_deterministic() {
    fn run() -> Vec<(String, Option<u32>)> {
        let mut builder = ListBuilder::default();
        builder.add_sectioner(SectionFn::new("loud", |e, _| Ok(importance(e) >= 5)));
        builder.enqueue_all([
            posted(Notification::new("q").with_importance(5)),
            posted(Notification::new("r").in_group("g")),
            posted(Notification::new("s")),
            posted(Notification::new("t").in_group("g").with_importance(8)),
        ]);
        build(&mut builder, 0);
        builder
            .store()
            .entries()
            .map(|e| (String::from(e.key()), e.stable_index()))
            .collect()
    }
    assert_eq!(run(), run());
}

// -- Stability suppression --

#[test]
fn reparent_is_deferred_then_applied() {
    let mut builder = ListBuilder::default();
    builder.enqueue(posted(Notification::new("x")));
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("x").in_group("g")));
    let report = build(&mut builder, 1);

    let g = builder.group_by_key("g").expect("g").id();
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.parent_kind(), Parent::Root, "previous parent kept");
    assert_eq!(x.attach_state().parent, x.previous_attach_state().parent);
    assert_eq!(x.suppressed_changes().parent, Parent::Group(g));
    assert_eq!(x.pending_parent(), Parent::Group(g));
    assert!(
        report
            .suppression_of(x.id())
            .is_some_and(|k| k.contains(ChangeKind::Reparent))
    );
    assert_eq!(keys(&builder), ["x"]);
    assert_eq!(builder.suppressed_pass_count(x.id()), 1);

    builder.set_unstable_window(false);
    assert!(builder.needs_build());
    let report = build(&mut builder, 2);

    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.parent(), Some(g));
    assert!(x.suppressed_changes().is_empty());
    assert_eq!(
        report.releases,
        [Release {
            entry: x.id(),
            matched: true,
        }]
    );
    assert_eq!(keys(&builder), ["g"]);
    assert_eq!(builder.suppressed_pass_count(x.id()), 0);
}

#[test]
fn stale_shadow_is_discarded() {
    let mut builder = ListBuilder::default();
    builder.enqueue(posted(Notification::new("x")));
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("x").in_group("g")));
    build(&mut builder, 1);

    builder.set_unstable_window(false);
    builder.enqueue(posted(Notification::new("x")));
    let report = build(&mut builder, 2);

    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.parent_kind(), Parent::Root);
    assert!(x.suppressed_changes().is_empty());
    assert_eq!(
        report.releases,
        [Release {
            entry: x.id(),
            matched: false,
        }]
    );
}

#[test]
fn new_entries_are_never_suppressed() {
    let mut builder = ListBuilder::default();
    builder.set_unstable_window(true);
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y")),
    ]);
    let report = build(&mut builder, 0);
    assert!(report.suppressions.is_empty());
    assert_eq!(keys(&builder), ["g", "y"]);
}

#[test]
fn promotion_is_deferred() {
    let lifting = Rc::new(Cell::new(false));
    let mut builder = ListBuilder::default();
    let flag = Rc::clone(&lifting);
    let lift = builder.add_promoter(PromoterFn::new("lift-x", move |e, _| {
        Ok(flag.get() && e.key() == "x")
    }));
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    lifting.set(true);
    builder.invalidate();
    let report = build(&mut builder, 1);

    let g = builder.group_by_key("g").expect("g").id();
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.parent(), Some(g));
    assert_eq!(x.promoter(), None);
    assert_eq!(x.suppressed_changes().parent, Parent::Root);
    assert_eq!(x.suppressed_changes().promoter, Some(lift));
    assert!(
        report
            .suppression_of(x.id())
            .is_some_and(|k| k.contains(ChangeKind::Promotion))
    );
    assert_eq!(flattened(&builder), ["g", "x", "y"]);

    builder.set_unstable_window(false);
    let report = build(&mut builder, 2);
    assert_eq!(flattened(&builder), ["g", "y", "x"]);
    assert!(report.releases.iter().all(|r| r.matched));
}

#[test]
fn non_disruptive_kinds_apply_immediately() {
    let config = BuilderConfig {
        disruption: DisruptionPolicy {
            reparent: false,
            ..DisruptionPolicy::ALL
        },
        ..BuilderConfig::shade()
    };
    let mut builder = ListBuilder::new(config);
    builder.enqueue(posted(Notification::new("x")));
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("x").in_group("g")));
    let report = build(&mut builder, 1);
    assert!(report.suppressions.is_empty());
    assert_eq!(keys(&builder), ["g"]);
}

#[test]
fn undersized_group_is_held_together() {
    let mut builder = ListBuilder::new(BuilderConfig::compact());
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);
    assert_eq!(flattened(&builder), ["g", "x", "y"]);

    builder.set_unstable_window(true);
    builder.enqueue(removed("y"));
    let report = build(&mut builder, 1);
    let g = builder.group_by_key("g").expect("g").id();
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(flattened(&builder), ["g", "x"], "group kept despite one child");
    assert_eq!(x.parent(), Some(g));
    assert_eq!(x.suppressed_changes().parent, Parent::Root);
    assert!(
        report
            .suppression_of(x.id())
            .is_some_and(|k| k.contains(ChangeKind::Reparent))
    );

    builder.set_unstable_window(false);
    build(&mut builder, 2);
    assert_eq!(keys(&builder), ["x"]);
    let g = builder.group_by_key("g").expect("g still has a member");
    assert_eq!(g.parent_kind(), Parent::Detached);
}

#[test]
fn deferred_promotion_keeps_undersized_group() {
    let lifting = Rc::new(Cell::new(false));
    let mut builder = ListBuilder::new(BuilderConfig {
        disruption: DisruptionPolicy {
            reparent: false,
            ..DisruptionPolicy::ALL
        },
        ..BuilderConfig::compact()
    });
    let flag = Rc::clone(&lifting);
    let lift = builder.add_promoter(PromoterFn::new("lift-x", move |e, _| {
        Ok(flag.get() && e.key() == "x")
    }));
    builder.enqueue_all([
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    lifting.set(true);
    builder.enqueue(removed("y"));
    let report = build(&mut builder, 1);

    let g = builder.group_by_key("g").expect("g").id();
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(flattened(&builder), ["g", "x"], "group kept for the held child");
    assert_eq!(x.parent(), Some(g));
    assert_eq!(x.promoter(), None);
    assert_eq!(x.attach_state().parent, x.previous_attach_state().parent);
    assert_eq!(x.suppressed_changes().parent, Parent::Root);
    assert_eq!(x.suppressed_changes().promoter, Some(lift));
    let kinds = report.suppression_of(x.id()).expect("x suppressed");
    assert!(kinds.contains(ChangeKind::Promotion), "got {kinds:?}");
    assert!(!kinds.contains(ChangeKind::Reparent), "got {kinds:?}");

    builder.set_unstable_window(false);
    let report = build(&mut builder, 2);
    assert_eq!(keys(&builder), ["x"]);
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(x.promoter(), Some(lift));
    assert!(report.releases.iter().all(|r| r.matched), "got {:?}", report.releases);
}

#[test]
fn lone_summary_holds_its_group() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
    ]);
    build(&mut builder, 0);
    assert_eq!(flattened(&builder), ["g", "s", "x"]);

    builder.set_unstable_window(true);
    builder.enqueue(removed("x"));
    let report = build(&mut builder, 1);

    let g = builder.group_by_key("g").expect("g");
    let s = builder.entry_by_key("s").expect("s");
    assert_eq!(flattened(&builder), ["g", "s"]);
    assert_eq!(g.summary(), Some(s.id()));
    assert_eq!(s.parent(), Some(g.id()));
    assert_eq!(s.suppressed_changes().parent, Parent::Root);
    assert!(
        report
            .suppression_of(s.id())
            .is_some_and(|k| k.contains(ChangeKind::Reparent))
    );

    builder.set_unstable_window(false);
    build(&mut builder, 2);
    assert_eq!(keys(&builder), ["s"]);
}

#[test]
fn regrouped_summary_returns_to_summary_slot() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
    ]);
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("s").in_group("h").as_summary()));
    let report = build(&mut builder, 1);

    let g = builder.group_by_key("g").expect("g");
    let h = builder.group_by_key("h").expect("h");
    let s = builder.entry_by_key("s").expect("s");
    assert_eq!(flattened(&builder), ["g", "s", "x"]);
    assert_eq!(g.summary(), Some(s.id()), "back in the summary slot");
    assert!(g.children().all(|c| c.key() != "s"));
    assert_eq!(h.parent_kind(), Parent::Detached);
    assert_eq!(s.suppressed_changes().parent, Parent::Group(h.id()));
    assert!(
        report
            .suppression_of(s.id())
            .is_some_and(|k| k.contains(ChangeKind::Reparent))
    );

    builder.set_unstable_window(false);
    build(&mut builder, 2);
    assert_eq!(flattened(&builder), ["g", "x", "s"]);
}

#[test]
fn summary_of_undersized_group_is_not_suppressed() {
    let mut builder = ListBuilder::new(BuilderConfig::compact());
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
        posted(Notification::new("y").in_group("g")),
    ]);
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(removed("y"));
    let report = build(&mut builder, 1);

    let s = builder.entry_by_key("s").expect("s");
    let x = builder.entry_by_key("x").expect("x");
    assert_eq!(flattened(&builder), ["g", "s", "x"]);
    assert_eq!(x.suppressed_changes().parent, Parent::Root);
    assert!(report.suppression_of(x.id()).is_some());
    assert!(s.suppressed_changes().is_empty());
    assert_eq!(report.suppression_of(s.id()), None);
}

#[test]
fn section_move_is_deferred() {
    let mut builder = ListBuilder::default();
    let hot = builder.add_sectioner(SectionFn::new("hot", |e, _| Ok(importance(e) >= 5)));
    builder.enqueue(posted(Notification::new("x")));
    build(&mut builder, 0);
    let x = id_of(&builder, "x");
    assert_eq!(builder.entry(x).and_then(|e| e.section()), Some(SectionId::DEFAULT));

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("x").with_importance(5)));
    let report = build(&mut builder, 1);
    let entry = builder.entry(x).expect("x");
    assert_eq!(entry.section(), Some(SectionId::DEFAULT));
    assert_eq!(entry.suppressed_changes().section, Some(hot));
    assert_eq!(entry.pending_section(), Some(hot));
    assert!(
        report
            .suppression_of(x)
            .is_some_and(|k| k.contains(ChangeKind::SectionMove))
    );

    builder.set_unstable_window(false);
    let report = build(&mut builder, 2);
    assert_eq!(builder.entry(x).and_then(|e| e.section()), Some(hot));
    assert_eq!(report.releases, [Release { entry: x, matched: true }]);
}

#[test]
fn long_suppression_is_flagged_as_starving() {
    let config = BuilderConfig {
        starvation_threshold: 2,
        ..BuilderConfig::shade()
    };
    let mut builder = ListBuilder::new(config);
    builder.enqueue(posted(Notification::new("x")));
    build(&mut builder, 0);

    builder.set_unstable_window(true);
    builder.enqueue(posted(Notification::new("x").in_group("g")));
    let first = build(&mut builder, 1);
    assert!(first.starving.is_empty());

    builder.invalidate();
    let second = build(&mut builder, 2);
    let x = id_of(&builder, "x");
    assert_eq!(second.starving, [x]);
    assert_eq!(builder.suppressed_pass_count(x), 2);
}

// -- Failures --

#[test]
fn failing_rule_is_a_reported_no_op() {
    let mut builder = ListBuilder::default();
    let flaky = builder.add_filter(FilterFn::new("flaky", |e, _| {
        if e.key() == "a" {
            Err(RuleError::failed("backend offline"))
        } else {
            Ok(false)
        }
    }));
    builder.enqueue_all([posted(Notification::new("a")), posted(Notification::new("b"))]);
    let report = build(&mut builder, 0);

    assert_eq!(keys(&builder), ["a", "b"]);
    assert_eq!(report.rule_failures.len(), 1);
    let failure = &report.rule_failures[0];
    assert_eq!(failure.entry, id_of(&builder, "a"));
    assert_eq!(failure.rule, RuleRef::Filter(flaky));
}

#[cfg(feature = "std")]
#[test]
fn panicking_comparator_falls_back_to_arrival_order() {
    use core::cmp::Ordering;

    let mut builder = ListBuilder::default();
    builder.add_comparator(ComparatorFn::new("explodes", |a, b| {
        if a.key() == "b" || b.key() == "b" {
            panic!("comparator bug");
        }
        Ordering::Equal
    }));
    builder.enqueue_all([
        posted(Notification::new("c")),
        posted(Notification::new("a")),
        posted(Notification::new("b")),
    ]);
    let report = build(&mut builder, 0);

    assert_eq!(keys(&builder), ["c", "a", "b"]);
    assert_eq!(report.rule_failures.len(), 1);
    let failure = &report.rule_failures[0];
    assert_eq!(failure.rule, RuleRef::Comparator);
    assert_eq!(failure.error, RuleError::Panicked);
}

#[cfg(feature = "std")]
#[test]
fn panicking_child_comparator_is_reported() {
    let mut builder = ListBuilder::default();
    builder.set_child_comparator(ComparatorFn::new("explodes", |_, _| {
        panic!("child comparator bug")
    }));
    builder.enqueue_all([
        posted(Notification::new("y").in_group("g")),
        posted(Notification::new("x").in_group("g")),
    ]);
    let report = build(&mut builder, 0);

    assert_eq!(flattened(&builder), ["g", "y", "x"]);
    assert_eq!(report.rule_failures.len(), 1);
    assert_eq!(report.rule_failures[0].rule, RuleRef::ChildComparator);
}

fn wipe_stable_indices(store: &mut EntryStore) {
    for state in &mut store.current {
        state.stable_index = None;
    }
}

#[test]
fn invariant_violation_rolls_the_pass_back() {
    let mut builder = ListBuilder::default();
    builder.enqueue(posted(Notification::new("a")));
    build(&mut builder, 0);

    builder.corrupt_before_verify = Some(wipe_stable_indices as fn(&mut EntryStore));
    builder.enqueue(posted(Notification::new("b")));
    let err = builder
        .build_list(1, &mut Tracer::none())
        .expect_err("corrupted pass must abort");
    let PassError::InvariantViolations(violations) = err;
    let a = id_of(&builder, "a");
    assert!(violations.contains(&InvariantViolation::MissingStableIndex { entry: a }));

    assert_eq!(keys(&builder), ["a"], "committed list unchanged");
    assert_eq!(builder.entry(a).and_then(|e| e.stable_index()), Some(0));
    let b = builder.entry_by_key("b").expect("event stays applied");
    assert_eq!(b.parent_kind(), Parent::Detached);
    assert!(builder.needs_build());

    builder.corrupt_before_verify = None;
    let report = build(&mut builder, 2);
    assert_eq!(keys(&builder), ["a", "b"]);
    assert!(report.changes.added.contains(&id_of(&builder, "b")));
}

// -- Inputs and reports --

#[test]
fn queued_events_coalesce_into_one_pass() {
    let mut builder = ListBuilder::default();
    assert!(!builder.needs_build());
    builder.enqueue_all([
        posted(Notification::new("a")),
        posted(Notification::new("b")),
        removed("a"),
    ]);
    assert!(builder.needs_build());
    let report = build(&mut builder, 0);
    assert!(!builder.needs_build());

    assert_eq!(keys(&builder), ["b"]);
    assert_eq!(report.changes.added.len(), 2);
    assert_eq!(report.changes.removed.len(), 1);
    assert!(builder.entry(report.changes.removed[0]).is_none());
    assert!(report.changes.list_changed);
    assert_eq!(builder.pass_index(), 1);
}

#[test]
fn summary_update_reports_members_as_updated() {
    let mut builder = ListBuilder::default();
    builder.enqueue_all([
        posted(Notification::new("s").in_group("g").as_summary()),
        posted(Notification::new("x").in_group("g")),
    ]);
    build(&mut builder, 0);

    builder.enqueue(posted(
        Notification::new("s").in_group("g").as_summary().with_post_time(5),
    ));
    let report = build(&mut builder, 1);
    assert!(report.changes.updated.contains(&id_of(&builder, "x")));
    assert!(report.changes.updated.contains(&id_of(&builder, "s")));
    assert!(!report.changes.list_changed);
}

#[test]
fn pass_error_display_counts_violations() {
    let mut store = EntryStore::new();
    let a = store.post(Notification::new("a"));
    let err = PassError::InvariantViolations(alloc::vec![
        InvariantViolation::MissingStableIndex { entry: a },
        InvariantViolation::SectionMismatch { entry: a },
    ]);
    let text = alloc::format!("{err}");
    assert!(text.starts_with("pass rolled back after 2 invariant violations"), "got {text}");
}

#[cfg(feature = "trace")]
#[test]
fn tracer_sees_every_stage() {
    use crate::trace::{PassEndEvent, TraceSink};

    #[derive(Default)]
    struct Stages {
        begun: Vec<StageKind>,
        outcome: Option<PassOutcome>,
    }
    impl TraceSink for Stages {
        fn on_stage_begin(&mut self, e: &StageEvent) {
            self.begun.push(e.stage);
        }
        fn on_pass_end(&mut self, e: &PassEndEvent) {
            self.outcome = Some(e.outcome);
        }
    }

    let mut sink = Stages::default();
    let mut builder = ListBuilder::default();
    builder.enqueue(posted(Notification::new("a")));
    builder
        .build_list(0, &mut Tracer::new(&mut sink))
        .expect("pass commits");
    assert_eq!(sink.begun, StageKind::ALL);
    assert_eq!(sink.outcome, Some(PassOutcome::Committed));
}
