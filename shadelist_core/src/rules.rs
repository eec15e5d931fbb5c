// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pluggable rule contract.
//!
//! The builder never decides on its own what is visible, promoted, sectioned
//! or ordered. It asks the rules registered in a [`RuleRegistry`]:
//!
//! | Rule | Question | Outcome recorded as |
//! |---|---|---|
//! | [`Filter`] | should this leaf be hidden? | [`FilterId`] |
//! | [`Promoter`] | should this group child move to the top level? | [`PromoterId`] |
//! | [`Sectioner`] | does this top-level entry belong to my section? | [`SectionId`] |
//! | [`Comparator`] | how do two entries of one section order? | — |
//!
//! Rules of one kind run in registration order and the first positive answer
//! wins. A rule that returns [`RuleError`] (or panics, with the `std`
//! feature) is treated as having answered "no" for that entry; the failure is
//! collected as a [`RuleFailure`].
//!
//! The `*Fn` adapters ([`FilterFn`] and friends) turn closures into rules.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use crate::entry::{EntryId, ListEntry};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Registration slot of a [`Filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(pub(crate) u16);

/// Registration slot of a [`Promoter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromoterId(pub(crate) u16);

/// A section: the registration slot of its [`Sectioner`], or
/// [`DEFAULT`](Self::DEFAULT).
///
/// Sections order by registration, and the default section sorts last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionId(pub(crate) u16);

impl FilterId {
    /// Returns the registration index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl PromoterId {
    /// Returns the registration index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl SectionId {
    /// The last-resort section for entries no sectioner claims.
    pub const DEFAULT: Self = Self(u16::MAX);

    /// Returns the registration index (`u16::MAX` for the default section).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Returns whether this is the default section.
    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == u16::MAX
    }
}

// ---------------------------------------------------------------------------
// Context and errors
// ---------------------------------------------------------------------------

/// Ambient information handed to every rule invocation of a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassContext {
    /// Monotonic pass counter, starting at 0.
    pub pass_index: u64,
    /// Caller-supplied time of the pass in milliseconds.
    pub now: u64,
}

/// Why a rule could not answer for an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleError {
    /// The rule reported a failure.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
    /// The rule panicked (caught with the `std` feature).
    Panicked,
}

impl RuleError {
    /// Creates a [`RuleError::Failed`].
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "rule failed: {reason}"),
            Self::Panicked => f.write_str("rule panicked"),
        }
    }
}

impl core::error::Error for RuleError {}

/// Which registered rule failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleRef {
    /// A filter.
    Filter(FilterId),
    /// A promoter.
    Promoter(PromoterId),
    /// The sectioner of a section.
    Sectioner(SectionId),
    /// One of the top-level comparators. The sort cannot tell which.
    Comparator,
    /// The child comparator.
    ChildComparator,
}

/// A rule failure recorded during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleFailure {
    /// The entry the rule was asked about.
    pub entry: EntryId,
    /// The rule that failed.
    pub rule: RuleRef,
    /// What went wrong.
    pub error: RuleError,
}

// ---------------------------------------------------------------------------
// Rule traits
// ---------------------------------------------------------------------------

/// Hides leaf entries from the list.
pub trait Filter {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Called once at the start of every pass.
    fn on_pass_begin(&mut self, ctx: &PassContext) {
        _ = ctx;
    }

    /// Returns whether `entry` should be excluded.
    fn should_exclude(&self, entry: &ListEntry<'_>, ctx: &PassContext)
    -> Result<bool, RuleError>;
}

/// Lifts group children out to the top level.
pub trait Promoter {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Called once at the start of every pass.
    fn on_pass_begin(&mut self, ctx: &PassContext) {
        _ = ctx;
    }

    /// Returns whether the group child `entry` should become top-level.
    fn should_promote_to_top_level(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
    ) -> Result<bool, RuleError>;
}

/// Claims top-level entries for one section.
pub trait Sectioner {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Called once at the start of every pass.
    fn on_pass_begin(&mut self, ctx: &PassContext) {
        _ = ctx;
    }

    /// Returns whether the top-level `entry` belongs to this section.
    fn is_in_section(&self, entry: &ListEntry<'_>, ctx: &PassContext) -> Result<bool, RuleError>;
}

/// Orders entries within a section, or children within a group.
///
/// `compare` must be a total order. With the `std` feature a panic, including
/// the one the slice sort may raise for an inconsistent order, is recorded as
/// a [`RuleFailure`] and the affected list falls back to its order without
/// comparators. Without `std` the panic unwinds out of the pass and leaves the
/// builder half-built; it must not be used again.
pub trait Comparator {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Compares two entries.
    fn compare(&self, a: &ListEntry<'_>, b: &ListEntry<'_>) -> Ordering;
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// A [`Filter`] backed by a closure.
pub struct FilterFn<F> {
    name: &'static str,
    f: F,
}

impl<F> FilterFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    /// Wraps `f` as a filter named `name`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Filter for FilterFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn should_exclude(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
    ) -> Result<bool, RuleError> {
        (self.f)(entry, ctx)
    }
}

/// A [`Promoter`] backed by a closure.
pub struct PromoterFn<F> {
    name: &'static str,
    f: F,
}

impl<F> PromoterFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    /// Wraps `f` as a promoter named `name`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Promoter for PromoterFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn should_promote_to_top_level(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
    ) -> Result<bool, RuleError> {
        (self.f)(entry, ctx)
    }
}

/// A [`Sectioner`] backed by a closure.
pub struct SectionFn<F> {
    name: &'static str,
    f: F,
}

impl<F> SectionFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    /// Wraps `f` as the sectioner of a section named `name`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Sectioner for SectionFn<F>
where
    F: Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn is_in_section(&self, entry: &ListEntry<'_>, ctx: &PassContext) -> Result<bool, RuleError> {
        (self.f)(entry, ctx)
    }
}

/// A [`Comparator`] backed by a closure.
pub struct ComparatorFn<F> {
    name: &'static str,
    f: F,
}

impl<F> ComparatorFn<F>
where
    F: Fn(&ListEntry<'_>, &ListEntry<'_>) -> Ordering,
{
    /// Wraps `f` as a comparator named `name`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Comparator for ComparatorFn<F>
where
    F: Fn(&ListEntry<'_>, &ListEntry<'_>) -> Ordering,
{
    fn name(&self) -> &str {
        self.name
    }

    fn compare(&self, a: &ListEntry<'_>, b: &ListEntry<'_>) -> Ordering {
        (self.f)(a, b)
    }
}

macro_rules! debug_named {
    ($($ty:ident),*) => {$(
        impl<F> fmt::Debug for $ty<F> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty)).field("name", &self.name).finish_non_exhaustive()
            }
        }
    )*};
}

debug_named!(FilterFn, PromoterFn, SectionFn, ComparatorFn);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The ordered set of rules a builder consults.
#[derive(Default)]
pub struct RuleRegistry {
    filters: Vec<Box<dyn Filter>>,
    promoters: Vec<Box<dyn Promoter>>,
    sectioners: Vec<Box<dyn Sectioner>>,
    comparators: Vec<Box<dyn Comparator>>,
    child_comparator: Option<Box<dyn Comparator>>,
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("filters", &self.filters.len())
            .field("promoters", &self.promoters.len())
            .field("sectioners", &self.sectioners.len())
            .field("comparators", &self.comparators.len())
            .field("child_comparator", &self.child_comparator.is_some())
            .finish()
    }
}

/// Converts a registration count to a rule slot.
///
/// # Panics
///
/// Panics past 65 535 rules of one kind; `u16::MAX` is reserved for
/// [`SectionId::DEFAULT`].
fn next_slot(len: usize, kind: &str) -> u16 {
    match u16::try_from(len) {
        Ok(slot) if slot < u16::MAX => slot,
        _ => panic!("too many {kind} rules registered"),
    }
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter; it runs after every filter registered before it.
    pub fn add_filter(&mut self, filter: impl Filter + 'static) -> FilterId {
        let id = FilterId(next_slot(self.filters.len(), "filter"));
        self.filters.push(Box::new(filter));
        id
    }

    /// Appends a promoter.
    pub fn add_promoter(&mut self, promoter: impl Promoter + 'static) -> PromoterId {
        let id = PromoterId(next_slot(self.promoters.len(), "promoter"));
        self.promoters.push(Box::new(promoter));
        id
    }

    /// Appends a section. Sections render in registration order, before
    /// [`SectionId::DEFAULT`].
    pub fn add_sectioner(&mut self, sectioner: impl Sectioner + 'static) -> SectionId {
        let id = SectionId(next_slot(self.sectioners.len(), "sectioner"));
        self.sectioners.push(Box::new(sectioner));
        id
    }

    /// Appends a top-level comparator. Later comparators break ties of
    /// earlier ones.
    pub fn add_comparator(&mut self, comparator: impl Comparator + 'static) {
        self.comparators.push(Box::new(comparator));
    }

    /// Sets the comparator that orders children inside each group. Without
    /// one, children keep their arrival order.
    pub fn set_child_comparator(&mut self, comparator: impl Comparator + 'static) {
        self.child_comparator = Some(Box::new(comparator));
    }

    /// Returns the name of a filter.
    #[must_use]
    pub fn filter_name(&self, id: FilterId) -> Option<&str> {
        self.filters.get(usize::from(id.0)).map(|f| f.name())
    }

    /// Returns the name of a promoter.
    #[must_use]
    pub fn promoter_name(&self, id: PromoterId) -> Option<&str> {
        self.promoters.get(usize::from(id.0)).map(|p| p.name())
    }

    /// Returns the name of a section; the default section is `"default"`.
    #[must_use]
    pub fn section_name(&self, id: SectionId) -> Option<&str> {
        if id.is_default() {
            return Some("default");
        }
        self.sectioners.get(usize::from(id.0)).map(|s| s.name())
    }

    /// Returns the name of any registered rule.
    ///
    /// [`RuleRef::Comparator`] names the whole top-level chain and has no
    /// single name.
    #[must_use]
    pub fn rule_name(&self, rule: RuleRef) -> Option<&str> {
        match rule {
            RuleRef::Filter(id) => self.filter_name(id),
            RuleRef::Promoter(id) => self.promoter_name(id),
            RuleRef::Sectioner(id) => self.section_name(id),
            RuleRef::Comparator => None,
            RuleRef::ChildComparator => self.child_comparator.as_ref().map(|c| c.name()),
        }
    }

    /// Returns the number of registered sections, excluding the default.
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sectioners.len()
    }

    /// Notifies every stateful rule that a pass is starting.
    pub fn begin_pass(&mut self, ctx: &PassContext) {
        for filter in &mut self.filters {
            filter.on_pass_begin(ctx);
        }
        for promoter in &mut self.promoters {
            promoter.on_pass_begin(ctx);
        }
        for sectioner in &mut self.sectioners {
            sectioner.on_pass_begin(ctx);
        }
    }

    /// Returns the first filter excluding `entry`.
    ///
    /// Failing filters count as "keep" and are appended to `failures`.
    pub fn first_excluding(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
        failures: &mut Vec<RuleFailure>,
    ) -> Option<FilterId> {
        (0..).map(FilterId).zip(&self.filters).find_map(|(id, filter)| {
            answer(entry, RuleRef::Filter(id), failures, || {
                filter.should_exclude(entry, ctx)
            })
            .then_some(id)
        })
    }

    /// Returns the first promoter lifting `entry` to the top level.
    pub fn promoter_for(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
        failures: &mut Vec<RuleFailure>,
    ) -> Option<PromoterId> {
        (0..).map(PromoterId).zip(&self.promoters).find_map(|(id, promoter)| {
            answer(entry, RuleRef::Promoter(id), failures, || {
                promoter.should_promote_to_top_level(entry, ctx)
            })
            .then_some(id)
        })
    }

    /// Returns the first section claiming `entry`, or
    /// [`SectionId::DEFAULT`].
    pub fn section_for(
        &self,
        entry: &ListEntry<'_>,
        ctx: &PassContext,
        failures: &mut Vec<RuleFailure>,
    ) -> SectionId {
        (0..)
            .map(SectionId)
            .zip(&self.sectioners)
            .find_map(|(id, sectioner)| {
                answer(entry, RuleRef::Sectioner(id), failures, || {
                    sectioner.is_in_section(entry, ctx)
                })
                .then_some(id)
            })
            .unwrap_or(SectionId::DEFAULT)
    }

    /// Chains the top-level comparators.
    #[must_use]
    pub fn compare_top_level(&self, a: &ListEntry<'_>, b: &ListEntry<'_>) -> Ordering {
        self.comparators
            .iter()
            .map(|c| c.compare(a, b))
            .find(|&ord| ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Applies the child comparator, if one is set.
    #[must_use]
    pub fn compare_children(&self, a: &ListEntry<'_>, b: &ListEntry<'_>) -> Ordering {
        self.child_comparator
            .as_ref()
            .map_or(Ordering::Equal, |c| c.compare(a, b))
    }
}

/// Runs one rule invocation, turning failures into "no".
fn answer(
    entry: &ListEntry<'_>,
    rule: RuleRef,
    failures: &mut Vec<RuleFailure>,
    call: impl FnOnce() -> Result<bool, RuleError>,
) -> bool {
    match invoke(call) {
        Ok(yes) => yes,
        Err(error) => {
            failures.push(RuleFailure {
                entry: entry.id(),
                rule,
                error,
            });
            false
        }
    }
}

#[cfg(feature = "std")]
fn invoke(call: impl FnOnce() -> Result<bool, RuleError>) -> Result<bool, RuleError> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(RuleError::Panicked))
}

#[cfg(not(feature = "std"))]
fn invoke(call: impl FnOnce() -> Result<bool, RuleError>) -> Result<bool, RuleError> {
    call()
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::entry::{EntryStore, Notification};

    fn ctx() -> PassContext {
        PassContext {
            pass_index: 0,
            now: 0,
        }
    }

    fn key_is(
        key: &'static str,
    ) -> impl Fn(&ListEntry<'_>, &PassContext) -> Result<bool, RuleError> {
        move |e, _| Ok(e.key() == key)
    }

    #[test]
    fn first_excluding_filter_wins() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a"));
        let mut rules = RuleRegistry::new();
        rules.add_filter(FilterFn::new("never", |_, _| Ok(false)));
        let hit = rules.add_filter(FilterFn::new("a", key_is("a")));
        rules.add_filter(FilterFn::new("always", |_, _| Ok(true)));

        let mut failures = Vec::new();
        let got = rules.first_excluding(&store.entry(a), &ctx(), &mut failures);
        assert_eq!(got, Some(hit));
        assert!(failures.is_empty());
        assert_eq!(rules.filter_name(hit), Some("a"));
    }

    #[test]
    fn failing_filter_falls_through_and_is_recorded() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a"));
        let mut rules = RuleRegistry::new();
        let broken = rules.add_filter(FilterFn::new("broken", |_, _| {
            Err(RuleError::failed("boom"))
        }));
        let next = rules.add_filter(FilterFn::new("always", |_, _| Ok(true)));

        let mut failures = Vec::new();
        let got = rules.first_excluding(&store.entry(a), &ctx(), &mut failures);
        assert_eq!(got, Some(next));
        assert_eq!(
            failures,
            vec![RuleFailure {
                entry: a,
                rule: RuleRef::Filter(broken),
                error: RuleError::failed("boom"),
            }]
        );
    }

    #[test]
    fn unclaimed_entries_land_in_default_section() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a"));
        let b = store.post(Notification::new("b"));
        let mut rules = RuleRegistry::new();
        let first = rules.add_sectioner(SectionFn::new("first", key_is("a")));
        let second = rules.add_sectioner(SectionFn::new("second", key_is("a")));

        let mut failures = Vec::new();
        assert_eq!(rules.section_for(&store.entry(a), &ctx(), &mut failures), first);
        assert_eq!(
            rules.section_for(&store.entry(b), &ctx(), &mut failures),
            SectionId::DEFAULT
        );
        assert!(first < second && second < SectionId::DEFAULT);
        assert_eq!(rules.section_name(SectionId::DEFAULT), Some("default"));
    }

    #[test]
    fn failing_sectioner_does_not_match() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a"));
        let mut rules = RuleRegistry::new();
        rules.add_sectioner(SectionFn::new("broken", |_, _| Err(RuleError::failed("no"))));

        let mut failures = Vec::new();
        let got = rules.section_for(&store.entry(a), &ctx(), &mut failures);
        assert_eq!(got, SectionId::DEFAULT);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, RuleRef::Sectioner(SectionId(0)));
    }

    #[test]
    fn comparators_chain_until_decisive() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a").with_importance(4));
        let b = store.post(Notification::new("b").with_importance(4).with_post_time(9));
        let mut rules = RuleRegistry::new();
        let importance = |x: &ListEntry<'_>| x.notification().map_or(0, |n| n.importance);
        rules.add_comparator(ComparatorFn::new("importance", move |x, y| {
            importance(y).cmp(&importance(x))
        }));
        let time = |x: &ListEntry<'_>| x.notification().map_or(0, |n| n.post_time);
        rules.add_comparator(ComparatorFn::new("newest", move |x, y| time(y).cmp(&time(x))));

        let (ea, eb) = (store.entry(a), store.entry(b));
        assert_eq!(rules.compare_top_level(&ea, &eb), Ordering::Greater);
        assert_eq!(rules.compare_top_level(&eb, &ea), Ordering::Less);
        assert_eq!(rules.compare_children(&ea, &eb), Ordering::Equal);
    }

    #[test]
    fn pass_begin_reaches_stateful_rules() {
        use alloc::rc::Rc;
        use core::cell::Cell;

        struct Clocked(Rc<Cell<u64>>);
        impl Filter for Clocked {
            fn name(&self) -> &str {
                "clocked"
            }
            fn on_pass_begin(&mut self, ctx: &PassContext) {
                self.0.set(ctx.now);
            }
            fn should_exclude(
                &self,
                _: &ListEntry<'_>,
                _: &PassContext,
            ) -> Result<bool, RuleError> {
                Ok(false)
            }
        }

        let seen = Rc::new(Cell::new(0));
        let mut rules = RuleRegistry::new();
        rules.add_filter(Clocked(Rc::clone(&seen)));
        rules.begin_pass(&PassContext {
            pass_index: 3,
            now: 1_234,
        });
        assert_eq!(seen.get(), 1_234);
    }

    #[cfg(feature = "std")]
    #[test]
    fn panicking_promoter_is_caught() {
        let mut store = EntryStore::new();
        let a = store.post(Notification::new("a"));
        let mut rules = RuleRegistry::new();
        rules.add_promoter(PromoterFn::new("panics", |_, _| panic!("promoter bug")));

        let mut failures = Vec::new();
        assert_eq!(rules.promoter_for(&store.entry(a), &ctx(), &mut failures), None);
        assert_eq!(failures[0].error, RuleError::Panicked);
    }

    #[test]
    fn rule_error_display() {
        assert_eq!(
            alloc::format!("{}", RuleError::failed("offline")),
            "rule failed: offline"
        );
        assert_eq!(alloc::format!("{}", RuleError::Panicked), "rule panicked");
    }
}
