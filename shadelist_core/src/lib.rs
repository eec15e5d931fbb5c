// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Notification list construction with visual stability.
//!
//! `shadelist_core` turns a stream of posted and removed notifications into
//! the ordered, grouped and sectioned list a notification shade renders. It
//! is `no_std` compatible (with `alloc`) and keeps entries in struct-of-arrays
//! storage addressed by generational handles.
//!
//! # Architecture
//!
//! Every rebuild is one atomic *pass* that runs a fixed sequence of stages
//! and either commits a complete new list or rolls back:
//!
//! ```text
//!   ChangeEvent batch ──► ListBuilder::enqueue*()
//!                               │
//!                               ▼
//!   ListBuilder::build_list() ──► apply ─► filter ─► group ─► promote
//!                                                               │
//!        ┌──────────────────────────────────────────────────────┘
//!        ▼
//!   suppress ─► prune ─► section ─► sort ─► finalize ─► verify ─► commit
//!                                                                   │
//!        ┌──────────────────────────────────────────────────────────┘
//!        ▼
//!   PassReport ──► ListRenderer::apply()
//! ```
//!
//! **[`entry`]** — Struct-of-arrays entry arena with generational handles.
//! Each entry carries a `previous` and a `current` attach state; stages only
//! write `current`, and commit snapshots it into `previous`.
//!
//! **[`rules`]** — Pluggable filters, promoters, sectioners and comparators in
//! a fixed, ordered registry. A failing rule is a reported no-op.
//!
//! **[`stability`]** — The suppressor that defers disruptive structural
//! changes while an unstable window (such as a shade gesture) is open.
//!
//! **[`builder`]** — The [`ListBuilder`](builder::ListBuilder) pass pipeline,
//! pass reports and invariant verification.
//!
//! **[`dirty`]** — Change channels via `understory_dirty`. Upstream posts and
//! removals mark entries; a summary update propagates to its group's
//! members. Commit drains them into
//! [`PassChanges`](builder::PassChanges).
//!
//! **[`consumer`]** — The [`ListRenderer`](consumer::ListRenderer) trait that
//! renderers implement to consume committed passes.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! pass instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Catches panics raised by rules and reports
//!   them as rule failures.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-entry
//!   attach-field change events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod builder;
pub mod consumer;
pub mod dirty;
pub mod entry;
pub mod rules;
pub mod stability;
pub mod trace;
