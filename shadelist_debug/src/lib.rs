// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, snapshots and Chrome trace export for
//! shadelist diagnostics.
//!
//! This crate provides [`TraceSink`](shadelist_core::trace::TraceSink)
//! implementations and list dumps for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output,
//!   and [`pretty::write_tree`] for an indented dump of the committed list.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.
//! - [`snapshot::snapshot`]: JSON capture of the committed list and every
//!   entry's attach state.

pub mod chrome;
pub mod pretty;
pub mod recorder;
pub mod snapshot;
