// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Each pass is a `B`/`E` span at `ts = now * 1000` µs, with its stages as
/// nested spans at the same timestamp. Everything else is an instant event
/// stamped with the time of the pass it belongs to.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut ts = 0_u64;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::PassBegin {
                pass_index,
                now,
                pending_events,
                unstable,
            } => {
                ts = ms_to_us(now);
                events.push(json!({
                    "ph": "B",
                    "name": "pass",
                    "cat": "Pass",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "pass_index": pass_index,
                        "pending_events": pending_events,
                        "unstable": unstable,
                    }
                }));
            }
            RecordedEvent::StageBegin {
                pass_index,
                stage,
                entries,
            } => {
                events.push(json!({
                    "ph": "B",
                    "name": stage.name(),
                    "cat": "Stage",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "pass_index": pass_index,
                        "entries": entries,
                    }
                }));
            }
            RecordedEvent::StageEnd {
                pass_index,
                stage,
                entries,
            } => {
                events.push(json!({
                    "ph": "E",
                    "name": stage.name(),
                    "cat": "Stage",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "pass_index": pass_index,
                        "produced": entries,
                    }
                }));
            }
            RecordedEvent::RuleFailure {
                pass_index,
                entry,
                rule,
                reason,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "RuleFailure",
                    "cat": "Rules",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "pass_index": pass_index,
                        "entry": format!("{entry:?}"),
                        "rule": format!("{rule:?}"),
                        "reason": reason.as_deref().unwrap_or("panicked"),
                    }
                }));
            }
            RecordedEvent::Suppression {
                pass_index,
                entry,
                kinds,
                kept_parent,
                proposed_parent,
                proposed_section,
            } => {
                let kinds: Vec<String> = kinds.iter().map(|k| format!("{k:?}")).collect();
                events.push(json!({
                    "ph": "i",
                    "name": "Suppression",
                    "cat": "Stability",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "pass_index": pass_index,
                        "entry": format!("{entry:?}"),
                        "kinds": kinds,
                        "kept_parent": format!("{kept_parent:?}"),
                        "proposed_parent": format!("{proposed_parent:?}"),
                        "proposed_section": proposed_section,
                    }
                }));
            }
            RecordedEvent::Release {
                pass_index,
                entry,
                matched,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Release",
                    "cat": "Stability",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "pass_index": pass_index,
                        "entry": format!("{entry:?}"),
                        "matched": matched,
                    }
                }));
            }
            RecordedEvent::Starvation {
                pass_index,
                entry,
                suppressed_passes,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Starvation",
                    "cat": "Stability",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "pass_index": pass_index,
                        "entry": format!("{entry:?}"),
                        "suppressed_passes": suppressed_passes,
                    }
                }));
            }
            RecordedEvent::InvariantViolation {
                pass_index,
                entry,
                kind,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "InvariantViolation",
                    "cat": "Verify",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "pass_index": pass_index,
                        "entry": format!("{entry:?}"),
                        "kind": format!("{kind:?}"),
                    }
                }));
            }
            RecordedEvent::PassEnd {
                pass_index,
                now,
                outcome,
                top_level,
                attached,
                suppressed,
                rule_failures,
            } => {
                events.push(json!({
                    "ph": "E",
                    "name": "pass",
                    "cat": "Pass",
                    "ts": ms_to_us(now),
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "pass_index": pass_index,
                        "outcome": format!("{outcome:?}"),
                        "top_level": top_level,
                        "attached": attached,
                        "suppressed": suppressed,
                        "rule_failures": rule_failures,
                    }
                }));
            }
            RecordedEvent::AttachChangesCount { pass_index, count } => {
                events.push(json!({
                    "ph": "i",
                    "name": "AttachChanges",
                    "cat": "Rich",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "pass_index": pass_index,
                        "count": count,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(1000)
}
