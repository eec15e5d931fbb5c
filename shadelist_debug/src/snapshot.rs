// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON snapshots of the committed list.
//!
//! [`snapshot`] captures every top-level entry with its summary and children,
//! plus each entry's attach state and suppression shadow, as a
//! [`serde_json::Value`]. Snapshots of two passes can be diffed to see what
//! a pass changed on screen.

use std::io::{self, Write};

use serde_json::{Value, json};

use shadelist_core::builder::ListBuilder;
use shadelist_core::entry::{AttachState, ListEntry, Parent, SuppressedChanges};
use shadelist_core::rules::RuleRegistry;

/// Captures the committed list of `builder`.
#[must_use]
pub fn snapshot(builder: &ListBuilder) -> Value {
    let rules = builder.rules();
    let list: Vec<Value> = builder
        .shade_list()
        .map(|top| {
            let mut node = entry_json(rules, &top);
            if top.is_group() {
                node["summary"] = top
                    .summary()
                    .and_then(|id| builder.entry(id))
                    .map_or(Value::Null, |s| entry_json(rules, &s));
                node["children"] = top.children().map(|c| entry_json(rules, &c)).collect();
            }
            node
        })
        .collect();
    json!({
        "pass_index": builder.pass_index(),
        "unstable": builder.is_unstable(),
        "list": list,
    })
}

/// Writes [`snapshot`] as pretty-printed JSON.
pub fn write_snapshot(builder: &ListBuilder, writer: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer_pretty(writer, &snapshot(builder))?;
    Ok(())
}

fn entry_json(rules: &RuleRegistry, entry: &ListEntry<'_>) -> Value {
    let mut node = json!({
        "key": entry.key(),
        "kind": format!("{:?}", entry.kind()),
        "id": format!("{:?}", entry.id()),
        "state": state_json(rules, entry.attach_state()),
    });
    let shadow = entry.suppressed_changes();
    if !shadow.is_empty() {
        node["held"] = shadow_json(rules, shadow);
    }
    if let Some(n) = entry.notification() {
        node["importance"] = n.importance.into();
        node["post_time"] = n.post_time.into();
    }
    node
}

fn parent_json(parent: Parent) -> Value {
    match parent {
        Parent::Detached => Value::Null,
        Parent::Root => "root".into(),
        Parent::Group(group) => format!("{group:?}").into(),
    }
}

fn state_json(rules: &RuleRegistry, state: &AttachState) -> Value {
    json!({
        "parent": parent_json(state.parent),
        "stable_index": state.stable_index,
        "section": state.section.and_then(|s| rules.section_name(s)),
        "excluding_filter": state.excluding_filter.and_then(|f| rules.filter_name(f)),
        "promoter": state.promoter.and_then(|p| rules.promoter_name(p)),
    })
}

fn shadow_json(rules: &RuleRegistry, shadow: &SuppressedChanges) -> Value {
    json!({
        "parent": parent_json(shadow.parent),
        "section": shadow.section.and_then(|s| rules.section_name(s)),
        "promoter": shadow.promoter.and_then(|p| rules.promoter_name(p)),
    })
}
