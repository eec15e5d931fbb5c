// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Upstream notification payload.

use alloc::string::String;

/// The payload of a leaf entry, as delivered by the notification source.
///
/// The store treats everything except [`key`](Self::key),
/// [`group_key`](Self::group_key) and
/// [`is_group_summary`](Self::is_group_summary) as opaque data for rules to
/// inspect.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Notification {
    /// Unique key; posting the same key again updates the entry.
    pub key: String,
    /// Key of the group this notification belongs to, if any.
    pub group_key: Option<String>,
    /// Whether this notification is the summary of its group.
    pub is_group_summary: bool,
    /// Upstream importance; higher is more important.
    pub importance: u8,
    /// Post time in milliseconds.
    pub post_time: u64,
}

impl Notification {
    /// Default importance for notifications that do not set one.
    pub const DEFAULT_IMPORTANCE: u8 = 3;

    /// Creates an ungrouped notification with default importance.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            group_key: None,
            is_group_summary: false,
            importance: Self::DEFAULT_IMPORTANCE,
            post_time: 0,
        }
    }

    /// Places the notification in the group with the given key.
    #[must_use]
    pub fn in_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Marks the notification as its group's summary.
    #[must_use]
    pub fn as_summary(mut self) -> Self {
        self.is_group_summary = true;
        self
    }

    /// Sets the importance.
    #[must_use]
    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the post time.
    #[must_use]
    pub fn with_post_time(mut self, post_time: u64) -> Self {
        self.post_time = post_time;
        self
    }
}
