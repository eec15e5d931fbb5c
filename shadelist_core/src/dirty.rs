// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! The [`EntryStore`](crate::entry::EntryStore) records upstream changes
//! with multi-channel dirty tracking (via [`understory_dirty`]). The builder
//! drains every channel when a pass commits and reports the result as
//! [`PassChanges`](crate::builder::PassChanges).
//!
//! # Propagation semantics
//!
//! - **Propagating**: [`CONTENT`] has dependency edges from each member to
//!   its group. Posting a group summary marks the group with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy), so every member is
//!   reported as updated too, since members render with their group's
//!   header.
//! - **Local-only**: [`MEMBERSHIP`] is marked on entries that were added,
//!   removed or moved between groups, and on the groups they touched.
//!
//! Channels are only drained on commit. An aborted pass leaves them intact
//! for the next one.

use understory_dirty::Channel;

/// Notification content changed and the entry must be rebound.
pub const CONTENT: Channel = Channel::new(0);

/// Group membership changed (post, removal or group-key change).
pub const MEMBERSHIP: Channel = Channel::new(1);
