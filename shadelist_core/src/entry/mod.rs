// Copyright 2026 the Shadelist Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entry data model.
//!
//! An *entry* is a node in the notification list. Each entry has:
//!
//! - An identity ([`EntryId`]): a generational handle that becomes stale when
//!   the entry is destroyed, so a recycled slot is never mistaken for the old
//!   entry.
//! - A kind ([`EntryKind`]): a leaf [`Notification`] or a group of them.
//!   Groups are derived from the notifications' group keys; they are created
//!   with their first member and destroyed once empty and detached.
//! - Two [`AttachState`] records: `previous` (last committed pass) and
//!   `current` (the pass under construction), each with a
//!   [`SuppressedChanges`] shadow.
//!
//! Entries are stored in struct-of-arrays layout ([`EntryStore`]) and read
//! through the borrowed [`ListEntry`] view.
//!
//! # Dirty tracking
//!
//! Upstream posts and removals automatically mark the corresponding dirty
//! channel (see [`dirty`](crate::dirty)).

mod attach;
mod id;
mod notification;
mod store;
mod view;

pub use attach::{AttachState, Parent, SuppressedChanges};
pub use id::{EntryId, EntryKind, INVALID};
pub use notification::Notification;
pub use store::EntryStore;
pub use view::{Children, Entries, ListEntry};
