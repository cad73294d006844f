// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PICurrent-style slot tables with request and thread scope.
//!
//! A slot is a small, integer-addressed context value propagated alongside a
//! request. Two tables exist for a given logical call:
//!
//! - **request scope** — fresh per request, discarded when the pipeline
//!   finishes; owned exclusively by the handling thread.
//! - **thread scope** — keyed by an explicit [`ThreadToken`] and persisting
//!   across sequential requests handled on that token. Mutations made by
//!   interceptors or by business logic mid-pipeline are visible to later
//!   interception points of the same call and to the next call on the token.
//!
//! Thread scope is deliberately not a thread-local: tokens are handed out by
//! the connection router's worker pool (or allocated explicitly by client
//! threads), which keeps the scoping testable and free of ambient state.
//! Reading an unset slot yields `None`, never an error; only an id that was
//! never allocated is a configuration error.

use crate::error::{OrbError, OrbResult};
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Identifier of an allocated slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value stored in a slot. The type is deliberately unspecified; callers
/// downcast on read.
pub type SlotValue = Arc<dyn Any + Send + Sync>;

/// Convenience constructor for a [`SlotValue`].
pub fn slot_value<T: Any + Send + Sync>(value: T) -> SlotValue {
    Arc::new(value)
}

/// Explicit key for a logical thread of control.
///
/// Worker threads of the connection router each own one token for their
/// lifetime; client threads allocate one from the [`CurrentManager`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadToken(u64);

impl ThreadToken {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Fixed-size nullable slot storage, O(1) access by pre-allocated id.
#[derive(Clone, Default)]
pub struct SlotTable {
    slots: Vec<Option<SlotValue>>,
}

impl SlotTable {
    /// Table sized for `slot_count` allocated ids, all slots unset.
    pub fn sized(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn check(&self, id: SlotId) -> OrbResult<usize> {
        if id.index() >= self.slots.len() {
            return Err(OrbError::InvalidSlot(id));
        }
        Ok(id.index())
    }

    /// The value in `id`, or `None` if the slot is unset.
    pub fn get_slot(&self, id: SlotId) -> OrbResult<Option<SlotValue>> {
        let idx = self.check(id)?;
        Ok(self.slots[idx].clone())
    }

    /// Store `value` in `id`; `None` clears the slot.
    pub fn set_slot(&mut self, id: SlotId, value: Option<SlotValue>) -> OrbResult<()> {
        let idx = self.check(id)?;
        self.slots[idx] = value;
        Ok(())
    }

    /// Overwrite every slot from `other` (a snapshot copy; values are shared).
    pub fn set_from(&mut self, other: &SlotTable) {
        if self.slots.len() != other.slots.len() {
            self.slots = vec![None; other.slots.len()];
        }
        for (dst, src) in self.slots.iter_mut().zip(other.slots.iter()) {
            dst.clone_from(src);
        }
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.slots.iter().filter(|s| s.is_some()).count();
        write!(f, "SlotTable({} slots, {} set)", self.slots.len(), set)
    }
}

/// Which of the two tables a slot access targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotScope {
    /// Fresh per request, invisible outside the current request
    Request,
    /// Persists across requests on the same logical thread of control
    Thread,
}

/// Owns the thread-scope tables and hands out thread tokens.
///
/// The slot count is installed once when the ORB seals its registry; tables
/// created afterwards are sized to it.
pub struct CurrentManager {
    slot_count: AtomicUsize,
    next_token: AtomicU64,
    thread_scopes: DashMap<ThreadToken, SlotTable>,
}

impl CurrentManager {
    pub(crate) fn new() -> Self {
        Self {
            slot_count: AtomicUsize::new(0),
            next_token: AtomicU64::new(0),
            thread_scopes: DashMap::new(),
        }
    }

    pub(crate) fn install_slot_count(&self, count: usize) {
        self.slot_count.store(count, Ordering::Release);
    }

    /// Number of allocated slot ids.
    pub fn slot_count(&self) -> usize {
        self.slot_count.load(Ordering::Acquire)
    }

    /// A fresh, unique key for a logical thread of control.
    pub fn allocate_token(&self) -> ThreadToken {
        ThreadToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// An empty request-scope table sized to the allocated slot count.
    pub fn fresh_table(&self) -> SlotTable {
        SlotTable::sized(self.slot_count())
    }

    /// Snapshot of the thread-scope table for `token` (empty if never used).
    pub fn snapshot_thread_scope(&self, token: ThreadToken) -> SlotTable {
        match self.thread_scopes.get(&token) {
            Some(table) => table.clone(),
            None => self.fresh_table(),
        }
    }

    /// Read a thread-scope slot.
    pub fn get_thread_slot(&self, token: ThreadToken, id: SlotId) -> OrbResult<Option<SlotValue>> {
        match self.thread_scopes.get(&token) {
            Some(table) => table.get_slot(id),
            None => {
                // Never written on this token: valid ids read as unset.
                if id.index() >= self.slot_count() {
                    return Err(OrbError::InvalidSlot(id));
                }
                Ok(None)
            }
        }
    }

    /// Write a thread-scope slot; `None` clears it.
    pub fn set_thread_slot(
        &self,
        token: ThreadToken,
        id: SlotId,
        value: Option<SlotValue>,
    ) -> OrbResult<()> {
        let mut entry = self
            .thread_scopes
            .entry(token)
            .or_insert_with(|| self.fresh_table());
        entry.value_mut().set_slot(id, value)
    }

    /// Drop all thread-scope data for `token`.
    pub fn clear_thread_scope(&self, token: ThreadToken) {
        self.thread_scopes.remove(&token);
    }
}

impl fmt::Debug for CurrentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentManager")
            .field("slot_count", &self.slot_count())
            .field("thread_scopes", &self.thread_scopes.len())
            .finish()
    }
}

/// Slot view handed to business logic executing between the inbound and
/// reply interception points. Gives access to both scopes of the active
/// request without any ambient state.
pub struct Current<'a> {
    request_scope: &'a mut SlotTable,
    manager: &'a CurrentManager,
    token: ThreadToken,
}

impl<'a> Current<'a> {
    pub(crate) fn new(
        request_scope: &'a mut SlotTable,
        manager: &'a CurrentManager,
        token: ThreadToken,
    ) -> Self {
        Self {
            request_scope,
            manager,
            token,
        }
    }

    /// The handling thread's token.
    pub fn token(&self) -> ThreadToken {
        self.token
    }

    pub fn get_slot(&self, scope: SlotScope, id: SlotId) -> OrbResult<Option<SlotValue>> {
        match scope {
            SlotScope::Request => self.request_scope.get_slot(id),
            SlotScope::Thread => self.manager.get_thread_slot(self.token, id),
        }
    }

    pub fn set_slot(&mut self, scope: SlotScope, id: SlotId, value: Option<SlotValue>) -> OrbResult<()> {
        match scope {
            SlotScope::Request => self.request_scope.set_slot(id, value),
            SlotScope::Thread => self.manager.set_thread_slot(self.token, id, value),
        }
    }
}
