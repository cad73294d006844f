// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-request info passed to every interception point.
//!
//! One info value exists per in-flight request. It owns the request-scope
//! slot table, references the handling thread's thread-scope table through
//! the [`CurrentManager`], and carries the service contexts and outcome
//! classification for the request. It is created when a request is received
//! or about to be sent and dropped when the pipeline finishes.

use crate::current::{CurrentManager, SlotId, SlotScope, SlotTable, SlotValue, ThreadToken};
use crate::error::{OrbError, OrbResult};
use crate::reference::{ObjectRef, TaggedComponent};
use crate::router::Connection;
use crate::service_context::{ServiceContext, ServiceContextList};
use std::sync::Arc;

/// Terminal classification of a request as seen by reply-path points.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// No reply point has run yet
    Pending,
    Successful,
    Exception,
    Other,
}

/// Info for one server-side request.
pub struct ServerRequestInfo {
    operation: String,
    request_id: u64,
    request_scope: SlotTable,
    manager: Arc<CurrentManager>,
    token: ThreadToken,
    request_contexts: ServiceContextList,
    reply_contexts: ServiceContextList,
    reply_status: ReplyStatus,
    exception: Option<OrbError>,
    forward: Option<ObjectRef>,
    connection: Option<Arc<Connection>>,
}

impl ServerRequestInfo {
    pub(crate) fn new(
        operation: String,
        request_id: u64,
        request_contexts: ServiceContextList,
        connection: Option<Arc<Connection>>,
        manager: Arc<CurrentManager>,
        token: ThreadToken,
    ) -> Self {
        let request_scope = manager.fresh_table();
        Self {
            operation,
            request_id,
            request_scope,
            manager,
            token,
            request_contexts,
            reply_contexts: ServiceContextList::new(),
            reply_status: ReplyStatus::Pending,
            exception: None,
            forward: None,
            connection,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The handling thread's token.
    pub fn token(&self) -> ThreadToken {
        self.token
    }

    /// The connection the request arrived on, if any.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Contexts that arrived with the request.
    pub fn request_contexts(&self) -> &ServiceContextList {
        &self.request_contexts
    }

    /// The inbound context for `tag`, or `None` if absent.
    pub fn get_request_service_context(&self, tag: u32) -> Option<&ServiceContext> {
        self.request_contexts.get(tag)
    }

    /// Attach a context to the outgoing reply.
    pub fn add_reply_service_context(
        &mut self,
        context: ServiceContext,
        replace: bool,
    ) -> OrbResult<()> {
        self.reply_contexts.add(context, replace)
    }

    pub fn reply_contexts(&self) -> &ServiceContextList {
        &self.reply_contexts
    }

    /// Read a slot from the chosen scope.
    pub fn get_slot(&self, scope: SlotScope, id: SlotId) -> OrbResult<Option<SlotValue>> {
        match scope {
            SlotScope::Request => self.request_scope.get_slot(id),
            SlotScope::Thread => self.manager.get_thread_slot(self.token, id),
        }
    }

    /// Write a slot in the chosen scope; `None` clears it. Thread-scope
    /// writes persist into the next request handled on this token.
    pub fn set_slot(
        &mut self,
        scope: SlotScope,
        id: SlotId,
        value: Option<SlotValue>,
    ) -> OrbResult<()> {
        match scope {
            SlotScope::Request => self.request_scope.set_slot(id, value),
            SlotScope::Thread => self.manager.set_thread_slot(self.token, id, value),
        }
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.reply_status
    }

    /// The exception that will be (or was) sent, when the outcome is an
    /// exception.
    pub fn sent_exception(&self) -> Option<&OrbError> {
        self.exception.as_ref()
    }

    /// The forward target, when the outcome is "other".
    pub fn forward_reference(&self) -> Option<&ObjectRef> {
        self.forward.as_ref()
    }

    pub(crate) fn set_reply_status(&mut self, status: ReplyStatus) {
        self.reply_status = status;
    }

    pub(crate) fn set_sent_exception(&mut self, err: OrbError) {
        self.exception = Some(err);
    }

    pub(crate) fn set_forward(&mut self, objref: ObjectRef) {
        self.forward = Some(objref);
    }

    pub(crate) fn take_reply_contexts(&mut self) -> ServiceContextList {
        std::mem::take(&mut self.reply_contexts)
    }

    pub(crate) fn request_scope_mut(&mut self) -> &mut SlotTable {
        &mut self.request_scope
    }

    pub(crate) fn manager(&self) -> &Arc<CurrentManager> {
        &self.manager
    }
}

/// Info for one client-side call.
pub struct ClientRequestInfo {
    operation: String,
    request_id: u64,
    target: ObjectRef,
    request_scope: SlotTable,
    request_contexts: ServiceContextList,
    reply_contexts: ServiceContextList,
    reply_status: ReplyStatus,
    exception: Option<OrbError>,
    forward: Option<ObjectRef>,
    connection: Option<Arc<Connection>>,
}

impl ClientRequestInfo {
    pub(crate) fn new(
        operation: String,
        request_id: u64,
        target: ObjectRef,
        request_scope: SlotTable,
        connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            operation,
            request_id,
            target,
            request_scope,
            request_contexts: ServiceContextList::new(),
            reply_contexts: ServiceContextList::new(),
            reply_status: ReplyStatus::Pending,
            exception: None,
            forward: None,
            connection,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The reference the call targets.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// Static per-reference metadata, read-only for interceptors.
    pub fn effective_components(&self) -> &[TaggedComponent] {
        self.target.components()
    }

    /// The component data for `tag`, or `None` if the reference carries none.
    pub fn get_effective_component(&self, tag: u32) -> Option<&[u8]> {
        self.target.component(tag)
    }

    /// The connection the request will travel over.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Attach a context to the outgoing request.
    pub fn add_request_service_context(
        &mut self,
        context: ServiceContext,
        replace: bool,
    ) -> OrbResult<()> {
        self.request_contexts.add(context, replace)
    }

    pub fn request_contexts(&self) -> &ServiceContextList {
        &self.request_contexts
    }

    /// Contexts that arrived with the reply (empty before a reply point).
    pub fn reply_contexts(&self) -> &ServiceContextList {
        &self.reply_contexts
    }

    /// Read a request-scope slot (a snapshot of the caller's thread scope).
    pub fn get_slot(&self, id: SlotId) -> OrbResult<Option<SlotValue>> {
        self.request_scope.get_slot(id)
    }

    /// Write a request-scope slot; invisible outside this call.
    pub fn set_slot(&mut self, id: SlotId, value: Option<SlotValue>) -> OrbResult<()> {
        self.request_scope.set_slot(id, value)
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.reply_status
    }

    /// The exception outcome observed so far, if any.
    pub fn received_exception(&self) -> Option<&OrbError> {
        self.exception.as_ref()
    }

    /// The forward target from an "other" reply, if any.
    pub fn forward_reference(&self) -> Option<&ObjectRef> {
        self.forward.as_ref()
    }

    pub(crate) fn set_reply_status(&mut self, status: ReplyStatus) {
        self.reply_status = status;
    }

    pub(crate) fn set_received_exception(&mut self, err: OrbError) {
        self.exception = Some(err);
    }

    pub(crate) fn set_forward(&mut self, objref: ObjectRef) {
        self.forward = Some(objref);
    }

    pub(crate) fn set_reply_contexts(&mut self, contexts: ServiceContextList) {
        self.reply_contexts = contexts;
    }

    pub(crate) fn take_request_contexts(&mut self) -> ServiceContextList {
        std::mem::take(&mut self.request_contexts)
    }
}
