// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One live connection: request correlation, multiplex limiting, lifecycle.
//!
//! A connection wraps a [`WireChannel`] with a pending-reply map keyed by
//! request id. Outbound calls block the issuing thread on a one-shot channel
//! until the correlated reply arrives or the deadline passes. A bounded
//! number of calls may be in flight at once; issuers beyond the limit wait
//! on a condvar until a permit frees up.

use crate::error::{OrbError, OrbResult};
use crate::reference::Endpoint;
use crate::transport::{ReplyMessage, RequestMessage, WireChannel, WireFrame};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Who opened the connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionDirection {
    /// We dialled the peer.
    ClientInitiated,
    /// The peer dialled us.
    ServerAccepted,
}

/// A live connection to one peer.
pub struct Connection {
    remote: Endpoint,
    direction: ConnectionDirection,
    channel: Arc<dyn WireChannel>,
    /// Set once the bidirectional context has been negotiated. Requests may
    /// then flow against the connection's original direction.
    bidirectional: AtomicBool,
    closed: AtomicBool,
    next_request_id: AtomicU64,
    pending: DashMap<u64, Sender<ReplyMessage>>,
    inflight: Mutex<usize>,
    inflight_freed: Condvar,
    multiplex_limit: usize,
}

/// Releases one in-flight permit on drop.
struct InflightPermit<'a> {
    conn: &'a Connection,
}

impl Drop for InflightPermit<'_> {
    fn drop(&mut self) {
        let mut count = self.conn.inflight.lock();
        *count -= 1;
        self.conn.inflight_freed.notify_one();
    }
}

impl Connection {
    pub(crate) fn new(
        remote: Endpoint,
        direction: ConnectionDirection,
        channel: Arc<dyn WireChannel>,
        multiplex_limit: usize,
    ) -> Self {
        Self {
            remote,
            direction,
            channel,
            bidirectional: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_request_id: AtomicU64::new(1),
            pending: DashMap::new(),
            inflight: Mutex::new(0),
            inflight_freed: Condvar::new(),
            multiplex_limit: multiplex_limit.max(1),
        }
    }

    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    /// May this connection carry requests against its original direction?
    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional.load(Ordering::Acquire)
    }

    pub(crate) fn mark_bidirectional(&self) {
        if !self.bidirectional.swap(true, Ordering::AcqRel) {
            log::debug!("connection to {} marked bidirectional", self.remote);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Next outbound correlation id, unique within this connection.
    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `request` and block until the correlated reply arrives.
    ///
    /// Waits for an in-flight permit first when the multiplex limit is
    /// reached; both that wait and the reply wait are budgeted against one
    /// deadline, so a call never blocks longer than `timeout` overall. A
    /// deadline miss removes the waiter and surfaces as
    /// [`OrbError::Timeout`]; a connection loss surfaces as
    /// [`OrbError::ConnectionClosed`].
    pub(crate) fn dispatch(
        &self,
        request: RequestMessage,
        timeout: Duration,
    ) -> OrbResult<ReplyMessage> {
        if self.is_closed() {
            return Err(OrbError::ConnectionClosed);
        }
        let deadline = Instant::now() + timeout;
        let _permit = self.acquire_permit(deadline)?;

        let request_id = request.request_id;
        let (tx, rx): (Sender<ReplyMessage>, Receiver<ReplyMessage>) = bounded(1);
        self.pending.insert(request_id, tx);

        if let Err(e) = self.channel.send(WireFrame::Request(request)) {
            self.pending.remove(&request_id);
            return Err(e);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.remove(&request_id);
                log::warn!(
                    "request {} to {} timed out after {:?}",
                    request_id,
                    self.remote,
                    timeout
                );
                Err(OrbError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.pending.remove(&request_id);
                Err(OrbError::ConnectionClosed)
            }
        }
    }

    fn acquire_permit(&self, deadline: Instant) -> OrbResult<InflightPermit<'_>> {
        let mut count = self.inflight.lock();
        while *count >= self.multiplex_limit {
            if self
                .inflight_freed
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return Err(OrbError::Timeout);
            }
            if self.is_closed() {
                return Err(OrbError::ConnectionClosed);
            }
        }
        *count += 1;
        Ok(InflightPermit { conn: self })
    }

    /// Route an inbound reply to its waiter. A reply with no waiter (late
    /// arrival after a timeout) is dropped.
    pub(crate) fn complete(&self, reply: ReplyMessage) {
        match self.pending.remove(&reply.request_id) {
            Some((_, tx)) => {
                // Waiter may have timed out between remove and send.
                let _ = tx.send(reply);
            }
            None => {
                log::debug!(
                    "dropping uncorrelated reply {} from {}",
                    reply.request_id,
                    self.remote
                );
            }
        }
    }

    /// Send a reply for a request the peer issued on this connection.
    pub(crate) fn send_reply(&self, reply: ReplyMessage) -> OrbResult<()> {
        self.channel.send(WireFrame::Reply(reply))
    }

    /// Number of calls currently awaiting replies.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Tear the connection down: drop all reply waiters (they observe a
    /// disconnect) and wake any threads blocked on a permit.
    pub(crate) fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.channel.close();
        self.pending.clear();
        self.inflight_freed.notify_all();
        log::debug!("connection to {} shut down", self.remote);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("direction", &self.direction)
            .field("bidirectional", &self.is_bidirectional())
            .field("closed", &self.is_closed())
            .field("pending", &self.pending.len())
            .finish()
    }
}
