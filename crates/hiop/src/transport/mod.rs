// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Opaque wire layer consumed by the connection router.
//!
//! The interception pipeline never touches sockets; it hands structured
//! frames to a [`WireChannel`] and receives inbound frames through a
//! [`FrameSink`]. Two implementations ship with the crate:
//!
//! - [`inproc::InProcNetwork`] — paired in-process channels with a pump
//!   thread per direction, used by tests and demos.
//! - [`tcp::TcpTransport`] — length-prefixed frames over TCP with one
//!   blocking reader thread per connection.
//!
//! Frame payloads (operation arguments, return values) stay opaque bytes;
//! only service contexts and the reply classification are structured.

pub mod frame;
pub mod inproc;
pub mod tcp;

use crate::error::{OrbError, OrbResult};
use crate::reference::{Endpoint, ObjectRef};
use crate::service_context::ServiceContextList;
use std::sync::Arc;

/// A request travelling over a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMessage {
    /// Correlation id, unique per connection and direction of issue
    pub request_id: u64,

    /// Key the target servant is registered under
    pub object_key: String,

    /// Operation name
    pub operation: String,

    /// Opaque argument payload
    pub payload: Vec<u8>,

    /// Contexts attached by client-side interceptors
    pub service_contexts: ServiceContextList,
}

/// Terminal classification of a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyBody {
    /// Normal return value
    Normal(Vec<u8>),

    /// Exception outcome (application or system)
    Exception(OrbError),

    /// Non-exception, non-normal outcome: a location-forward-style redirect
    Other(ObjectRef),
}

/// A reply correlated to an earlier request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyMessage {
    pub request_id: u64,

    /// Contexts attached by server-side reply interceptors
    pub service_contexts: ServiceContextList,

    pub body: ReplyBody,
}

/// One frame on the wire, either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireFrame {
    Request(RequestMessage),
    Reply(ReplyMessage),
}

/// Sending half of an established connection.
pub trait WireChannel: Send + Sync {
    fn send(&self, frame: WireFrame) -> OrbResult<()>;

    /// Close the channel; pending sends fail, the peer observes a close.
    fn close(&self);
}

/// Receives inbound frames and lifecycle events for one connection.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: WireFrame);

    /// The channel closed or failed; no further frames will arrive.
    fn on_closed(&self);
}

/// Accepts inbound connections on a listening endpoint.
pub trait ChannelAcceptor: Send + Sync {
    /// A peer connected. Returns the sink inbound frames are delivered to;
    /// the transport starts pumping only after this returns.
    fn accept(&self, peer: Endpoint, channel: Arc<dyn WireChannel>) -> Arc<dyn FrameSink>;
}

/// Connection factory: the seam between the router and the actual wire.
pub trait Transport: Send + Sync {
    /// Open a connection to `endpoint`; inbound frames go to `sink`.
    fn connect(&self, endpoint: &Endpoint, sink: Arc<dyn FrameSink>)
        -> OrbResult<Arc<dyn WireChannel>>;

    /// Listen on `endpoint` (port 0 picks a free port) and return the bound
    /// endpoint.
    fn listen(&self, endpoint: &Endpoint, acceptor: Arc<dyn ChannelAcceptor>)
        -> OrbResult<Endpoint>;
}
