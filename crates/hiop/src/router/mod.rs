// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection routing: opening, reusing, and listening on connections, and
//! steering inbound frames to the right place.
//!
//! The router keeps one connection per remote endpoint and reuses it across
//! calls. Inbound replies are correlated back to their blocked issuer;
//! inbound requests are queued to a worker pool that drives the server-side
//! interception pipeline through the [`RequestReceiver`] installed at
//! bootstrap.
//!
//! Bidirectional dispatch is honoured on both sides: an endpoint registered
//! through [`ConnectionRouter::register_bidir`] routes outbound calls over
//! the peer-opened connection, and requests arriving on a connection we
//! dialled are accepted once that connection has been marked bidirectional.

pub mod bidir;
pub mod connection;

pub(crate) mod workers;

pub use bidir::{ListenPointsCodec, BIDIR_CONTEXT_TAG};
pub use connection::{Connection, ConnectionDirection};

use crate::current::{CurrentManager, ThreadToken};
use crate::error::{OrbError, OrbResult};
use crate::reference::Endpoint;
use crate::service_context::ServiceContextList;
use crate::transport::{
    ChannelAcceptor, FrameSink, ReplyBody, ReplyMessage, RequestMessage, Transport, WireChannel,
    WireFrame,
};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

/// Tunables for the router.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Maximum concurrent in-flight requests per connection.
    pub multiplex_limit: usize,

    /// Deadline for a blocking call, measured from send to reply.
    pub request_timeout: Duration,

    /// Worker threads dispatching inbound requests.
    pub callback_workers: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            multiplex_limit: 64,
            request_timeout: Duration::from_secs(10),
            callback_workers: 4,
        }
    }
}

/// Installed by the ORB at bootstrap; receives every inbound request after
/// connection-level screening.
pub(crate) trait RequestReceiver: Send + Sync {
    fn handle_request(&self, conn: Arc<Connection>, request: RequestMessage, token: ThreadToken);
}

/// Opens, caches and listens on connections.
pub struct ConnectionRouter {
    self_weak: Weak<ConnectionRouter>,
    transport: Arc<dyn Transport>,
    config: RouterConfig,
    /// Connections we dialled, by remote endpoint.
    outbound: Mutex<HashMap<Endpoint, Arc<Connection>>>,
    /// Peer-opened connections registered for reverse use, by advertised
    /// listen point.
    bidir: Mutex<HashMap<Endpoint, Arc<Connection>>>,
    /// Connections accepted on our listeners, kept for shutdown.
    accepted: Mutex<Vec<Arc<Connection>>>,
    workers: workers::WorkerPool,
    receiver: OnceLock<Weak<dyn RequestReceiver>>,
}

impl ConnectionRouter {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: RouterConfig,
        current: &Arc<CurrentManager>,
    ) -> Arc<Self> {
        let workers = workers::WorkerPool::new(config.callback_workers, current);
        Arc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            transport,
            config,
            outbound: Mutex::new(HashMap::new()),
            bidir: Mutex::new(HashMap::new()),
            accepted: Mutex::new(Vec::new()),
            workers,
            receiver: OnceLock::new(),
        })
    }

    pub(crate) fn set_receiver(&self, receiver: Weak<dyn RequestReceiver>) {
        let _ = self.receiver.set(receiver);
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The connection a call to `endpoint` should use.
    ///
    /// A live peer-opened connection registered for that endpoint always
    /// wins over dialling out; otherwise an existing outbound connection is
    /// reused, and only as a last resort a new one is opened.
    pub(crate) fn get_or_open(&self, endpoint: &Endpoint) -> OrbResult<Arc<Connection>> {
        if let Some(conn) = self.lookup_bidir(endpoint) {
            log::trace!("routing call to {} over peer-opened connection", endpoint);
            return Ok(conn);
        }
        if let Some(conn) = self.lookup_outbound(endpoint) {
            return Ok(conn);
        }

        // Dial without holding the table lock; a slow connect must not
        // stall calls routed over already-cached connections.
        let sink = Arc::new(RouterSink::new(self.self_weak.clone()));
        let channel = self.transport.connect(endpoint, sink.clone())?;
        let conn = Arc::new(Connection::new(
            endpoint.clone(),
            ConnectionDirection::ClientInitiated,
            channel,
            self.config.multiplex_limit,
        ));
        sink.attach(conn.clone());

        let mut outbound = self.outbound.lock();
        match outbound.get(endpoint) {
            // Lost a dial race; keep the first connection.
            Some(existing) if !existing.is_closed() => {
                let existing = existing.clone();
                drop(outbound);
                conn.shutdown();
                Ok(existing)
            }
            _ => {
                outbound.insert(endpoint.clone(), conn.clone());
                log::debug!("opened connection to {}", endpoint);
                Ok(conn)
            }
        }
    }

    fn lookup_outbound(&self, endpoint: &Endpoint) -> Option<Arc<Connection>> {
        let mut outbound = self.outbound.lock();
        match outbound.get(endpoint) {
            Some(conn) if !conn.is_closed() => Some(conn.clone()),
            Some(_) => {
                outbound.remove(endpoint);
                None
            }
            None => None,
        }
    }

    fn lookup_bidir(&self, endpoint: &Endpoint) -> Option<Arc<Connection>> {
        let mut bidir = self.bidir.lock();
        match bidir.get(endpoint) {
            Some(conn) if !conn.is_closed() => Some(conn.clone()),
            Some(_) => {
                bidir.remove(endpoint);
                None
            }
            None => None,
        }
    }

    /// Register a peer-opened connection as the route to `point`.
    ///
    /// An existing live registration is never silently replaced; the offer
    /// is logged and dropped. A dead registration is superseded.
    pub(crate) fn register_bidir(&self, point: Endpoint, conn: Arc<Connection>) {
        let mut bidir = self.bidir.lock();
        if let Some(existing) = bidir.get(&point) {
            if !existing.is_closed() {
                if !Arc::ptr_eq(existing, &conn) {
                    log::warn!(
                        "ignoring bidirectional offer for {}: live connection already registered",
                        point
                    );
                }
                return;
            }
        }
        log::debug!("registered bidirectional route to {}", point);
        bidir.insert(point, conn);
    }

    /// Start listening; returns the bound endpoint (port 0 picks a free one).
    pub(crate) fn listen(&self, endpoint: &Endpoint) -> OrbResult<Endpoint> {
        let acceptor = Arc::new(RouterAcceptor {
            router: self.self_weak.clone(),
        });
        let bound = self.transport.listen(endpoint, acceptor)?;
        log::debug!("listening on {}", bound);
        Ok(bound)
    }

    /// Route one inbound frame arriving on `conn`.
    fn accept_inbound(&self, conn: &Arc<Connection>, frame: WireFrame) {
        match frame {
            WireFrame::Reply(reply) => conn.complete(reply),
            WireFrame::Request(request) => self.accept_request(conn, request),
        }
    }

    fn accept_request(&self, conn: &Arc<Connection>, request: RequestMessage) {
        // Requests flowing against a dialled connection's direction are only
        // legal once bidirectional use was negotiated.
        if conn.direction() == ConnectionDirection::ClientInitiated && !conn.is_bidirectional() {
            log::warn!(
                "rejecting request '{}' on non-bidirectional connection to {}",
                request.operation,
                conn.remote()
            );
            let reply = ReplyMessage {
                request_id: request.request_id,
                service_contexts: ServiceContextList::new(),
                body: ReplyBody::Exception(OrbError::BadParam(
                    "connection not negotiated for bidirectional use".into(),
                )),
            };
            if let Err(e) = conn.send_reply(reply) {
                log::debug!("failed to send rejection to {}: {}", conn.remote(), e);
            }
            return;
        }

        let Some(receiver) = self.receiver.get().and_then(Weak::upgrade) else {
            log::warn!("dropping inbound request: no request receiver installed");
            return;
        };
        let conn = conn.clone();
        self.workers.submit(Box::new(move |token| {
            receiver.handle_request(conn, request, token);
        }));
    }

    fn forget(&self, conn: &Arc<Connection>) {
        self.outbound
            .lock()
            .retain(|_, c| !Arc::ptr_eq(c, conn));
        self.bidir.lock().retain(|_, c| !Arc::ptr_eq(c, conn));
        self.accepted.lock().retain(|c| !Arc::ptr_eq(c, conn));
    }

    /// Close every connection. Blocked callers observe a disconnect.
    pub(crate) fn shutdown(&self) {
        let outbound: Vec<_> = self.outbound.lock().drain().map(|(_, c)| c).collect();
        let bidir: Vec<_> = self.bidir.lock().drain().map(|(_, c)| c).collect();
        let accepted: Vec<_> = self.accepted.lock().drain(..).collect();
        for conn in outbound.iter().chain(bidir.iter()).chain(accepted.iter()) {
            conn.shutdown();
        }
    }
}

/// Frame sink for connections the router dialled.
///
/// The connection cannot exist before the transport hands the channel back,
/// so the sink starts unattached; a frame racing the attachment waits on
/// the condvar.
struct RouterSink {
    router: Weak<ConnectionRouter>,
    conn: Mutex<Option<Arc<Connection>>>,
    attached: Condvar,
}

impl RouterSink {
    fn new(router: Weak<ConnectionRouter>) -> Self {
        Self {
            router,
            conn: Mutex::new(None),
            attached: Condvar::new(),
        }
    }

    fn attach(&self, conn: Arc<Connection>) {
        let mut guard = self.conn.lock();
        *guard = Some(conn);
        self.attached.notify_all();
    }

    fn wait_attached(&self) -> Option<Arc<Connection>> {
        let mut guard = self.conn.lock();
        while guard.is_none() {
            if self
                .attached
                .wait_for(&mut guard, Duration::from_secs(5))
                .timed_out()
            {
                return None;
            }
        }
        guard.clone()
    }
}

impl FrameSink for RouterSink {
    fn on_frame(&self, frame: WireFrame) {
        let (Some(router), Some(conn)) = (self.router.upgrade(), self.wait_attached()) else {
            return;
        };
        router.accept_inbound(&conn, frame);
    }

    fn on_closed(&self) {
        let Some(conn) = self.wait_attached() else {
            return;
        };
        conn.shutdown();
        if let Some(router) = self.router.upgrade() {
            router.forget(&conn);
        }
    }
}

/// Acceptor for listeners the router opened.
struct RouterAcceptor {
    router: Weak<ConnectionRouter>,
}

impl ChannelAcceptor for RouterAcceptor {
    fn accept(&self, peer: Endpoint, channel: Arc<dyn WireChannel>) -> Arc<dyn FrameSink> {
        let sink = Arc::new(RouterSink::new(self.router.clone()));
        let Some(router) = self.router.upgrade() else {
            return sink;
        };
        let conn = Arc::new(Connection::new(
            peer.clone(),
            ConnectionDirection::ServerAccepted,
            channel,
            router.config.multiplex_limit,
        ));
        sink.attach(conn.clone());
        router.accepted.lock().push(conn);
        log::debug!("accepted connection from {}", peer);
        sink
    }
}
