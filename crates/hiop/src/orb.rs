// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ORB: bootstrap, servant registry, and the two ends of a call.
//!
//! [`OrbBuilder`] collects interceptors and configuration, then `build`
//! seals the registry, sizes the slot tables and wires the connection
//! router to the ORB. After that point the interceptor lists and slot
//! layout are immutable for the ORB's lifetime.
//!
//! [`Orb::invoke`] drives the client-side pipeline for one blocking call;
//! inbound requests from the router drive the server-side pipeline on a
//! worker thread and end in a [`Servant`] invocation.

use crate::current::{Current, CurrentManager, SlotId, ThreadToken};
use crate::error::{OrbError, OrbResult};
use crate::interception::flow::{ClientFlow, ServerFlow};
use crate::interception::{
    ClientRequestInfo, ClientRequestInterceptor, InterceptorRegistry, ServerRequestInfo,
    ServerRequestInterceptor,
};
use crate::reference::{Endpoint, ObjectRef};
use crate::router::bidir::{BiDirClientInterceptor, BiDirServerInterceptor};
use crate::router::{Connection, ConnectionRouter, RequestReceiver, RouterConfig};
use crate::transport::tcp::TcpTransport;
use crate::transport::{ReplyBody, ReplyMessage, RequestMessage, Transport};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Application object invoked at the end of the server-side pipeline.
pub trait Servant: Send + Sync {
    /// Execute `operation` with the opaque `args` payload.
    ///
    /// `current` exposes the request's slot scopes; thread-scope writes
    /// survive into later requests handled on the same worker.
    fn invoke(
        &self,
        operation: &str,
        args: &[u8],
        current: &mut Current<'_>,
    ) -> OrbResult<ServantReply>;
}

/// Outcome of a servant invocation.
pub enum ServantReply {
    /// Normal return payload
    Normal(Vec<u8>),

    /// Redirect the caller to another reference
    Forward(ObjectRef),
}

/// Outcome of [`Orb::invoke`] when the call does not raise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvokeReply {
    /// Normal return payload
    Reply(Vec<u8>),

    /// The target redirected the call; the caller decides whether to retry
    /// against the new reference
    Other(ObjectRef),
}

/// ORB-level configuration, applied at build time.
#[derive(Clone, Debug)]
pub struct OrbConfig {
    pub request_timeout: Duration,
    pub multiplex_limit: usize,
    pub callback_workers: usize,

    /// Register the built-in bidirectional interceptors. With this off the
    /// ORB neither offers nor accepts reverse dispatch.
    pub bidirectional: bool,
}

impl Default for OrbConfig {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            request_timeout: router.request_timeout,
            multiplex_limit: router.multiplex_limit,
            callback_workers: router.callback_workers,
            bidirectional: true,
        }
    }
}

/// Collects configuration and interceptors, then builds the [`Orb`].
pub struct OrbBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: OrbConfig,
    registry: Arc<InterceptorRegistry>,
    client: Vec<Arc<dyn ClientRequestInterceptor>>,
    server: Vec<Arc<dyn ServerRequestInterceptor>>,
    advertised: Vec<Endpoint>,
}

impl Default for OrbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: OrbConfig::default(),
            registry: Arc::new(InterceptorRegistry::new()),
            client: Vec::new(),
            server: Vec::new(),
            advertised: Vec::new(),
        }
    }

    /// Use `transport` instead of the default TCP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn multiplex_limit(mut self, limit: usize) -> Self {
        self.config.multiplex_limit = limit;
        self
    }

    pub fn callback_workers(mut self, workers: usize) -> Self {
        self.config.callback_workers = workers;
        self
    }

    pub fn bidirectional(mut self, enabled: bool) -> Self {
        self.config.bidirectional = enabled;
        self
    }

    /// Advertise `endpoint` as a listen point in the bidirectional offer,
    /// without requiring an actual listener on it. Endpoints bound through
    /// [`Orb::listen`] are advertised automatically.
    pub fn advertise_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.advertised.push(endpoint);
        self
    }

    /// Append a client-side interceptor; registration order is invocation
    /// order. Built-in interceptors run ahead of all user ones.
    pub fn add_client_interceptor(mut self, interceptor: Arc<dyn ClientRequestInterceptor>) -> Self {
        self.client.push(interceptor);
        self
    }

    /// Append a server-side interceptor; same ordering rules as the client
    /// side.
    pub fn add_server_interceptor(mut self, interceptor: Arc<dyn ServerRequestInterceptor>) -> Self {
        self.server.push(interceptor);
        self
    }

    /// Allocate a slot id for interceptors built before the ORB exists.
    pub fn allocate_slot_id(&self) -> OrbResult<SlotId> {
        self.registry.allocate_slot_id()
    }

    /// Seal the registry and assemble the ORB.
    pub fn build(self) -> OrbResult<Arc<Orb>> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => TcpTransport::new(),
        };
        let current = Arc::new(CurrentManager::new());
        let router_config = RouterConfig {
            multiplex_limit: self.config.multiplex_limit,
            request_timeout: self.config.request_timeout,
            callback_workers: self.config.callback_workers,
        };
        let router = ConnectionRouter::new(transport, router_config, &current);
        let own_listen = Arc::new(RwLock::new(self.advertised));

        let registry = self.registry;
        if self.config.bidirectional {
            registry.add_client_interceptor(Arc::new(BiDirClientInterceptor::new(
                own_listen.clone(),
            )))?;
            registry.add_server_interceptor(Arc::new(BiDirServerInterceptor::new(
                Arc::downgrade(&router),
            )))?;
        }
        for interceptor in self.client {
            registry.add_client_interceptor(interceptor)?;
        }
        for interceptor in self.server {
            registry.add_server_interceptor(interceptor)?;
        }
        registry.complete_registration();
        current.install_slot_count(registry.slot_count());

        let orb = Arc::new(Orb {
            registry,
            current,
            router,
            servants: DashMap::new(),
            own_listen,
            config: self.config,
        });
        let receiver: Weak<Orb> = Arc::downgrade(&orb);
        orb.router.set_receiver(receiver);
        Ok(orb)
    }
}

/// A built ORB instance.
pub struct Orb {
    registry: Arc<InterceptorRegistry>,
    current: Arc<CurrentManager>,
    router: Arc<ConnectionRouter>,
    servants: DashMap<String, Arc<dyn Servant>>,
    own_listen: Arc<RwLock<Vec<Endpoint>>>,
    config: OrbConfig,
}

impl Orb {
    pub fn builder() -> OrbBuilder {
        OrbBuilder::new()
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// The slot-table manager; client threads allocate their tokens here.
    pub fn current(&self) -> &Arc<CurrentManager> {
        &self.current
    }

    /// Convenience for [`CurrentManager::allocate_token`].
    pub fn allocate_token(&self) -> ThreadToken {
        self.current.allocate_token()
    }

    /// Start listening; the bound endpoint joins the advertised listen
    /// points for bidirectional offers.
    pub fn listen(&self, endpoint: &Endpoint) -> OrbResult<Endpoint> {
        let bound = self.router.listen(endpoint)?;
        self.own_listen.write().push(bound.clone());
        Ok(bound)
    }

    /// Endpoints currently advertised in bidirectional offers.
    pub fn listen_endpoints(&self) -> Vec<Endpoint> {
        self.own_listen.read().clone()
    }

    /// Expose `servant` under `key`. A later registration under the same
    /// key replaces the earlier one.
    pub fn register_servant(&self, key: impl Into<String>, servant: Arc<dyn Servant>) {
        let key = key.into();
        log::debug!("registered servant '{}'", key);
        self.servants.insert(key, servant);
    }

    pub fn unregister_servant(&self, key: &str) {
        self.servants.remove(key);
    }

    /// A reference to a servant on this ORB's first listen endpoint.
    pub fn object_ref(&self, key: impl Into<String>) -> OrbResult<ObjectRef> {
        let endpoint = self
            .own_listen
            .read()
            .first()
            .cloned()
            .ok_or_else(|| OrbError::BadParam("orb has no listen endpoint".into()))?;
        Ok(ObjectRef::new(endpoint, key))
    }

    /// Issue one blocking call to `target`.
    ///
    /// `caller` keys the thread scope snapshotted into the request scope
    /// visible to client-side interceptors. Every terminal path runs
    /// exactly one reply-side interception point.
    pub fn invoke(
        &self,
        caller: ThreadToken,
        target: &ObjectRef,
        operation: &str,
        args: &[u8],
    ) -> OrbResult<InvokeReply> {
        let interceptors = self.registry.client_interceptors();
        let flow = ClientFlow::new(&interceptors);
        let request_scope = self.current.snapshot_thread_scope(caller);

        let conn = match self.router.get_or_open(&target.endpoint) {
            Ok(conn) => conn,
            Err(e) => {
                let mut info =
                    ClientRequestInfo::new(operation.into(), 0, target.clone(), request_scope, None);
                return Err(flow.receive_exception(&mut info, e));
            }
        };

        let request_id = conn.next_request_id();
        let mut info = ClientRequestInfo::new(
            operation.into(),
            request_id,
            target.clone(),
            request_scope,
            Some(conn.clone()),
        );

        if let Err(e) = flow.send_request(&mut info) {
            // Request never hits the wire.
            return Err(flow.receive_exception(&mut info, e));
        }

        let request = RequestMessage {
            request_id,
            object_key: target.object_key.clone(),
            operation: operation.into(),
            payload: args.to_vec(),
            service_contexts: info.take_request_contexts(),
        };

        log::trace!("invoke '{}' on {} (request {})", operation, target, request_id);
        match conn.dispatch(request, self.config.request_timeout) {
            Ok(reply) => {
                info.set_reply_contexts(reply.service_contexts);
                match reply.body {
                    ReplyBody::Normal(payload) => match flow.receive_reply(&mut info) {
                        None => Ok(InvokeReply::Reply(payload)),
                        Some(e) => Err(e),
                    },
                    ReplyBody::Exception(err) => Err(flow.receive_exception(&mut info, err)),
                    ReplyBody::Other(objref) => {
                        info.set_forward(objref.clone());
                        match flow.receive_other(&mut info) {
                            None => Ok(InvokeReply::Other(objref)),
                            Some(e) => Err(e),
                        }
                    }
                }
            }
            Err(e) => Err(flow.receive_exception(&mut info, e)),
        }
    }

    /// Close all connections; blocked callers observe a disconnect.
    pub fn shutdown(&self) {
        self.router.shutdown();
    }

    fn dispatch_server(&self, conn: &Arc<Connection>, request: RequestMessage, token: ThreadToken) {
        let interceptors = self.registry.server_interceptors();
        let flow = ServerFlow::new(&interceptors);
        let request_id = request.request_id;
        let mut info = ServerRequestInfo::new(
            request.operation.clone(),
            request_id,
            request.service_contexts.clone(),
            Some(conn.clone()),
            self.current.clone(),
            token,
        );

        let inbound = flow
            .receive_request_service_contexts(&mut info)
            .and_then(|()| flow.receive_request(&mut info));

        let body = match inbound {
            Err(e) => ReplyBody::Exception(flow.send_exception(&mut info, e)),
            Ok(()) => match self.invoke_servant(&request, &mut info) {
                Ok(ServantReply::Normal(payload)) => match flow.send_reply(&mut info) {
                    None => ReplyBody::Normal(payload),
                    Some(e) => ReplyBody::Exception(e),
                },
                Ok(ServantReply::Forward(objref)) => {
                    info.set_forward(objref.clone());
                    match flow.send_other(&mut info) {
                        None => ReplyBody::Other(objref),
                        Some(e) => ReplyBody::Exception(e),
                    }
                }
                Err(e) => ReplyBody::Exception(flow.send_exception(&mut info, e)),
            },
        };

        let reply = ReplyMessage {
            request_id,
            service_contexts: info.take_reply_contexts(),
            body,
        };
        if let Err(e) = conn.send_reply(reply) {
            log::warn!(
                "failed to send reply {} to {}: {}",
                request_id,
                conn.remote(),
                e
            );
        }
    }

    fn invoke_servant(
        &self,
        request: &RequestMessage,
        info: &mut ServerRequestInfo,
    ) -> OrbResult<ServantReply> {
        let servant = self
            .servants
            .get(&request.object_key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrbError::NoSuchObject(request.object_key.clone()))?;
        let token = info.token();
        let manager = info.manager().clone();
        let mut current = Current::new(info.request_scope_mut(), &manager, token);
        servant.invoke(&request.operation, &request.payload, &mut current)
    }
}

impl RequestReceiver for Orb {
    fn handle_request(&self, conn: Arc<Connection>, request: RequestMessage, token: ThreadToken) {
        self.dispatch_server(&conn, request, token);
    }
}

impl Drop for Orb {
    fn drop(&mut self) {
        self.shutdown();
    }
}
