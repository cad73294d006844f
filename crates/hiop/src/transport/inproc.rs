// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport: paired channels with a pump thread per direction.
//!
//! Gives tests and demos real asynchrony (frames are delivered on a thread
//! that is not the sender's) without touching sockets. One
//! [`InProcNetwork`] models one network; ORBs sharing the `Arc` can reach
//! each other's listen endpoints.

use crate::error::{OrbError, OrbResult};
use crate::reference::Endpoint;
use crate::transport::{ChannelAcceptor, FrameSink, Transport, WireChannel, WireFrame};
use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// First port handed out for `listen` on port 0.
const EPHEMERAL_PORT_BASE: u16 = 40000;

/// An in-process "network" of listening endpoints.
pub struct InProcNetwork {
    listeners: DashMap<Endpoint, Arc<dyn ChannelAcceptor>>,
    next_port: AtomicU16,
    next_peer: AtomicU64,
}

impl InProcNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: DashMap::new(),
            next_port: AtomicU16::new(EPHEMERAL_PORT_BASE),
            next_peer: AtomicU64::new(0),
        })
    }
}

/// Sending half of one direction of an in-process connection.
struct InProcChannel {
    tx: Mutex<Option<Sender<WireFrame>>>,
}

impl InProcChannel {
    fn new(tx: Sender<WireFrame>) -> Arc<Self> {
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        })
    }
}

impl WireChannel for InProcChannel {
    fn send(&self, frame: WireFrame) -> OrbResult<()> {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| OrbError::ConnectionClosed),
            None => Err(OrbError::ConnectionClosed),
        }
    }

    fn close(&self) {
        // Dropping the sender disconnects the peer's pump thread.
        self.tx.lock().take();
    }
}

/// Deliver frames to `sink` until the sending side hangs up.
fn spawn_pump(name: String, rx: Receiver<WireFrame>, sink: Arc<dyn FrameSink>) {
    let spawned = thread::Builder::new().name(name).spawn(move || {
        for frame in rx.iter() {
            sink.on_frame(frame);
        }
        sink.on_closed();
    });
    if let Err(e) = spawned {
        log::error!("failed to spawn inproc pump thread: {}", e);
    }
}

impl Transport for InProcNetwork {
    fn connect(
        &self,
        endpoint: &Endpoint,
        sink: Arc<dyn FrameSink>,
    ) -> OrbResult<Arc<dyn WireChannel>> {
        let acceptor = self
            .listeners
            .get(endpoint)
            .map(|a| Arc::clone(a.value()))
            .ok_or_else(|| OrbError::Transport(format!("no listener at {}", endpoint)))?;

        // One channel pair per direction.
        let (to_server_tx, to_server_rx) = unbounded();
        let (to_client_tx, to_client_rx) = unbounded();

        let peer_id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let peer = Endpoint::new(format!("inproc-peer-{}", peer_id), 0);

        let server_channel = InProcChannel::new(to_client_tx);
        let server_sink = acceptor.accept(peer.clone(), server_channel);

        spawn_pump(
            format!("hiop-inproc-srv-{}", peer_id),
            to_server_rx,
            server_sink,
        );
        spawn_pump(format!("hiop-inproc-cli-{}", peer_id), to_client_rx, sink);

        log::trace!("inproc connect to {} as {}", endpoint, peer);
        Ok(InProcChannel::new(to_server_tx))
    }

    fn listen(
        &self,
        endpoint: &Endpoint,
        acceptor: Arc<dyn ChannelAcceptor>,
    ) -> OrbResult<Endpoint> {
        let bound = if endpoint.port == 0 {
            Endpoint::new(
                endpoint.host.clone(),
                self.next_port.fetch_add(1, Ordering::Relaxed),
            )
        } else {
            endpoint.clone()
        };
        if self.listeners.contains_key(&bound) {
            return Err(OrbError::Transport(format!(
                "endpoint {} already has a listener",
                bound
            )));
        }
        self.listeners.insert(bound.clone(), acceptor);
        log::trace!("inproc listening on {}", bound);
        Ok(bound)
    }
}
