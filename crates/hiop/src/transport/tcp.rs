// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport: length-prefixed frames over a blocking stream.
//!
//! One reader thread per connection, one acceptor thread per listener.
//! Frames are encoded by [`crate::transport::frame`] and framed on the
//! stream with a `u32` little-endian length prefix.

use crate::error::{OrbError, OrbResult};
use crate::reference::Endpoint;
use crate::transport::frame::{decode_frame, encode_frame};
use crate::transport::{ChannelAcceptor, FrameSink, Transport, WireChannel, WireFrame};
use parking_lot::Mutex;
use socket2::{SockRef, TcpKeepalive};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Upper bound on a single frame; larger lengths indicate stream desync.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// TCP socket options.
#[derive(Clone, Debug)]
pub struct TcpConfig {
    pub nodelay: bool,

    /// TCP keepalive probe interval; `None` leaves keepalive off
    pub keepalive: Option<Duration>,

    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// TCP implementation of the transport seam.
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Arc<Self> {
        Self::with_config(TcpConfig::default())
    }

    pub fn with_config(config: TcpConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }

    fn apply_options(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.config.nodelay)?;
        if let Some(interval) = self.config.keepalive {
            let keepalive = TcpKeepalive::new().with_time(interval);
            SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
        }
        Ok(())
    }
}

fn resolve(endpoint: &Endpoint) -> OrbResult<SocketAddr> {
    (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|e| OrbError::Transport(format!("resolve {}: {}", endpoint, e)))?
        .next()
        .ok_or_else(|| OrbError::Transport(format!("no address for {}", endpoint)))
}

/// Writer half of a TCP connection.
struct TcpChannel {
    stream: Mutex<Option<TcpStream>>,
}

impl TcpChannel {
    fn new(stream: TcpStream) -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(Some(stream)),
        })
    }
}

impl WireChannel for TcpChannel {
    fn send(&self, frame: WireFrame) -> OrbResult<()> {
        let encoded = encode_frame(&frame);
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(OrbError::ConnectionClosed)?;
        let result = stream
            .write_all(&(encoded.len() as u32).to_le_bytes())
            .and_then(|()| stream.write_all(&encoded));
        if let Err(e) = result {
            // Writer failure is terminal for the channel.
            if let Some(s) = guard.take() {
                let _ = s.shutdown(Shutdown::Both);
            }
            return Err(OrbError::Transport(format!("send failed: {}", e)));
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(s) = self.stream.lock().take() {
            let _ = s.shutdown(Shutdown::Both);
        }
    }
}

/// Read frames off `stream` and deliver them to `sink` until EOF or error.
fn reader_loop(mut stream: TcpStream, sink: &Arc<dyn FrameSink>) {
    let mut len_buf = [0u8; 4];
    loop {
        if let Err(e) = stream.read_exact(&mut len_buf) {
            log::debug!("tcp reader finished: {}", e);
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            log::warn!("tcp frame length {} exceeds limit, closing", len);
            break;
        }
        let mut buf = vec![0u8; len];
        if let Err(e) = stream.read_exact(&mut buf) {
            log::debug!("tcp reader finished mid-frame: {}", e);
            break;
        }
        match decode_frame(&buf) {
            Ok(frame) => sink.on_frame(frame),
            Err(e) => {
                // Undecodable frame means the stream is desynchronized.
                log::warn!("undecodable tcp frame, closing: {}", e);
                break;
            }
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
    sink.on_closed();
}

fn spawn_reader(name: String, stream: TcpStream, sink: Arc<dyn FrameSink>) {
    let reader_sink = sink.clone();
    let spawned = thread::Builder::new()
        .name(name)
        .spawn(move || reader_loop(stream, &reader_sink));
    if let Err(e) = spawned {
        log::error!("failed to spawn tcp reader thread: {}", e);
        sink.on_closed();
    }
}

impl Transport for TcpTransport {
    fn connect(
        &self,
        endpoint: &Endpoint,
        sink: Arc<dyn FrameSink>,
    ) -> OrbResult<Arc<dyn WireChannel>> {
        let addr = resolve(endpoint)?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|e| OrbError::Transport(format!("connect {}: {}", endpoint, e)))?;
        self.apply_options(&stream)?;

        let reader = stream.try_clone()?;
        spawn_reader(format!("hiop-tcp-rx-{}", endpoint), reader, sink);
        log::debug!("tcp connected to {}", endpoint);
        Ok(TcpChannel::new(stream))
    }

    fn listen(
        &self,
        endpoint: &Endpoint,
        acceptor: Arc<dyn ChannelAcceptor>,
    ) -> OrbResult<Endpoint> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
            .map_err(|e| OrbError::Transport(format!("bind {}: {}", endpoint, e)))?;
        let bound = Endpoint::new(endpoint.host.clone(), listener.local_addr()?.port());
        log::debug!("tcp listening on {}", bound);

        let config = self.config.clone();
        let accept_name = format!("hiop-tcp-accept-{}", bound);
        let spawned = thread::Builder::new().name(accept_name).spawn(move || {
            for incoming in listener.incoming() {
                let stream = match incoming {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("tcp accept failed: {}", e);
                        continue;
                    }
                };
                let peer = match stream.peer_addr() {
                    Ok(addr) => Endpoint::new(addr.ip().to_string(), addr.port()),
                    Err(_) => Endpoint::new("unknown", 0),
                };
                let _ = stream.set_nodelay(config.nodelay);
                if let Some(interval) = config.keepalive {
                    let keepalive = TcpKeepalive::new().with_time(interval);
                    let _ = SockRef::from(&stream).set_tcp_keepalive(&keepalive);
                }
                let reader = match stream.try_clone() {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("tcp clone failed for {}: {}", peer, e);
                        continue;
                    }
                };
                let sink = acceptor.accept(peer.clone(), TcpChannel::new(stream));
                spawn_reader(format!("hiop-tcp-rx-{}", peer), reader, sink);
            }
        });
        spawned.map_err(|e| OrbError::Transport(format!("spawn acceptor: {}", e)))?;
        Ok(bound)
    }
}
