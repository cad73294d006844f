// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bidirectional dispatch negotiation.
//!
//! A client that hosts callback servants attaches its listen points in a
//! service context on outbound requests. The server decodes the context and
//! registers the carrying connection under each advertised endpoint, so
//! later calls it makes toward those endpoints reuse the client-opened
//! connection instead of dialling back. Both halves are ordinary
//! interceptors registered by the ORB during bootstrap, ahead of any user
//! interceptor.

use crate::cdr::{CdrReader, CdrWriter};
use crate::error::OrbResult;
use crate::interception::{
    ClientRequestInfo, ClientRequestInterceptor, PointResult, ServerRequestInfo,
    ServerRequestInterceptor,
};
use crate::reference::Endpoint;
use crate::router::connection::ConnectionDirection;
use crate::router::ConnectionRouter;
use crate::service_context::ContextCodec;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Tag of the bidirectional listen-points service context.
pub const BIDIR_CONTEXT_TAG: u32 = 5;

/// Codec for the listen-point list carried under [`BIDIR_CONTEXT_TAG`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ListenPointsCodec;

impl ContextCodec for ListenPointsCodec {
    type Value = Vec<Endpoint>;

    fn encode(&self, points: &Vec<Endpoint>) -> OrbResult<Vec<u8>> {
        let mut w = CdrWriter::new();
        w.write_u32(points.len() as u32);
        for point in points {
            w.write_string(&point.host);
            w.write_u16(point.port);
        }
        Ok(w.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> OrbResult<Vec<Endpoint>> {
        let mut r = CdrReader::new(data);
        let count = r.read_u32()?;
        let mut points = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            let host = r.read_string()?;
            let port = r.read_u16()?;
            points.push(Endpoint::new(host, port));
        }
        Ok(points)
    }
}

/// Client half: advertises this ORB's listen points on outbound requests.
pub(crate) struct BiDirClientInterceptor {
    own_listen: Arc<RwLock<Vec<Endpoint>>>,
}

impl BiDirClientInterceptor {
    pub fn new(own_listen: Arc<RwLock<Vec<Endpoint>>>) -> Self {
        Self { own_listen }
    }
}

impl ClientRequestInterceptor for BiDirClientInterceptor {
    fn name(&self) -> &str {
        "bidir-offer"
    }

    fn send_request(&self, ri: &mut ClientRequestInfo) -> PointResult {
        let points = self.own_listen.read().clone();
        if points.is_empty() {
            return Ok(());
        }
        let Some(conn) = ri.connection().cloned() else {
            return Ok(());
        };
        // Only connections we dialled can be offered for reverse use.
        if conn.direction() != ConnectionDirection::ClientInitiated {
            return Ok(());
        }
        ri.add_request_service_context(
            crate::service_context::ServiceContext::new(
                BIDIR_CONTEXT_TAG,
                ListenPointsCodec.encode(&points)?,
            ),
            true,
        )?;
        conn.mark_bidirectional();
        Ok(())
    }
}

/// Server half: registers the inbound connection under the peer's advertised
/// listen points.
pub(crate) struct BiDirServerInterceptor {
    router: Weak<ConnectionRouter>,
}

impl BiDirServerInterceptor {
    pub fn new(router: Weak<ConnectionRouter>) -> Self {
        Self { router }
    }
}

impl ServerRequestInterceptor for BiDirServerInterceptor {
    fn name(&self) -> &str {
        "bidir-accept"
    }

    fn receive_request_service_contexts(&self, ri: &mut ServerRequestInfo) -> PointResult {
        let Some(points) = ri
            .request_contexts()
            .decode_with(BIDIR_CONTEXT_TAG, &ListenPointsCodec)?
        else {
            return Ok(());
        };
        let (Some(router), Some(conn)) = (self.router.upgrade(), ri.connection().cloned()) else {
            return Ok(());
        };
        conn.mark_bidirectional();
        for point in points {
            router.register_bidir(point, conn.clone());
        }
        Ok(())
    }
}
