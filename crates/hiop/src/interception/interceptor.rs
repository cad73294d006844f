// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interceptor traits for the client- and server-side request pipelines.
//!
//! Every interception point returns a [`PointResult`]; the flow driver
//! inspects it to decide whether to continue, so no hook ever unwinds
//! through the pipeline. Each point has a default no-op body — a concrete
//! interceptor implements exactly the points it cares about, and the
//! registry holds one homogeneous ordered list per side.
//!
//! Registration order is invocation order and is part of the observable
//! contract.

use crate::error::OrbResult;
use crate::interception::info::{ClientRequestInfo, ServerRequestInfo};

/// Outcome of a single interception point: `Ok` to continue the flow,
/// `Err` to short-circuit it (inbound points) or to replace the outcome
/// (reply points).
pub type PointResult = OrbResult<()>;

/// Server-side request interceptor.
///
/// Point order for one request: `receive_request_service_contexts`,
/// `receive_request`, then — after the target operation — exactly one of
/// `send_reply`, `send_exception` or `send_other`.
pub trait ServerRequestInterceptor: Send + Sync {
    /// Display name; non-empty names must be unique within the registry.
    fn name(&self) -> &str {
        ""
    }

    /// Inbound contexts are available; slots may be populated from them.
    fn receive_request_service_contexts(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        Ok(())
    }

    /// Full request available, operation not yet executed.
    fn receive_request(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        Ok(())
    }

    /// Operation completed normally; reply contexts may be attached.
    fn send_reply(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        Ok(())
    }

    /// The call terminates with an exception outcome.
    fn send_exception(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        Ok(())
    }

    /// The call terminates with a non-exception, non-normal outcome
    /// (location-forward-style redirect).
    fn send_other(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        Ok(())
    }
}

/// Client-side request interceptor.
///
/// Point order for one call: `send_request`, then exactly one of
/// `receive_reply`, `receive_exception` or `receive_other`.
pub trait ClientRequestInterceptor: Send + Sync {
    /// Display name; non-empty names must be unique within the registry.
    fn name(&self) -> &str {
        ""
    }

    /// Request about to be sent; the selected connection and the target's
    /// tagged components are visible, outbound contexts may be attached.
    fn send_request(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        Ok(())
    }

    /// Reserved for deferred-synchronous polling. Never invoked for
    /// synchronous two-way calls.
    fn send_poll(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        Ok(())
    }

    /// Normal reply received.
    fn receive_reply(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        Ok(())
    }

    /// The call terminated with an exception (application or system).
    fn receive_exception(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        Ok(())
    }

    /// The call terminated with an "other" outcome (e.g. a redirect).
    fn receive_other(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        Ok(())
    }
}
