// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Portable-interceptor pipeline: ordered, pluggable hooks invoked at fixed
//! points in a request's lifecycle.
//!
//! # Point sequences
//!
//! ```text
//! server side                         client side
//! -----------                         -----------
//! receive_request_service_contexts    send_request
//! receive_request                          |
//!        |                                wire
//!   target operation                       |
//!        |                           one of:
//! one of:                              receive_reply
//!   send_reply                         receive_exception
//!   send_exception                     receive_other
//!   send_other
//! ```
//!
//! Each point runs over the entire registered list in registration order.
//! Inbound points short-circuit at the first error and divert to the
//! exception point; reply points isolate per-interceptor errors with
//! last-thrown-wins semantics. The `flow` module holds the exact rules.

pub mod info;
pub mod interceptor;
pub mod registry;

pub(crate) mod flow;

pub use info::{ClientRequestInfo, ReplyStatus, ServerRequestInfo};
pub use interceptor::{ClientRequestInterceptor, PointResult, ServerRequestInterceptor};
pub use registry::InterceptorRegistry;
