// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hiop is a request-interception middleware core: an ORB-style pipeline of
//! portable interceptors around blocking RPC dispatch, with PICurrent-style
//! slot propagation, tagged service contexts and bidirectional connection
//! reuse.
//!
//! # Quick start
//!
//! ```no_run
//! use hiop::{Current, InvokeReply, Orb, OrbResult, Servant, ServantReply};
//! use hiop::reference::Endpoint;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Servant for Echo {
//!     fn invoke(
//!         &self,
//!         _operation: &str,
//!         args: &[u8],
//!         _current: &mut Current<'_>,
//!     ) -> OrbResult<ServantReply> {
//!         Ok(ServantReply::Normal(args.to_vec()))
//!     }
//! }
//!
//! fn main() -> OrbResult<()> {
//!     let server = Orb::builder().build()?;
//!     server.register_servant("echo", Arc::new(Echo));
//!     let bound = server.listen(&Endpoint::new("127.0.0.1", 0))?;
//!
//!     let client = Orb::builder().build()?;
//!     let token = client.allocate_token();
//!     let target = hiop::reference::ObjectRef::new(bound, "echo");
//!     match client.invoke(token, &target, "ping", b"hello")? {
//!         InvokeReply::Reply(bytes) => assert_eq!(bytes, b"hello"),
//!         InvokeReply::Other(objref) => println!("redirected to {objref}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! - [`orb`] — bootstrap, servant registry, client/server dispatch
//! - [`interception`] — interceptor traits, per-request info, registry
//! - [`current`] — slot tables with request and thread scope
//! - [`service_context`] — tagged contexts and their codecs
//! - [`router`] — connection cache, worker pool, bidirectional routing
//! - [`transport`] — wire framing over TCP or in-process channels
//! - [`cdr`] — little-endian encapsulation reader/writer

pub mod cdr;
pub mod current;
pub mod error;
pub mod interception;
pub mod orb;
pub mod reference;
pub mod router;
pub mod service_context;
pub mod transport;

pub use current::{
    slot_value, Current, CurrentManager, SlotId, SlotScope, SlotTable, SlotValue, ThreadToken,
};
pub use error::{OrbError, OrbResult};
pub use interception::{
    ClientRequestInfo, ClientRequestInterceptor, InterceptorRegistry, PointResult, ReplyStatus,
    ServerRequestInfo, ServerRequestInterceptor,
};
pub use orb::{InvokeReply, Orb, OrbBuilder, OrbConfig, Servant, ServantReply};
pub use reference::{Endpoint, ObjectRef, TaggedComponent};
pub use router::{Connection, ConnectionDirection, RouterConfig, BIDIR_CONTEXT_TAG};
pub use service_context::{ContextCodec, ServiceContext, ServiceContextList, U64Codec};
