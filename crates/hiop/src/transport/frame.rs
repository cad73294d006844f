// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame encoding for byte-stream transports.
//!
//! Layout (all little-endian, strings and byte sequences u32-length-prefixed):
//!
//! ```text
//! u8 kind                  0 = request, 1 = reply
//! -- request --
//! u64 request_id
//! string object_key
//! string operation
//! bytes payload
//! u32 context_count { u32 tag, bytes data }*
//! -- reply --
//! u64 request_id
//! u32 context_count { u32 tag, bytes data }*
//! u8 body_kind             0 = normal, 1 = exception, 2 = other
//!   normal:    bytes payload
//!   exception: u32 code, string message
//!   other:     string host, u16 port, string object_key,
//!              u32 component_count { u32 tag, bytes data }*
//! ```
//!
//! The outer u32 length prefix framing a whole message on a stream is the
//! transport's job, not this codec's.

use crate::cdr::{CdrReader, CdrWriter};
use crate::error::{OrbError, OrbResult};
use crate::reference::{Endpoint, ObjectRef, TaggedComponent};
use crate::service_context::{ServiceContext, ServiceContextList};
use crate::transport::{ReplyBody, ReplyMessage, RequestMessage, WireFrame};

const KIND_REQUEST: u8 = 0;
const KIND_REPLY: u8 = 1;

const BODY_NORMAL: u8 = 0;
const BODY_EXCEPTION: u8 = 1;
const BODY_OTHER: u8 = 2;

fn write_contexts(w: &mut CdrWriter, contexts: &ServiceContextList) {
    w.write_u32(contexts.len() as u32);
    for ctx in contexts {
        w.write_u32(ctx.tag);
        w.write_bytes(&ctx.data);
    }
}

fn read_contexts(r: &mut CdrReader<'_>) -> OrbResult<ServiceContextList> {
    let count = r.read_u32()?;
    let mut list = ServiceContextList::new();
    for _ in 0..count {
        let tag = r.read_u32()?;
        let data = r.read_bytes()?;
        // wire side of last-write-wins: later entries overwrite earlier ones
        list.add(ServiceContext::new(tag, data), true)?;
    }
    Ok(list)
}

fn write_object_ref(w: &mut CdrWriter, objref: &ObjectRef) {
    w.write_string(&objref.endpoint.host);
    w.write_u16(objref.endpoint.port);
    w.write_string(&objref.object_key);
    w.write_u32(objref.components().len() as u32);
    for c in objref.components() {
        w.write_u32(c.tag);
        w.write_bytes(&c.data);
    }
}

fn read_object_ref(r: &mut CdrReader<'_>) -> OrbResult<ObjectRef> {
    let host = r.read_string()?;
    let port = r.read_u16()?;
    let key = r.read_string()?;
    let count = r.read_u32()?;
    let mut objref = ObjectRef::new(Endpoint::new(host, port), key);
    for _ in 0..count {
        let tag = r.read_u32()?;
        let data = r.read_bytes()?;
        objref = objref.with_component(TaggedComponent::new(tag, data));
    }
    Ok(objref)
}

/// Encode one frame to bytes (without the stream-level length prefix).
pub fn encode_frame(frame: &WireFrame) -> Vec<u8> {
    let mut w = CdrWriter::with_capacity(64);
    match frame {
        WireFrame::Request(req) => {
            w.write_u8(KIND_REQUEST);
            w.write_u64(req.request_id);
            w.write_string(&req.object_key);
            w.write_string(&req.operation);
            w.write_bytes(&req.payload);
            write_contexts(&mut w, &req.service_contexts);
        }
        WireFrame::Reply(reply) => {
            w.write_u8(KIND_REPLY);
            w.write_u64(reply.request_id);
            write_contexts(&mut w, &reply.service_contexts);
            match &reply.body {
                ReplyBody::Normal(payload) => {
                    w.write_u8(BODY_NORMAL);
                    w.write_bytes(payload);
                }
                ReplyBody::Exception(err) => {
                    w.write_u8(BODY_EXCEPTION);
                    let (code, message) = err.to_wire();
                    w.write_u32(code);
                    w.write_string(&message);
                }
                ReplyBody::Other(objref) => {
                    w.write_u8(BODY_OTHER);
                    write_object_ref(&mut w, objref);
                }
            }
        }
    }
    w.into_bytes()
}

/// Decode one frame from bytes.
pub fn decode_frame(data: &[u8]) -> OrbResult<WireFrame> {
    let mut r = CdrReader::new(data);
    match r.read_u8()? {
        KIND_REQUEST => {
            let request_id = r.read_u64()?;
            let object_key = r.read_string()?;
            let operation = r.read_string()?;
            let payload = r.read_bytes()?;
            let service_contexts = read_contexts(&mut r)?;
            Ok(WireFrame::Request(RequestMessage {
                request_id,
                object_key,
                operation,
                payload,
                service_contexts,
            }))
        }
        KIND_REPLY => {
            let request_id = r.read_u64()?;
            let service_contexts = read_contexts(&mut r)?;
            let body = match r.read_u8()? {
                BODY_NORMAL => ReplyBody::Normal(r.read_bytes()?),
                BODY_EXCEPTION => {
                    let code = r.read_u32()?;
                    let message = r.read_string()?;
                    ReplyBody::Exception(OrbError::from_wire(code, message))
                }
                BODY_OTHER => ReplyBody::Other(read_object_ref(&mut r)?),
                other => {
                    return Err(OrbError::Malformed(format!(
                        "unknown reply body kind: {}",
                        other
                    )))
                }
            };
            Ok(WireFrame::Reply(ReplyMessage {
                request_id,
                service_contexts,
                body,
            }))
        }
        other => Err(OrbError::Malformed(format!(
            "unknown frame kind: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_context::U64Codec;

    #[test]
    fn test_request_round_trip() {
        let mut contexts = ServiceContextList::new();
        contexts.add_encoded(5, &U64Codec, &77u64, true).unwrap();
        let frame = WireFrame::Request(RequestMessage {
            request_id: 9,
            object_key: "calc".to_string(),
            operation: "add".to_string(),
            payload: vec![1, 2, 3, 4],
            service_contexts: contexts,
        });

        let decoded = decode_frame(&encode_frame(&frame)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_reply_bodies_round_trip() {
        let bodies = [
            ReplyBody::Normal(vec![9, 9]),
            ReplyBody::Exception(OrbError::Exception("denied".to_string())),
            ReplyBody::Other(
                ObjectRef::new(Endpoint::new("peer", 9000), "fallback")
                    .with_component(TaggedComponent::new(1, vec![0xFF])),
            ),
        ];
        for body in bodies {
            let frame = WireFrame::Reply(ReplyMessage {
                request_id: 3,
                service_contexts: ServiceContextList::new(),
                body,
            });
            assert_eq!(decode_frame(&encode_frame(&frame)).unwrap(), frame);
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_frame(&[0xEE, 0x01]),
            Err(OrbError::Malformed(_))
        ));
        assert!(matches!(decode_frame(&[]), Err(OrbError::Malformed(_))));
    }
}
