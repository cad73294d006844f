// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service contexts: tagged opaque payloads attached to requests and replies.
//!
//! A [`ServiceContext`] is a `(tag, bytes)` pair used for out-of-band metadata
//! exchange between peers. At most one context per tag may be present per
//! message; adding an existing tag with `replace = true` overwrites it
//! (last write wins), adding it with `replace = false` fails.
//!
//! Decoding goes through a pluggable [`ContextCodec`] per context shape, so
//! new context types never touch pipeline code. An absent tag decodes to
//! `Ok(None)`; only a present-but-undecodable payload is an error, and the
//! two are always distinguishable.

use crate::cdr::{CdrReader, CdrWriter};
use crate::error::{OrbError, OrbResult};

/// A tagged opaque payload attached to a request or reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceContext {
    /// Application-defined context tag
    pub tag: u32,

    /// Encapsulated payload bytes
    pub data: Vec<u8>,
}

impl ServiceContext {
    pub fn new(tag: u32, data: Vec<u8>) -> Self {
        Self { tag, data }
    }
}

/// The collection of service contexts carried by one message.
///
/// Insertion order is preserved for the wire; lookups are by tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceContextList {
    contexts: Vec<ServiceContext>,
}

impl ServiceContextList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceContext> {
        self.contexts.iter()
    }

    /// The context for `tag`, or `None` if absent.
    pub fn get(&self, tag: u32) -> Option<&ServiceContext> {
        self.contexts.iter().find(|c| c.tag == tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.get(tag).is_some()
    }

    /// Add a context. With `replace = true` an existing context for the same
    /// tag is overwritten; with `replace = false` a present tag is an error.
    pub fn add(&mut self, context: ServiceContext, replace: bool) -> OrbResult<()> {
        if let Some(existing) = self.contexts.iter_mut().find(|c| c.tag == context.tag) {
            if !replace {
                return Err(OrbError::BadParam(format!(
                    "service context with tag {} already present",
                    context.tag
                )));
            }
            *existing = context;
            return Ok(());
        }
        self.contexts.push(context);
        Ok(())
    }

    /// Encode `value` with `codec` and add it under `tag`.
    pub fn add_encoded<C: ContextCodec>(
        &mut self,
        tag: u32,
        codec: &C,
        value: &C::Value,
        replace: bool,
    ) -> OrbResult<()> {
        let data = codec.encode(value)?;
        self.add(ServiceContext::new(tag, data), replace)
    }

    /// Decode the context under `tag` with `codec`.
    ///
    /// Returns `Ok(None)` when no context with that tag is present — callers
    /// must treat that as "absent", not as a failure. A context that is
    /// present but undecodable yields `Err(MalformedContext)`.
    pub fn decode_with<C: ContextCodec>(&self, tag: u32, codec: &C) -> OrbResult<Option<C::Value>> {
        match self.get(tag) {
            None => Ok(None),
            Some(ctx) => codec
                .decode(&ctx.data)
                .map(Some)
                .map_err(|e| OrbError::MalformedContext {
                    tag,
                    reason: e.to_string(),
                }),
        }
    }
}

impl<'a> IntoIterator for &'a ServiceContextList {
    type Item = &'a ServiceContext;
    type IntoIter = std::slice::Iter<'a, ServiceContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.contexts.iter()
    }
}

/// Translates between a typed context value and its encapsulated wire form.
///
/// One implementation per context shape; the pipeline only ever sees the
/// trait, so new shapes plug in without touching dispatch code.
pub trait ContextCodec {
    type Value;

    fn encode(&self, value: &Self::Value) -> OrbResult<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> OrbResult<Self::Value>;
}

/// Codec for a single `u64`, the shape slot-propagation contexts use.
#[derive(Clone, Copy, Debug, Default)]
pub struct U64Codec;

impl ContextCodec for U64Codec {
    type Value = u64;

    fn encode(&self, value: &u64) -> OrbResult<Vec<u8>> {
        let mut w = CdrWriter::with_capacity(8);
        w.write_u64(*value);
        Ok(w.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> OrbResult<u64> {
        CdrReader::new(data).read_u64()
    }
}
