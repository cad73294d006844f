// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object references and their static, per-reference metadata.
//!
//! An [`ObjectRef`] names a remote servant: the endpoint its ORB listens on,
//! the object key it is registered under, and a set of tagged components —
//! read-only profile metadata that client-side `send_request` interceptors
//! may inspect.

use std::fmt;

/// A transport-level address: host and port.
///
/// Also serves as a listen point advertised in the bidirectional service
/// context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Static metadata attached to an object reference, addressed by tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedComponent {
    pub tag: u32,
    pub data: Vec<u8>,
}

impl TaggedComponent {
    pub fn new(tag: u32, data: Vec<u8>) -> Self {
        Self { tag, data }
    }
}

/// Reference to a remote object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub endpoint: Endpoint,
    pub object_key: String,
    components: Vec<TaggedComponent>,
}

impl ObjectRef {
    pub fn new(endpoint: Endpoint, object_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            object_key: object_key.into(),
            components: Vec::new(),
        }
    }

    /// Builder-style addition of a tagged component.
    pub fn with_component(mut self, component: TaggedComponent) -> Self {
        self.components.push(component);
        self
    }

    /// All tagged components, in the order they were attached.
    pub fn components(&self) -> &[TaggedComponent] {
        &self.components
    }

    /// The component data for `tag`, or `None` if the reference carries none.
    pub fn component(&self, tag: u32) -> Option<&[u8]> {
        self.components
            .iter()
            .find(|c| c.tag == tag)
            .map(|c| c.data.as_slice())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.object_key, self.endpoint)
    }
}
