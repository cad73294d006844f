// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for ORB operations.
//!
//! The taxonomy follows the channel design: configuration errors are fatal to
//! the call that triggered them, an absent service context is never an error
//! (callers get `Ok(None)` from the decode helpers), interceptor-raised errors
//! become the call's terminal exception outcome, and transport/timeout
//! conditions stay distinguishable from application exceptions.

use crate::current::SlotId;
use std::fmt;

/// Result type for ORB operations
pub type OrbResult<T> = Result<T, OrbError>;

/// Errors that can occur during interception, dispatch and routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrbError {
    /// Interceptor or slot registration attempted after the registry was sealed
    RegistrationClosed,

    /// An interceptor with the same non-empty name is already registered
    DuplicateName(String),

    /// Slot id was never allocated by the registry
    InvalidSlot(SlotId),

    /// Invalid argument or protocol misuse (e.g. re-adding a service context
    /// without replace semantics, or a callback on a non-bidirectional
    /// connection)
    BadParam(String),

    /// A service context with the given tag was present but undecodable.
    /// Distinct from "absent", which the decode helpers report as `Ok(None)`.
    MalformedContext { tag: u32, reason: String },

    /// Undecodable wire data outside of service contexts
    Malformed(String),

    /// Application-level exception raised by a servant or an interceptor
    Exception(String),

    /// No servant registered under the requested object key
    NoSuchObject(String),

    /// Servant does not implement the requested operation
    NoSuchOperation(String),

    /// Dispatch did not observe a reply within the configured timeout
    Timeout,

    /// Connection was closed while a call was outstanding
    ConnectionClosed,

    /// Transport-level failure (connect, send, accept)
    Transport(String),

    /// Internal error
    Internal(String),
}

// Wire codes for exception replies. Only the classifications that make sense
// on the peer side get a stable code; everything else degrades to Internal
// with the display text preserved.
const CODE_BAD_PARAM: u32 = 1;
const CODE_EXCEPTION: u32 = 2;
const CODE_NO_SUCH_OBJECT: u32 = 3;
const CODE_NO_SUCH_OPERATION: u32 = 4;
const CODE_MALFORMED: u32 = 5;
const CODE_INTERNAL: u32 = 6;

impl OrbError {
    /// Classification carried in an exception reply: `(code, message)`.
    pub fn to_wire(&self) -> (u32, String) {
        match self {
            Self::BadParam(msg) => (CODE_BAD_PARAM, msg.clone()),
            Self::Exception(msg) => (CODE_EXCEPTION, msg.clone()),
            Self::NoSuchObject(key) => (CODE_NO_SUCH_OBJECT, key.clone()),
            Self::NoSuchOperation(op) => (CODE_NO_SUCH_OPERATION, op.clone()),
            Self::Malformed(msg) => (CODE_MALFORMED, msg.clone()),
            Self::MalformedContext { tag, reason } => {
                (CODE_MALFORMED, format!("context tag {}: {}", tag, reason))
            }
            other => (CODE_INTERNAL, other.to_string()),
        }
    }

    /// Reconstruct an error from its wire classification.
    pub fn from_wire(code: u32, message: String) -> Self {
        match code {
            CODE_BAD_PARAM => Self::BadParam(message),
            CODE_EXCEPTION => Self::Exception(message),
            CODE_NO_SUCH_OBJECT => Self::NoSuchObject(message),
            CODE_NO_SUCH_OPERATION => Self::NoSuchOperation(message),
            CODE_MALFORMED => Self::Malformed(message),
            _ => Self::Internal(message),
        }
    }

    /// True for the configuration-error class (registry misuse, bad slot id).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::RegistrationClosed | Self::DuplicateName(_) | Self::InvalidSlot(_)
        )
    }
}

impl fmt::Display for OrbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrationClosed => write!(f, "interceptor registration already completed"),
            Self::DuplicateName(name) => write!(f, "duplicate interceptor name: {}", name),
            Self::InvalidSlot(id) => write!(f, "invalid slot id: {}", id.raw()),
            Self::BadParam(msg) => write!(f, "bad parameter: {}", msg),
            Self::MalformedContext { tag, reason } => {
                write!(f, "malformed service context (tag {}): {}", tag, reason)
            }
            Self::Malformed(msg) => write!(f, "malformed data: {}", msg),
            Self::Exception(msg) => write!(f, "application exception: {}", msg),
            Self::NoSuchObject(key) => write!(f, "no servant for object key: {}", key),
            Self::NoSuchOperation(op) => write!(f, "no such operation: {}", op),
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for OrbError {}

impl From<std::io::Error> for OrbError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
