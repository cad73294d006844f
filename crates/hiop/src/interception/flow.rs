// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow drivers for the interception point sequences.
//!
//! A flow walks the sealed, ordered interceptor list once per point.
//! Inbound points short-circuit at the first error; reply points run the
//! full list with per-interceptor error isolation, the last error raised
//! at a point replacing the outcome reported further (and visible to the
//! remaining interceptors at that point through the request info).

use crate::error::OrbError;
use crate::interception::info::{ClientRequestInfo, ReplyStatus, ServerRequestInfo};
use crate::interception::interceptor::{ClientRequestInterceptor, ServerRequestInterceptor};
use std::sync::Arc;

/// Drives the five server-side points over one ordered interceptor list.
pub(crate) struct ServerFlow<'a> {
    interceptors: &'a [Arc<dyn ServerRequestInterceptor>],
}

impl<'a> ServerFlow<'a> {
    pub fn new(interceptors: &'a [Arc<dyn ServerRequestInterceptor>]) -> Self {
        Self { interceptors }
    }

    /// Point 1: inbound service contexts. Short-circuits on the first error;
    /// remaining interceptors at this point are not invoked.
    pub fn receive_request_service_contexts(
        &self,
        info: &mut ServerRequestInfo,
    ) -> Result<(), OrbError> {
        for interceptor in self.interceptors {
            interceptor.receive_request_service_contexts(info)?;
        }
        Ok(())
    }

    /// Point 2: full request. Same short-circuit rule as point 1.
    pub fn receive_request(&self, info: &mut ServerRequestInfo) -> Result<(), OrbError> {
        for interceptor in self.interceptors {
            interceptor.receive_request(info)?;
        }
        Ok(())
    }

    /// Normal-reply point. Runs the entire list; an error from one
    /// interceptor does not stop later ones, but the last error replaces
    /// the reply with an exception outcome.
    pub fn send_reply(&self, info: &mut ServerRequestInfo) -> Option<OrbError> {
        info.set_reply_status(ReplyStatus::Successful);
        let mut last_err = None;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.send_reply(info) {
                log::debug!(
                    "send_reply interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_reply_status(ReplyStatus::Exception);
                info.set_sent_exception(e.clone());
                last_err = Some(e);
            }
        }
        last_err
    }

    /// Exception point. Every registered interceptor observes the outcome;
    /// an error raised here replaces the effective exception for the
    /// remaining interceptors and for the caller (last-thrown-wins).
    pub fn send_exception(&self, info: &mut ServerRequestInfo, err: OrbError) -> OrbError {
        info.set_reply_status(ReplyStatus::Exception);
        info.set_sent_exception(err.clone());
        let mut effective = err;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.send_exception(info) {
                log::debug!(
                    "send_exception interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_sent_exception(e.clone());
                effective = e;
            }
        }
        effective
    }

    /// "Other"-outcome point, same isolation rule as `send_reply`.
    pub fn send_other(&self, info: &mut ServerRequestInfo) -> Option<OrbError> {
        info.set_reply_status(ReplyStatus::Other);
        let mut last_err = None;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.send_other(info) {
                log::debug!(
                    "send_other interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_reply_status(ReplyStatus::Exception);
                info.set_sent_exception(e.clone());
                last_err = Some(e);
            }
        }
        last_err
    }
}

/// Drives the client-side points over one ordered interceptor list.
pub(crate) struct ClientFlow<'a> {
    interceptors: &'a [Arc<dyn ClientRequestInterceptor>],
}

impl<'a> ClientFlow<'a> {
    pub fn new(interceptors: &'a [Arc<dyn ClientRequestInterceptor>]) -> Self {
        Self { interceptors }
    }

    /// Outbound point. Short-circuits on the first error; the request is
    /// then not sent and the exception point runs instead.
    pub fn send_request(&self, info: &mut ClientRequestInfo) -> Result<(), OrbError> {
        for interceptor in self.interceptors {
            interceptor.send_request(info)?;
        }
        Ok(())
    }

    /// Normal-reply point, full list with error isolation.
    pub fn receive_reply(&self, info: &mut ClientRequestInfo) -> Option<OrbError> {
        info.set_reply_status(ReplyStatus::Successful);
        let mut last_err = None;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.receive_reply(info) {
                log::debug!(
                    "receive_reply interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_reply_status(ReplyStatus::Exception);
                info.set_received_exception(e.clone());
                last_err = Some(e);
            }
        }
        last_err
    }

    /// Exception point; last-thrown-wins, full list always runs.
    pub fn receive_exception(&self, info: &mut ClientRequestInfo, err: OrbError) -> OrbError {
        info.set_reply_status(ReplyStatus::Exception);
        info.set_received_exception(err.clone());
        let mut effective = err;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.receive_exception(info) {
                log::debug!(
                    "receive_exception interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_received_exception(e.clone());
                effective = e;
            }
        }
        effective
    }

    /// "Other"-outcome point, same isolation rule as `receive_reply`.
    pub fn receive_other(&self, info: &mut ClientRequestInfo) -> Option<OrbError> {
        info.set_reply_status(ReplyStatus::Other);
        let mut last_err = None;
        for interceptor in self.interceptors {
            if let Err(e) = interceptor.receive_other(info) {
                log::debug!(
                    "receive_other interceptor '{}' raised: {}",
                    interceptor.name(),
                    e
                );
                info.set_reply_status(ReplyStatus::Exception);
                info.set_received_exception(e.clone());
                last_err = Some(e);
            }
        }
        last_err
    }
}
