// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered interceptor registration with a one-time sealing step.
//!
//! Registration is a bootstrap-only phase: interceptors are appended in
//! order, slot ids are allocated, then [`InterceptorRegistry::complete_registration`]
//! installs immutable ordered lists and every later `add_*` fails with a
//! configuration error. The installed lists are read lock-free; before
//! sealing they read as empty, so a half-configured registry never drives
//! a pipeline.

use crate::current::SlotId;
use crate::error::{OrbError, OrbResult};
use crate::interception::interceptor::{ClientRequestInterceptor, ServerRequestInterceptor};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// The immutable lists installed at sealing time.
struct Installed {
    client: Vec<Arc<dyn ClientRequestInterceptor>>,
    server: Vec<Arc<dyn ServerRequestInterceptor>>,
}

/// Pre-seal registration state.
#[derive(Default)]
struct Building {
    client: Vec<Arc<dyn ClientRequestInterceptor>>,
    server: Vec<Arc<dyn ServerRequestInterceptor>>,
    client_names: HashSet<String>,
    server_names: HashSet<String>,
}

/// Owns the ordered interceptor collections and allocates slot ids.
pub struct InterceptorRegistry {
    building: Mutex<Option<Building>>,
    installed: ArcSwapOption<Installed>,
    next_slot: AtomicU32,
}

impl Default for InterceptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self {
            building: Mutex::new(Some(Building::default())),
            installed: ArcSwapOption::from(None),
            next_slot: AtomicU32::new(0),
        }
    }

    /// Has `complete_registration` run?
    pub fn is_sealed(&self) -> bool {
        self.installed.load().is_some()
    }

    /// Append a client-side interceptor. Fails after sealing; a non-empty
    /// name that is already registered on this side also fails.
    pub fn add_client_interceptor(
        &self,
        interceptor: Arc<dyn ClientRequestInterceptor>,
    ) -> OrbResult<()> {
        let mut guard = self.building.lock();
        let building = guard.as_mut().ok_or(OrbError::RegistrationClosed)?;
        let name = interceptor.name();
        if !name.is_empty() && !building.client_names.insert(name.to_string()) {
            return Err(OrbError::DuplicateName(name.to_string()));
        }
        building.client.push(interceptor);
        Ok(())
    }

    /// Append a server-side interceptor. Same rules as the client side.
    pub fn add_server_interceptor(
        &self,
        interceptor: Arc<dyn ServerRequestInterceptor>,
    ) -> OrbResult<()> {
        let mut guard = self.building.lock();
        let building = guard.as_mut().ok_or(OrbError::RegistrationClosed)?;
        let name = interceptor.name();
        if !name.is_empty() && !building.server_names.insert(name.to_string()) {
            return Err(OrbError::DuplicateName(name.to_string()));
        }
        building.server.push(interceptor);
        Ok(())
    }

    /// Allocate a fresh slot id. Ids are monotone and never reused for the
    /// lifetime of the process; allocation fails once the registry is sealed
    /// because the slot tables are sized at that point.
    pub fn allocate_slot_id(&self) -> OrbResult<SlotId> {
        if self.is_sealed() {
            return Err(OrbError::RegistrationClosed);
        }
        Ok(SlotId::from_raw(self.next_slot.fetch_add(1, Ordering::Relaxed)))
    }

    /// Number of allocated slot ids so far.
    pub fn slot_count(&self) -> usize {
        self.next_slot.load(Ordering::Relaxed) as usize
    }

    /// Seal the registry, installing the immutable ordered lists.
    /// Idempotent: calling it again is a no-op.
    pub fn complete_registration(&self) {
        let mut guard = self.building.lock();
        if let Some(building) = guard.take() {
            self.installed.store(Some(Arc::new(Installed {
                client: building.client,
                server: building.server,
            })));
            log::debug!(
                "interceptor registration complete: {} client, {} server, {} slots",
                self.client_interceptors().len(),
                self.server_interceptors().len(),
                self.slot_count()
            );
        }
    }

    /// The active client-side list, in registration order. Empty until the
    /// registry is sealed.
    pub fn client_interceptors(&self) -> Vec<Arc<dyn ClientRequestInterceptor>> {
        match self.installed.load_full() {
            Some(installed) => installed.client.clone(),
            None => Vec::new(),
        }
    }

    /// The active server-side list, in registration order. Empty until the
    /// registry is sealed.
    pub fn server_interceptors(&self) -> Vec<Arc<dyn ServerRequestInterceptor>> {
        match self.installed.load_full() {
            Some(installed) => installed.server.clone(),
            None => Vec::new(),
        }
    }
}
