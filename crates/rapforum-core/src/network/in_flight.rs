//! Registry of in-flight requests keyed by fingerprint.
//!
//! Registering a fingerprint that is already in flight cancels the earlier
//! request and replaces its handle in one step under the lock.

use crate::cancel::CancellationToken;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A registered request: its fingerprint and cancellation token.
#[derive(Debug, Clone)]
pub struct InFlightHandle {
    id: u64,
    fingerprint: String,
    token: CancellationToken,
}

impl InFlightHandle {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// In-flight request registry shared by every request of a client.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, InFlightHandle>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, cancelling a superseded duplicate if there is one.
    pub fn register(&self, fingerprint: &str) -> InFlightHandle {
        let handle = InFlightHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            fingerprint: fingerprint.to_string(),
            token: CancellationToken::new(),
        };

        let superseded = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.to_string(), handle.clone());

        if let Some(previous) = superseded {
            debug!("Cancelling superseded duplicate request {}", fingerprint);
            previous.token.cancel();
        }

        handle
    }

    /// Remove a settled request.
    ///
    /// Only removes the entry if it still belongs to `handle`; a request that
    /// was superseded must not evict its successor. Returns whether an entry
    /// was removed.
    pub fn clear(&self, handle: &InFlightHandle) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&handle.fingerprint) {
            Some(current) if current.id == handle.id => {
                pending.remove(&handle.fingerprint);
                true
            }
            _ => false,
        }
    }

    /// Cancel every outstanding request and empty the registry.
    ///
    /// Returns the number of requests cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<InFlightHandle> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        for handle in &drained {
            handle.token.cancel();
        }
        if !drained.is_empty() {
            debug!("Cancelled {} in-flight request(s)", drained.len());
        }
        drained.len()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a request and deregister it when the guard is dropped.
    ///
    /// The entry is removed however the request ends, including when the
    /// caller drops the request future before it settles.
    pub fn enter(&self, fingerprint: &str) -> InFlightGuard<'_> {
        InFlightGuard {
            registry: self,
            handle: self.register(fingerprint),
        }
    }
}

/// Registration that clears itself on drop.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    handle: InFlightHandle,
}

impl InFlightGuard<'_> {
    pub fn handle(&self) -> &InFlightHandle {
        &self.handle
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.clear(&self.handle);
    }
}
