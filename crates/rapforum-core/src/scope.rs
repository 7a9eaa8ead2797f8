//! Request scopes tied to the lifetime of a view.
//!
//! A [`RequestScope`] tracks the requests one view issues: whether any are
//! still loading and the last error they produced. Dropping the scope cancels
//! every in-flight request of the client, which is how a view tears down its
//! pending work when it goes away.

use crate::error::Result;
use crate::network::ApiClient;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Loading and error state for the requests of one view.
#[derive(Debug)]
pub struct RequestScope {
    client: ApiClient,
    loading: AtomicUsize,
    last_error: Mutex<Option<String>>,
    auto_cancel: bool,
}

impl RequestScope {
    /// Create a scope that cancels in-flight requests when dropped.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            loading: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            auto_cancel: true,
        }
    }

    /// Leave in-flight requests running when the scope is dropped.
    pub fn without_auto_cancel(mut self) -> Self {
        self.auto_cancel = false;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Whether any tracked request is still pending.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    /// Message of the last tracked failure. Cancellations are not recorded.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Await `request`, updating the loading flag and the last error.
    ///
    /// Returns `None` if the request failed or was cancelled.
    pub async fn track<T, F>(&self, request: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.set_error(None);
        let _loading = LoadingGuard::enter(&self.loading);

        match request.await {
            Ok(value) => Some(value),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                self.set_error(Some(e.to_string()));
                None
            }
        }
    }

    /// Clear the recorded error.
    pub fn reset(&self) {
        self.set_error(None);
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.auto_cancel {
            let cancelled = self.client.cancel_all_requests();
            if cancelled > 0 {
                debug!("Scope dropped, cancelled {} request(s)", cancelled);
            }
        }
    }
}

/// Counts a tracked request as loading until dropped.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
