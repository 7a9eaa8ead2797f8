//! Collaborator seams the pipeline calls into.
//!
//! The request layer does not own the user session, navigation or the UI.
//! It reaches them through these traits:
//! - [`SessionStore`]: current bearer token and forced logout
//! - [`Navigator`]: redirect to the login entry point
//! - [`Notifier`]: user-visible error messages

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

/// Source of the bearer token and owner of the logout operation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current bearer token, if the user is logged in.
    fn token(&self) -> Option<String>;

    /// Clear the local session.
    async fn logout(&self);
}

/// Redirects the application shell.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Surfaces error messages to the user.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

pub type DynSessionStore = Arc<dyn SessionStore>;
pub type DynNavigator = Arc<dyn Navigator>;
pub type DynNotifier = Arc<dyn Notifier>;

/// In-memory session holding an optional bearer token.
#[derive(Debug, Default)]
pub struct MemorySession {
    token: RwLock<Option<String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn is_logged_in(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn logout(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Navigator that logs redirects and remembers the last target.
#[derive(Debug, Default)]
pub struct LogNavigator {
    last: RwLock<Option<String>>,
}

impl LogNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for LogNavigator {
    fn redirect(&self, path: &str) {
        info!("Redirecting to {}", path);
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }
}

/// Notifier that reports errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
