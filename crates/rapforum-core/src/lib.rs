//! Rapforum Core - HTTP request layer for the rap album forum client.
//!
//! Every feature module of the client talks to the backend through one
//! [`ApiClient`]. The client fingerprints each logical request, cancels
//! superseded duplicates, serves repeated GETs from a time-bounded cache,
//! retries timeouts and connectivity failures, records per-request metrics,
//! and routes authorization failures to a forced logout.
//!
//! # Example
//!
//! ```rust,ignore
//! use rapforum_core::{ApiClient, ClientConfig, MemorySession};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rapforum_core::Result<()> {
//!     let client = ApiClient::builder()
//!         .config(ClientConfig::from_env()?)
//!         .session(Arc::new(MemorySession::with_token("token")))
//!         .build()?;
//!
//!     let albums: Value = client
//!         .get("/albums", Some(json!({"page": 1, "pageSize": 20})))
//!         .await?;
//!     println!("{}", albums);
//!
//!     println!("success rate: {}%", client.request_success_rate());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod network;
pub mod scope;
pub mod session;
pub mod wire;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{ClientConfig, NetworkConfig};
pub use error::{RequestError, Result};
pub use network::{
    ApiClient, ApiClientBuilder, ProgressCallback, RequestMetric, RequestOptions, RetryPolicy,
    UploadFile,
};
pub use scope::RequestScope;
pub use session::{
    LogNavigator, LogNotifier, MemorySession, Navigator, Notifier, SessionStore,
};
pub use wire::{ApiResponse, PageData, PageParams};
