//! Request pipeline for the forum backend.
//!
//! This module provides:
//! - Request fingerprinting and in-flight de-duplication
//! - A time-bounded response cache for GET requests
//! - Fixed-backoff retries for timeouts and connectivity failures
//! - A bounded buffer of per-request metrics
//! - The [`ApiClient`] facade tying them together

mod cache;
mod client;
mod fingerprint;
mod in_flight;
mod metrics;
mod pipeline;
mod retry;
mod transport;

pub use cache::ResponseCache;
pub use client::{ApiClient, ApiClientBuilder, RequestOptions};
pub use fingerprint::{canonical_json, fingerprint};
pub use in_flight::{InFlightGuard, InFlightHandle, InFlightRegistry};
pub use metrics::{MetricsRecorder, RequestMetric};
pub use pipeline::{AttemptOutcome, RequestSpec};
pub use retry::{RetryPolicy, RetryState};
pub use transport::{
    query_pairs, DynTransport, OutgoingRequest, ProgressCallback, ProgressReporter, RawResponse,
    RequestBody, ReqwestTransport, Transport, TransportError, UploadFile,
};
