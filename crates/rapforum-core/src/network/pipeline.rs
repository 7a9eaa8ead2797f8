//! Request pipeline: pre-request interception, dispatch, response
//! classification and settlement.
//!
//! Each attempt moves through
//! `prepared -> {cached | in flight} -> {succeeded | retrying | failed | cancelled}`.
//! One attempt is classified into an [`AttemptOutcome`]; the retry loop in
//! [`Pipeline::execute`] decides whether to resubmit, and [`Pipeline::settle`]
//! turns the final outcome into the caller's result, applying the side
//! effects (notification, forced logout) on the way.

use crate::config::ClientConfig;
use crate::error::{RequestError, Result};
use crate::network::cache::ResponseCache;
use crate::network::client::RequestOptions;
use crate::network::fingerprint::fingerprint;
use crate::network::in_flight::{InFlightHandle, InFlightRegistry};
use crate::network::metrics::{MetricsRecorder, RequestMetric};
use crate::network::retry::RetryState;
use crate::network::transport::{
    query_pairs, DynTransport, OutgoingRequest, RawResponse, RequestBody, TransportError,
};
use crate::session::{DynNavigator, DynNotifier, DynSessionStore};
use crate::wire::ApiResponse;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A logical request as issued through the facade.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub params: Option<Value>,
    pub body: RequestBody,
    pub options: RequestOptions,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            body: RequestBody::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn with_params(mut self, params: Option<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(
            &self.method,
            &self.url,
            self.params.as_ref(),
            self.body.identity().as_ref(),
        )
    }

    fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

/// Classification of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Served from the response cache without touching the network.
    Cached(Value),
    Success(Value),
    /// Response envelope carried a non-OK application code.
    AppError { code: i64, message: String },
    /// Non-2xx HTTP status.
    HttpError { status: u16, message: String },
    Timeout,
    /// Connectivity failure.
    Unreachable(String),
    /// Non-retryable failure without an HTTP status.
    Failed(String),
    /// 2xx response whose body is not a valid envelope.
    Malformed(String),
    /// The URL could not be resolved.
    Invalid(String),
    Cancelled,
}

impl AttemptOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptOutcome::Timeout | AttemptOutcome::Unreachable(_))
    }
}

/// Shared state and collaborators every request passes through.
pub(crate) struct Pipeline {
    pub(crate) config: ClientConfig,
    pub(crate) transport: DynTransport,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) in_flight: Arc<InFlightRegistry>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    pub(crate) session: DynSessionStore,
    pub(crate) navigator: DynNavigator,
    pub(crate) notifier: DynNotifier,
}

impl Pipeline {
    /// Run a request to completion, retrying retryable failures.
    pub(crate) async fn execute(&self, spec: &RequestSpec) -> Result<Value> {
        let fingerprint = spec.fingerprint();
        let mut retry = RetryState::new(self.config.retry);

        loop {
            let outcome = self.attempt(spec, &fingerprint).await;

            if outcome.is_retryable() {
                if let Some(delay) = retry.next_delay() {
                    warn!(
                        "{} {} failed ({:?}), retry {}/{} in {:?}",
                        spec.method,
                        spec.url,
                        outcome,
                        retry.retries(),
                        retry.policy().max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return self.settle(spec, outcome, retry.attempts()).await;
        }
    }

    /// One pass through the pipeline.
    pub(crate) async fn attempt(&self, spec: &RequestSpec, fingerprint: &str) -> AttemptOutcome {
        let started = Instant::now();

        if spec.is_get() {
            if let Some(payload) = self.cache.get(fingerprint) {
                debug!("Cache hit for {} {}", spec.method, spec.url);
                return AttemptOutcome::Cached(payload);
            }
        }

        let url = match self.config.resolve_url(&spec.url) {
            Ok(url) => url,
            Err(e) => return AttemptOutcome::Invalid(e.to_string()),
        };
        let headers = match self.request_headers(spec) {
            Ok(headers) => headers,
            Err(message) => return AttemptOutcome::Invalid(message),
        };

        let request = OutgoingRequest {
            method: spec.method.clone(),
            url,
            query: spec.params.as_ref().map(query_pairs).unwrap_or_default(),
            headers,
            body: spec.body.clone(),
            timeout: spec.options.timeout.unwrap_or(self.config.timeout),
        };

        // Deregisters on every exit, including when the caller drops this future.
        let registration = self.in_flight.enter(fingerprint);
        let result = self.dispatch(request, registration.handle()).await;
        drop(registration);

        let Some(result) = result else {
            debug!("{} {} cancelled", spec.method, spec.url);
            return AttemptOutcome::Cancelled;
        };

        let status = result.as_ref().map(|raw| raw.status).unwrap_or(0);
        self.metrics.record(RequestMetric::new(
            spec.method.as_str(),
            spec.url.as_str(),
            started.elapsed(),
            status,
        ));

        match result {
            Ok(raw) => self.classify_response(spec, fingerprint, raw),
            Err(TransportError::Timeout) => AttemptOutcome::Timeout,
            Err(TransportError::Connect(message)) => AttemptOutcome::Unreachable(message),
            Err(TransportError::Other(message)) => AttemptOutcome::Failed(message),
        }
    }

    /// Send through the transport, racing the in-flight token and the timeout.
    ///
    /// Returns `None` if the request was cancelled.
    async fn dispatch(
        &self,
        request: OutgoingRequest,
        handle: &InFlightHandle,
    ) -> Option<std::result::Result<RawResponse, TransportError>> {
        // Dispatch on the next scheduler turn so a duplicate issued in the same
        // turn supersedes this request before it is sent.
        tokio::task::yield_now().await;
        if handle.is_cancelled() {
            return None;
        }

        let timeout = request.timeout;
        tokio::select! {
            biased;
            _ = handle.token().cancelled() => None,
            result = tokio::time::timeout(timeout, self.transport.send(request)) => {
                Some(result.unwrap_or(Err(TransportError::Timeout)))
            }
        }
    }

    fn classify_response(&self, spec: &RequestSpec, fingerprint: &str, raw: RawResponse) -> AttemptOutcome {
        if !(200..300).contains(&raw.status) {
            let message = serde_json::from_slice::<ApiResponse>(&raw.body)
                .map(|envelope| envelope.message)
                .unwrap_or_default();
            return AttemptOutcome::HttpError {
                status: raw.status,
                message,
            };
        }

        let envelope: ApiResponse = match serde_json::from_slice(&raw.body) {
            Ok(envelope) => envelope,
            Err(e) => return AttemptOutcome::Malformed(e.to_string()),
        };

        if !envelope.is_success() {
            return AttemptOutcome::AppError {
                code: envelope.code,
                message: envelope.message,
            };
        }

        if spec.is_get() {
            self.cache.set(fingerprint, envelope.data.clone());
        }
        AttemptOutcome::Success(envelope.data)
    }

    /// Turn the final outcome into the caller's result.
    pub(crate) async fn settle(&self, spec: &RequestSpec, outcome: AttemptOutcome, attempts: u32) -> Result<Value> {
        let err = match outcome {
            AttemptOutcome::Cached(payload) | AttemptOutcome::Success(payload) => return Ok(payload),
            AttemptOutcome::Cancelled => return Err(RequestError::Cancelled),
            AttemptOutcome::AppError { code, message } => RequestError::Api { code, message },
            AttemptOutcome::HttpError { status, message } => RequestError::Http { status, message },
            AttemptOutcome::Timeout => RequestError::Timeout { attempts },
            AttemptOutcome::Unreachable(message) => RequestError::Network { message, attempts },
            AttemptOutcome::Failed(message) => RequestError::Transport { message },
            AttemptOutcome::Malformed(message) => RequestError::Json {
                message,
                source: None,
            },
            AttemptOutcome::Invalid(message) => RequestError::InvalidRequest(message),
        };

        debug!("{} {} failed: {}", spec.method, spec.url, err);
        if let Some(message) = err.user_message() {
            self.notifier.error(&message);
        }
        if err.is_unauthorized() {
            self.expire_session().await;
        }

        Err(err)
    }

    async fn expire_session(&self) {
        info!("Session expired, redirecting to {}", self.config.login_path);
        self.session.logout().await;
        self.navigator.redirect(&self.config.login_path);
    }

    /// Default headers, per-request headers, then the bearer token.
    fn request_headers(&self, spec: &RequestSpec) -> std::result::Result<HeaderMap, String> {
        let mut headers = self.config.default_headers.clone();
        for (name, value) in &spec.options.headers {
            headers.insert(name.clone(), value.clone());
        }

        // The transport writes the multipart content type with its boundary.
        if spec.body.is_multipart() {
            headers.remove(CONTENT_TYPE);
        }

        if let Some(token) = self.session.token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| format!("invalid session token: {}", e))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}
