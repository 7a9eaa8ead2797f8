//! Public client facade.
//!
//! [`ApiClient`] is the `get/post/put/delete/upload` surface every feature
//! module calls. It is built once at startup with [`ApiClientBuilder`] and
//! cloned wherever it is needed; clones share the cache, the in-flight
//! registry and the metrics buffer.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::network::cache::ResponseCache;
use crate::network::in_flight::InFlightRegistry;
use crate::network::metrics::{MetricsRecorder, RequestMetric};
use crate::network::pipeline::{Pipeline, RequestSpec};
use crate::network::transport::{
    DynTransport, ProgressCallback, ReqwestTransport, RequestBody, UploadFile,
};
use crate::session::{
    DynNavigator, DynNotifier, DynSessionStore, LogNavigator, LogNotifier, MemorySession,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, replacing defaults with the same name.
    pub headers: HeaderMap,
    /// Per-attempt timeout instead of the client default.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP client for the forum backend.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<Pipeline>,
}

impl ApiClient {
    /// Start building a client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// Create a client with the given config and default collaborators.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ApiClientBuilder::new().config(config).build()
    }

    /// GET request. Successful responses are cached.
    pub async fn get<T: DeserializeOwned>(&self, url: &str, params: Option<Value>) -> Result<T> {
        self.get_with(url, params, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::GET, url)
            .with_params(params)
            .with_options(options);
        self.request(spec).await
    }

    /// POST request with an optional JSON body.
    pub async fn post<T: DeserializeOwned>(&self, url: &str, data: Option<Value>) -> Result<T> {
        self.post_with(url, data, RequestOptions::default()).await
    }

    pub async fn post_with<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::POST, url)
            .with_body(json_body(data))
            .with_options(options);
        self.request(spec).await
    }

    /// PUT request with an optional JSON body.
    pub async fn put<T: DeserializeOwned>(&self, url: &str, data: Option<Value>) -> Result<T> {
        self.put_with(url, data, RequestOptions::default()).await
    }

    pub async fn put_with<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::PUT, url)
            .with_body(json_body(data))
            .with_options(options);
        self.request(spec).await
    }

    /// DELETE request with optional query parameters.
    pub async fn delete<T: DeserializeOwned>(&self, url: &str, params: Option<Value>) -> Result<T> {
        self.delete_with(url, params, RequestOptions::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::DELETE, url)
            .with_params(params)
            .with_options(options);
        self.request(spec).await
    }

    /// Multipart upload of `file` as the `file` form field.
    ///
    /// `on_progress` receives integer percentages and always sees 100 once
    /// the body has been sent.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        url: &str,
        file: UploadFile,
        on_progress: Option<ProgressCallback>,
    ) -> Result<T> {
        let spec = RequestSpec::new(Method::POST, url).with_body(RequestBody::Multipart {
            file,
            progress: on_progress,
        });
        self.request(spec).await
    }

    /// Run an arbitrary request through the pipeline and decode its payload.
    pub async fn request<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        let payload = self.pipeline.execute(&spec).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.pipeline.cache.clear();
    }

    /// Cancel every in-flight request. Returns how many were cancelled.
    pub fn cancel_all_requests(&self) -> usize {
        self.pipeline.in_flight.cancel_all()
    }

    /// Recent request metrics, oldest first.
    pub fn request_metrics(&self) -> Vec<RequestMetric> {
        self.pipeline.metrics.all()
    }

    /// Mean request duration in milliseconds.
    pub fn average_request_duration(&self) -> u64 {
        self.pipeline.metrics.average_duration()
    }

    /// Percentage of recent requests that returned a 2xx status.
    pub fn request_success_rate(&self) -> u32 {
        self.pipeline.metrics.success_rate()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.pipeline.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.pipeline.cache
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.pipeline.in_flight
    }

    pub fn session(&self) -> &DynSessionStore {
        &self.pipeline.session
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.pipeline.config.base_url)
            .field("cached", &self.pipeline.cache.len())
            .field("in_flight", &self.pipeline.in_flight.len())
            .finish()
    }
}

fn json_body(data: Option<Value>) -> RequestBody {
    data.map(RequestBody::Json).unwrap_or_default()
}

/// Builder for [`ApiClient`].
///
/// Collaborators that are not supplied fall back to a reqwest transport, an
/// in-memory session, and logging navigator/notifier implementations.
///
/// # Example
///
/// ```rust,ignore
/// use rapforum_core::{ApiClient, ClientConfig, MemorySession};
/// use std::sync::Arc;
///
/// let client = ApiClient::builder()
///     .config(ClientConfig::from_env()?)
///     .session(Arc::new(MemorySession::with_token("token")))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<DynTransport>,
    session: Option<DynSessionStore>,
    navigator: Option<DynNavigator>,
    notifier: Option<DynNotifier>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: DynTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn session(mut self, session: DynSessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn navigator(mut self, navigator: DynNavigator) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn notifier(mut self, notifier: DynNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate the config and assemble the client.
    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };

        let pipeline = Pipeline {
            cache: Arc::new(ResponseCache::new(self.config.cache_ttl)),
            in_flight: Arc::new(InFlightRegistry::new()),
            metrics: Arc::new(MetricsRecorder::new(
                self.config.metrics_capacity,
                self.config.slow_request_threshold,
            )),
            transport,
            session: self.session.unwrap_or_else(|| Arc::new(MemorySession::new())),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(LogNavigator::new())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            config: self.config,
        };

        Ok(ApiClient {
            pipeline: Arc::new(pipeline),
        })
    }
}
