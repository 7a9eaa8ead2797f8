//! Transport core: the HTTP client underneath the pipeline.
//!
//! Provides:
//! - The [`Transport`] trait the pipeline dispatches through
//! - [`ReqwestTransport`], the production implementation
//! - Multipart upload bodies with progress reporting
//!
//! A transport returns every HTTP response it receives, whatever the status.
//! Classifying statuses is left to the pipeline.

use crate::config::{ClientConfig, NetworkConfig};
use crate::error::{RequestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Callback receiving upload progress as an integer percentage (0-100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// A file to send as the `file` field of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing the content type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RequestError::io_with_path(e, path))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        Ok(Self::new(file_name, content_type, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Body of an outgoing request.
#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart {
        file: UploadFile,
        progress: Option<ProgressCallback>,
    },
}

impl RequestBody {
    /// Value identifying the body for fingerprinting.
    pub fn identity(&self) -> Option<Value> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(value) => Some(value.clone()),
            RequestBody::Multipart { file, .. } => Some(serde_json::json!({
                "file": file.file_name,
                "contentType": file.content_type,
                "size": file.len(),
            })),
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart { .. })
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Multipart { file, progress } => f
                .debug_struct("Multipart")
                .field("file_name", &file.file_name)
                .field("size", &file.len())
                .field("progress", &progress.is_some())
                .finish(),
        }
    }
}

/// A fully prepared request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Deadline for this attempt, overriding the client default.
    pub timeout: Duration,
}

/// Status and body of a received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }
}

/// Failures below the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    /// Connectivity failure; the request may succeed if resent.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

/// Sends prepared requests over the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> std::result::Result<RawResponse, TransportError>;
}

pub type DynTransport = Arc<dyn Transport>;

/// Turns byte counts into percentage callbacks.
///
/// Each distinct percentage is delivered once, and [`finish`](Self::finish)
/// guarantees 100 is delivered even when no bytes were counted.
pub struct ProgressReporter {
    total: u64,
    sent: AtomicU64,
    last: AtomicU8,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    const NONE_EMITTED: u8 = u8::MAX;

    pub fn new(total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            sent: AtomicU64::new(0),
            last: AtomicU8::new(Self::NONE_EMITTED),
            callback,
        }
    }

    /// Count `bytes` more as sent.
    pub fn advance(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let percent = if self.total == 0 {
            100
        } else {
            ((sent as f64 * 100.0) / self.total as f64).round().min(100.0) as u8
        };
        self.emit(percent);
    }

    /// Mark the transfer complete.
    pub fn finish(&self) {
        self.emit(100);
    }

    fn emit(&self, percent: u8) {
        let Some(callback) = &self.callback else {
            return;
        };
        if self.last.swap(percent, Ordering::SeqCst) != percent {
            callback(percent);
        }
    }
}

/// Production transport built on reqwest.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| RequestError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> std::result::Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let reporter = match request.body {
            RequestBody::Empty => None,
            RequestBody::Json(value) => {
                builder = builder.json(&value);
                None
            }
            RequestBody::Multipart { file, progress } => {
                let reporter = Arc::new(ProgressReporter::new(file.len() as u64, progress));
                builder = builder.multipart(multipart_form(file, reporter.clone())?);
                Some(reporter)
            }
        };

        let response = builder.send().await.map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_error)?;

        if let Some(reporter) = reporter {
            reporter.finish();
        }

        Ok(RawResponse { status, body })
    }
}

/// Build a multipart form whose file part streams in chunks through `reporter`.
fn multipart_form(
    file: UploadFile,
    reporter: Arc<ProgressReporter>,
) -> std::result::Result<Form, TransportError> {
    let total = file.len() as u64;
    let chunks = split_chunks(file.bytes, NetworkConfig::UPLOAD_CHUNK_SIZE);
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        reporter.advance(chunk.len() as u64);
        Ok::<Bytes, std::io::Error>(chunk)
    }));

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
        .file_name(file.file_name)
        .mime_str(&file.content_type)
        .map_err(|e| TransportError::Other(format!("invalid content type: {}", e)))?;

    Ok(Form::new().part("file", part))
}

fn split_chunks(mut bytes: Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len() / chunk_size.max(1) + 1);
    while !bytes.is_empty() {
        let n = chunk_size.max(1).min(bytes.len());
        chunks.push(bytes.split_to(n));
    }
    chunks
}

fn classify_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_body() || (err.is_request() && !err.is_builder()) {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Flatten a JSON object into query pairs.
///
/// Strings are used verbatim, arrays become repeated keys, `null` is skipped
/// and nested objects are sent as compact JSON. Non-object params yield no pairs.
pub fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            push_pair(key, value, &mut pairs);
        }
    }
    pairs
}

fn push_pair(key: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::String(s) => pairs.push((key.to_string(), s.clone())),
        Value::Array(items) => {
            for item in items {
                push_pair(key, item, pairs);
            }
        }
        other => pairs.push((key.to_string(), other.to_string())),
    }
}
