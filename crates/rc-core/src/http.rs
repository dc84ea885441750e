use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{HttpError, Result};

/// Response bodies are consumed as a stream of chunks so large downloads never
/// have to sit in memory.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Transport used by every outbound call.
///
/// Implementations must be safe to share across concurrent download workers.
#[async_trait::async_trait]
pub trait HttpSender: Send + Sync {
    /// Send a request and return as soon as the status line is available.
    ///
    /// A non-2xx status is *not* an error at this level; callers inspect
    /// [`HttpResponse::status`] because several endpoints carry meaning in
    /// their error bodies.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Outbound request description
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Overrides the sender's default request timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Encode `value` as the JSON request body
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(HttpError::Encode)?;
        let mut request = self
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        request.body = Some(Bytes::from(body));
        Ok(request)
    }

    /// Encode `pairs` as an `application/x-www-form-urlencoded` body
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self = self.header("Content-Type", "application/x-www-form-urlencoded");
        self.body = Some(Bytes::from(encoded));
        self
    }

    /// Value of the first header named `name` (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Bodies and headers may carry credentials, so only the request line is shown.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.as_ref().map(|b| b.len()))
            .finish_non_exhaustive()
    }
}

/// Response with a streaming body
pub struct HttpResponse {
    status: u16,
    content_length: Option<u64>,
    body: BodyStream,
}

impl HttpResponse {
    pub fn new(status: u16, content_length: Option<u64>, body: BodyStream) -> Self {
        Self {
            status,
            content_length,
            body,
        }
    }

    /// Build a response around an in-memory body
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let len = body.len() as u64;
        Self::new(status, Some(len), stream::once(async move { Ok(body) }).boxed())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn into_stream(self) -> BodyStream {
        self.body
    }

    /// Collect the whole body
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub async fn text(self) -> Result<String> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(HttpError::Decode)
    }

    /// Turn a non-2xx response into [`HttpError::Status`], keeping the first
    /// 200 characters of the body for diagnostics.
    pub async fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let body = self.text().await.unwrap_or_default();
        Err(HttpError::Status {
            status,
            body_snippet: body.chars().take(200).collect(),
        })
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
