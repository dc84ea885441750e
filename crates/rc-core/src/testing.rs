//! Scripted [`HttpSender`] for deterministic tests.
//!
//! Replies are queued per URL (query string ignored) and consumed in order.
//! The last reply of a queue is sticky: it keeps being served once everything
//! before it has been consumed, which suits polling endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;

use crate::error::{HttpError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpSender, Method};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Whole body delivered in one chunk
    Body { status: u16, body: Bytes },
    /// Body delivered chunk by chunk with an announced length that may not
    /// match what is actually sent
    Chunks {
        status: u16,
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
        fail_after: bool,
    },
    /// The request times out before any response arrives
    Timeout,
    /// The connection is refused
    Connect,
}

impl ScriptedReply {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::Body {
            status,
            body: Bytes::from(value.to_string()),
        }
    }

    pub fn body(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Body {
            status,
            body: body.into(),
        }
    }

    pub fn chunked(chunks: Vec<Vec<u8>>) -> Self {
        let len = chunks.iter().map(|c| c.len() as u64).sum();
        Self::Chunks {
            status: 200,
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            content_length: Some(len),
            fail_after: false,
        }
    }

    /// Announces `content_length` but ends the stream after `chunks`
    pub fn truncated(chunks: Vec<Vec<u8>>, content_length: u64) -> Self {
        Self::Chunks {
            status: 200,
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            content_length: Some(content_length),
            fail_after: false,
        }
    }

    /// Sends `chunks` and then fails the stream with a transfer error
    pub fn broken(chunks: Vec<Vec<u8>>) -> Self {
        Self::Chunks {
            status: 200,
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            content_length: None,
            fail_after: true,
        }
    }

    fn into_response(self) -> Result<HttpResponse> {
        match self {
            Self::Body { status, body } => Ok(HttpResponse::from_bytes(status, body)),
            Self::Chunks {
                status,
                chunks,
                content_length,
                fail_after,
            } => {
                let mut items: Vec<Result<Bytes>> = chunks.into_iter().map(Ok).collect();
                if fail_after {
                    items.push(Err(HttpError::Transfer("connection reset".to_string())));
                }
                Ok(HttpResponse::new(
                    status,
                    content_length,
                    stream::iter(items).boxed(),
                ))
            }
            Self::Timeout => Err(HttpError::Timeout),
            Self::Connect => Err(HttpError::Connect("connection refused".to_string())),
        }
    }
}

/// A request as seen by the [`ScriptedSender`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl RecordedRequest {
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

#[derive(Debug, Default)]
pub struct ScriptedSender {
    routes: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for requests to `url`
    pub fn on(&self, url: impl Into<String>, reply: ScriptedReply) -> &Self {
        let key = route_key(&url.into());
        self.routes
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Number of requests sent to `url` (query string ignored)
    pub fn calls_to(&self, url: &str) -> usize {
        let key = route_key(url);
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| route_key(&r.url) == key)
            .count()
    }

    fn next_reply(&self, url: &str) -> Option<ScriptedReply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&route_key(url))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl HttpSender for ScriptedSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.log.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        match self.next_reply(&request.url) {
            Some(reply) => reply.into_response(),
            None => Ok(HttpResponse::from_bytes(404, "no scripted reply")),
        }
    }
}

fn route_key(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_are_consumed_in_order_and_last_is_sticky() {
        let sender = ScriptedSender::new();
        sender
            .on("http://x/a", ScriptedReply::Timeout)
            .on("http://x/a", ScriptedReply::body(200, "done"));

        assert!(matches!(
            sender.send(HttpRequest::get("http://x/a")).await,
            Err(HttpError::Timeout)
        ));
        for _ in 0..2 {
            let response = sender.send(HttpRequest::get("http://x/a?q=1")).await.unwrap();
            assert_eq!(response.text().await.unwrap(), "done");
        }
        assert_eq!(sender.calls_to("http://x/a"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_url_is_404() {
        let sender = ScriptedSender::new();
        let response = sender.send(HttpRequest::get("http://x/none")).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_broken_stream_fails_after_chunks() {
        let sender = ScriptedSender::new();
        sender.on("http://x/b", ScriptedReply::broken(vec![vec![1, 2, 3]]));

        let response = sender.send(HttpRequest::get("http://x/b")).await.unwrap();
        let mut stream = response.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 3);
        assert!(matches!(
            stream.next().await,
            Some(Err(HttpError::Transfer(_)))
        ));
    }
}
