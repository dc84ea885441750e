use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{HttpError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpSender, Method};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Default whole-request timeout for calls that set one explicitly
    pub request_timeout: Duration,
    /// Maximum silence between two body chunks
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            user_agent: "rauncher-mc".to_string(),
        }
    }
}

/// [`HttpSender`] backed by a pooled `reqwest` client.
///
/// No whole-request timeout is set on the client itself, since a multi-hundred
/// megabyte client jar would trip it; downloads rely on the read timeout
/// instead, and small API calls pass an explicit per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    http: Client,
}

impl ReqwestSender {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| HttpError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    pub fn from_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl HttpSender for ReqwestSender {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(status, ?content_length, "Received response headers");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed();

        Ok(HttpResponse::new(status, content_length, body))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout
    } else if e.is_connect() {
        HttpError::Connect(e.to_string())
    } else if e.is_builder() {
        HttpError::InvalidRequest(e.to_string())
    } else {
        HttpError::Transfer(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender() -> ReqwestSender {
        ReqwestSender::new(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_get_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let response = sender()
            .send(HttpRequest::get(format!("{}/file.bin", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.content_length(), Some(4096));
        let body = response.bytes().await.unwrap();
        assert_eq!(body.len(), 4096);
        assert!(body.iter().all(|b| *b == 7));
    }

    #[tokio::test]
    async fn test_post_forwards_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let response = sender()
            .send(
                HttpRequest::post(format!("{}/token", server.uri()))
                    .form(&[("grant_type", "refresh_token")]),
            )
            .await
            .unwrap();

        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = sender()
            .send(HttpRequest::get(format!("{}/missing", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_request_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = sender()
            .send(
                HttpRequest::get(format!("{}/slow", server.uri()))
                    .timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Timeout));
        assert!(err.is_transient());
    }
}
