//! HTTP transport for the Slack Web API
//!
//! The transport performs exactly one request per call and reports failures
//! as [`RawFailure`]; retry decisions live in the client.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use super::types::SlackError;

pub const SLACK_API_BASE: &str = "https://slack.com/api";
const USER_AGENT: &str = concat!("slack-archiver/", env!("CARGO_PKG_VERSION"));

/// A failed request, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// Connection reset, timeout, truncated body and friends.
    Network { message: String },
    /// Non-2xx HTTP status.
    Http {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },
    /// HTTP 200 with `"ok": false`.
    Api {
        code: String,
        retry_after: Option<Duration>,
    },
}

impl std::fmt::Display for RawFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawFailure::Network { message } => write!(f, "network error: {}", message),
            RawFailure::Http { status, body, .. } => write!(f, "HTTP {}: {}", status, body),
            RawFailure::Api { code, .. } => write!(f, "{}", code),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Call a Web API method and return the JSON body of a successful response.
    async fn get(&self, method: &str, params: &[(&str, String)]) -> Result<Value, RawFailure>;

    /// Fetch an authenticated file URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RawFailure>;
}

pub struct HttpTransport {
    http: Client,
    token: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(token: String, timeout: Duration) -> Result<Self, SlackError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SlackError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token,
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    /// Point the transport at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn network(err: reqwest::Error) -> RawFailure {
    RawFailure::Network {
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, method: &str, params: &[(&str, String)]) -> Result<Value, RawFailure> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        let retry_after = retry_after(&response);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RawFailure::Http {
                status: status.as_u16(),
                retry_after,
                body,
            });
        }

        let json: Value = response.json().await.map_err(network)?;

        if !json["ok"].as_bool().unwrap_or(false) {
            return Err(RawFailure::Api {
                code: json["error"].as_str().unwrap_or("unknown_error").to_string(),
                retry_after,
            });
        }

        Ok(json)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RawFailure> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RawFailure::Http {
                status: status.as_u16(),
                retry_after: retry_after(&response),
                body: String::new(),
            });
        }

        let bytes = response.bytes().await.map_err(network)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new("xoxp-test".into(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_get_success_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(header("authorization", "Bearer xoxp-test"))
            .and(query_param("types", "im"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{ "id": "D1" }]
            })))
            .mount(&server)
            .await;

        let body = transport(&server)
            .get("conversations.list", &[("types", "im".to_string())])
            .await
            .unwrap();

        assert_eq!(body["channels"][0]["id"], "D1");
    }

    #[tokio::test]
    async fn test_get_ok_false_is_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "channel_not_found"
            })))
            .mount(&server)
            .await;

        let err = transport(&server)
            .get("conversations.history", &[])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RawFailure::Api {
                code: "channel_not_found".into(),
                retry_after: None
            }
        );
    }

    #[tokio::test]
    async fn test_get_429_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = transport(&server).get("users.list", &[]).await.unwrap_err();

        match err {
            RawFailure::Http {
                status,
                retry_after,
                ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected HTTP failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = transport(&server).get("users.info", &[]).await.unwrap_err();
        assert!(matches!(err, RawFailure::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_get_invalid_json_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\": tr"))
            .mount(&server)
            .await;

        let err = transport(&server).get("auth.test", &[]).await.unwrap_err();
        assert!(matches!(err, RawFailure::Network { .. }));
    }

    #[tokio::test]
    async fn test_download_returns_bytes_and_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/F1/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let bytes = transport
            .download(&format!("{}/files/F1/report.pdf", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let err = transport
            .download(&format!("{}/files/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RawFailure::Http { status: 404, .. }));
    }
}
