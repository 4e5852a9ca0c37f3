//! HTTP mocking for service and call tests.
//!
//! [`MockHttp`] implements [`HttpTransport`], answering from registered
//! handlers matched by URL or path pattern and recording every request for
//! later verification.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use crate::api::{HttpRequest, HttpResponse, HttpTransport, TransportError, TransportFuture};

/// Mock transport for tests.
///
/// # Example
///
/// ```ignore
/// let mock = MockHttp::new();
/// mock.add_mock_sync("*/galleries*", |_| MockResponse::json(json!([])));
///
/// let client = ApiClient::new("http://api.test", Arc::new(mock.clone()));
/// // ... issue calls ...
/// mock.assert_called_times("*/galleries*", 1);
/// ```
#[derive(Clone, Default)]
pub struct MockHttp {
    mocks: Arc<RwLock<Vec<MockHandler>>>,
    requests: Arc<RwLock<Vec<MockRequest>>>,
}

/// Boxed handler closure.
pub type BoxedHandler = Box<dyn Fn(&MockRequest) -> MockResponse + Send + Sync>;

struct MockHandler {
    pattern: String,
    handler: Arc<dyn Fn(&MockRequest) -> MockResponse + Send + Sync>,
}

/// A request as seen by a handler.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// Uppercase method name.
    pub method: String,
    pub url: String,
    pub path: String,
    /// Decoded query pairs; the last value wins on repeats.
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// JSON body, `Null` when absent.
    pub body: Value,
}

impl MockRequest {
    fn from_http(request: HttpRequest) -> Self {
        let (path, query) = match Url::parse(&request.url) {
            Ok(url) => (
                url.path().to_string(),
                url.query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
            ),
            Err(_) => (request.url.clone(), BTreeMap::new()),
        };
        Self {
            method: request.method.to_string(),
            url: request.url,
            path,
            query,
            headers: request
                .headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            body: request.body.unwrap_or(Value::Null),
        }
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON body; `Null` sends an empty body.
    pub body: Value,
    /// Time to wait before answering.
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// A 200 JSON response.
    pub fn json<T: Serialize>(body: T) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: serde_json::to_value(body).unwrap_or(Value::Null),
            delay: None,
        }
    }

    /// An error response with `{"error": message}`.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(serde_json::json!({ "error": message })).with_status(status)
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(404, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::error(401, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::error(500, message)
    }

    /// A response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Value::Null,
            delay: None,
        }
    }

    /// An empty JSON object with status 200.
    pub fn ok() -> Self {
        Self::json(serde_json::json!({}))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn into_http(self) -> HttpResponse {
        let body = match &self.body {
            Value::Null => Vec::new(),
            other => serde_json::to_vec(other).unwrap_or_default(),
        };
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MockHttpBuilder {
        MockHttpBuilder::new()
    }

    /// Register a handler. Handlers are tried in registration order.
    pub fn add_mock_sync<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.push(pattern, Arc::new(handler));
    }

    pub fn add_mock_boxed(&self, pattern: &str, handler: BoxedHandler) {
        self.push(pattern, Arc::from(handler));
    }

    fn push(&self, pattern: &str, handler: Arc<dyn Fn(&MockRequest) -> MockResponse + Send + Sync>) {
        self.mocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockHandler {
                pattern: pattern.to_string(),
                handler,
            });
    }

    /// Answer one request.
    pub async fn execute(&self, request: MockRequest) -> MockResponse {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let handler = {
            let mocks = self.mocks.read().unwrap_or_else(PoisonError::into_inner);
            mocks
                .iter()
                .find(|m| {
                    matches_pattern(&request.url, &m.pattern)
                        || matches_pattern(&request.path, &m.pattern)
                })
                .map(|m| m.handler.clone())
        };

        let response = match handler {
            Some(handler) => handler(&request),
            None => MockResponse::error(500, &format!("No mock found for {}", request.url)),
        };
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    /// All recorded requests in arrival order.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests_to(&self, pattern: &str) -> Vec<MockRequest> {
        self.requests()
            .into_iter()
            .filter(|r| matches_pattern(&r.url, pattern))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn clear_mocks(&self) {
        self.mocks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn assert_called(&self, pattern: &str) {
        let requests = self.requests();
        assert!(
            !self.requests_to(pattern).is_empty(),
            "Expected HTTP call matching '{}', but none found. Recorded requests: {:?}",
            pattern,
            requests.iter().map(|r| &r.url).collect::<Vec<_>>()
        );
    }

    pub fn assert_called_times(&self, pattern: &str, expected: usize) {
        let matching = self.requests_to(pattern).len();
        assert_eq!(
            matching, expected,
            "Expected {} HTTP calls matching '{}', but found {}",
            expected, pattern, matching
        );
    }

    pub fn assert_not_called(&self, pattern: &str) {
        self.assert_called_times(pattern, 0);
    }

    pub fn assert_called_with_body<F>(&self, pattern: &str, predicate: F)
    where
        F: Fn(&Value) -> bool,
    {
        assert!(
            self.requests_to(pattern).iter().any(|r| predicate(&r.body)),
            "Expected HTTP call matching '{}' with matching body, but none found",
            pattern
        );
    }
}

impl HttpTransport for MockHttp {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        let request = MockRequest::from_http(request);
        Box::pin(async move { Ok::<_, TransportError>(self.execute(request).await.into_http()) })
    }
}

/// Glob-style match where `*` spans any run of characters.
fn matches_pattern(url: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return url == pattern;
    }

    let mut remaining = url;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remaining.strip_prefix(part) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            if !remaining.ends_with(part) {
                return false;
            }
        } else {
            match remaining.find(part) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Builder for [`MockHttp`].
#[derive(Default)]
pub struct MockHttpBuilder {
    mocks: Vec<(String, BoxedHandler)>,
}

impl MockHttpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mock<F>(mut self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.mocks.push((pattern.to_string(), Box::new(handler)));
        self
    }

    /// Always answer `pattern` with `response` as JSON.
    pub fn mock_json<T: Serialize + Clone + Send + Sync + 'static>(
        self,
        pattern: &str,
        response: T,
    ) -> Self {
        self.mock(pattern, move |_| MockResponse::json(response.clone()))
    }

    pub fn build(self) -> MockHttp {
        let mock = MockHttp::new();
        for (pattern, handler) in self.mocks {
            mock.add_mock_boxed(&pattern, handler);
        }
        mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::HttpMethod;

    fn request(method: HttpMethod, url: &str, body: Option<Value>) -> HttpRequest {
        HttpRequest {
            method,
            url: url.to_string(),
            headers: BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
            body,
        }
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("http://api.test/users", "http://api.test/users"));
        assert!(matches_pattern("http://api.test/users/1", "http://api.test/*"));
        assert!(matches_pattern("http://api.test/v2/users", "http://api.test/*/users"));
        assert!(!matches_pattern("http://other.test/users", "http://api.test/*"));
    }

    #[tokio::test]
    async fn test_send_records_and_answers() {
        let mock = MockHttp::new();
        mock.add_mock_sync("/galleries", |req| {
            MockResponse::json(serde_json::json!({ "limit": req.query["limit"] }))
        });

        let response = mock
            .send(request(
                HttpMethod::Post,
                "http://api.test/galleries?limit=5",
                Some(serde_json::json!({ "title": "Dunes" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()["limit"], "5");

        let recorded = mock.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].path, "/galleries");
        assert_eq!(recorded[0].headers["authorization"], "Bearer t");
        assert_eq!(recorded[0].body["title"], "Dunes");
        mock.assert_called_with_body("*/galleries*", |b| b["title"] == "Dunes");
    }

    #[tokio::test]
    async fn test_unmatched_request_is_500() {
        let mock = MockHttp::builder()
            .mock_json("http://api.test/users/*", serde_json::json!({ "id": 1 }))
            .build();
        let response = mock
            .send(request(HttpMethod::Get, "http://api.test/albums", None))
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        mock.assert_not_called("http://api.test/users/*");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |_| MockResponse::empty(204).with_delay(Duration::from_secs(3)));

        let started = tokio::time::Instant::now();
        let response = mock
            .send(request(HttpMethod::Delete, "http://api.test/x", None))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
