use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
use crate::error::{DarkroomError, Result};

/// Observes every response received by an [`ApiClient`].
///
/// Used to keep client-side session state in step with the backend.
pub trait SessionHook: Send + Sync {
    fn on_response(&self, headers: &BTreeMap<String, String>, body: Option<&Value>);
}

/// Backend client: base URL, transport and an optional session hook.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    default_headers: BTreeMap<String, String>,
    session_hook: Option<Arc<dyn SessionHook>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            default_headers: BTreeMap::new(),
            session_hook: None,
        }
    }

    /// Client over a default [`ReqwestTransport`].
    pub fn with_reqwest(base_url: impl Into<String>) -> Result<Self> {
        let transport = ReqwestTransport::new().map_err(|e| DarkroomError::Internal(e.0))?;
        Ok(Self::new(base_url, Arc::new(transport)))
    }

    /// Add a header sent with every request. Per-request headers win.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session_hook = Some(hook);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and run the session hook on whatever comes back.
    ///
    /// The hook runs as soon as the response arrives, before any caller
    /// decides whether the result is still wanted. A stale response that
    /// embeds a session is applied like any other.
    pub async fn execute(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.send(request, true).await
    }

    /// Send a request without running the session hook.
    pub async fn execute_without_session_hook(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.send(request, false).await
    }

    pub(crate) async fn send(
        &self,
        mut request: HttpRequest,
        apply_session: bool,
    ) -> std::result::Result<HttpResponse, TransportError> {
        for (name, value) in &self.default_headers {
            let present = request
                .headers
                .keys()
                .any(|existing| existing.eq_ignore_ascii_case(name));
            if !present {
                request.headers.insert(name.clone(), value.clone());
            }
        }

        let method = request.method;
        let url = request.url.clone();
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(%method, %url, error = %e, "API request failed");
                return Err(e);
            }
        };
        tracing::debug!(%method, %url, status = response.status, "API request completed");

        if let Some(hook) = self.session_hook.as_ref().filter(|_| apply_session) {
            let body = response.json();
            hook.on_response(&response.headers, body.as_ref());
        }

        Ok(response)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("session_hook", &self.session_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::HttpMethod;
    use crate::testing::{MockHttp, MockResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(BTreeMap<String, String>, Option<Value>)>>,
    }

    impl SessionHook for Recorder {
        fn on_response(&self, headers: &BTreeMap<String, String>, body: Option<&Value>) {
            self.seen
                .lock()
                .unwrap()
                .push((headers.clone(), body.cloned()));
        }
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/", Arc::new(MockHttp::new()));
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[tokio::test]
    async fn test_default_headers_do_not_override_request() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |_| MockResponse::ok());
        let client = ApiClient::new("http://api.test", Arc::new(mock.clone()))
            .with_header("X-Client", "darkroom")
            .with_header("Accept", "application/json");

        let mut request = get("http://api.test/users/me");
        request
            .headers
            .insert("accept".to_string(), "text/plain".to_string());
        client.execute(request).await.unwrap();

        let recorded = mock.requests();
        assert_eq!(recorded[0].headers["x-client"], "darkroom");
        assert_eq!(recorded[0].headers["accept"], "text/plain");
    }

    #[tokio::test]
    async fn test_session_hook_sees_every_response() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*/ok", |_| MockResponse::json(serde_json::json!({ "id": 1 })));
        mock.add_mock_sync("*/gone", |_| {
            MockResponse::unauthorized("expired").with_header("x-auth-logout", "1")
        });
        let recorder = Arc::new(Recorder::default());
        let client =
            ApiClient::new("http://api.test", Arc::new(mock)).with_session_hook(recorder.clone());

        client.execute(get("http://api.test/ok")).await.unwrap();
        client.execute(get("http://api.test/gone")).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.as_ref().unwrap()["id"], 1);
        assert!(seen[1].0.contains_key("x-auth-logout"));
    }

    #[tokio::test]
    async fn test_session_hook_skipped_on_request() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*/ok", |_| MockResponse::json(serde_json::json!({ "id": 1 })));
        let recorder = Arc::new(Recorder::default());
        let client =
            ApiClient::new("http://api.test", Arc::new(mock)).with_session_hook(recorder.clone());

        client
            .execute_without_session_hook(get("http://api.test/ok"))
            .await
            .unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());

        client.execute(get("http://api.test/ok")).await.unwrap();
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }
}
