use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::ApiClient;
use super::transport::HttpRequest;
use crate::error::Result;
use crate::openapi::{HttpMethod, OpenApiDocument, ParameterLocation, ParameterSchema};

/// Why a call produced no data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status.
    #[error("Request failed with status {status}")]
    Status { status: u16, body: Value },

    /// No response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body did not match the expected type.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message, preferring the backend's `detail` field.
    pub fn message(&self) -> String {
        if let Self::Status { body, .. } = self {
            match body.get("detail") {
                Some(Value::String(detail)) => return detail.clone(),
                Some(Value::Array(items)) => {
                    let messages: Vec<&str> = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(Value::as_str))
                        .collect();
                    if !messages.is_empty() {
                        return messages.join("; ");
                    }
                }
                _ => {}
            }
            if let Some(error) = body.get("error").and_then(Value::as_str) {
                return error.to_string();
            }
        }
        self.to_string()
    }
}

/// Status line and headers of a received response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of one call. Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    /// `None` when no response was received.
    pub response: Option<ResponseMeta>,
}

impl<T> ApiResult<T> {
    fn success(data: T, response: ResponseMeta) -> Self {
        Self {
            data: Some(data),
            error: None,
            response: Some(response),
        }
    }

    fn failure(error: ApiError, response: Option<ResponseMeta>) -> Self {
        Self {
            data: None,
            error: Some(error),
            response,
        }
    }

    /// True when a 2xx response was received.
    pub fn ok(&self) -> bool {
        self.response.as_ref().map(ResponseMeta::ok).unwrap_or(false)
    }

    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(ApiError::Decode("Response carried no data".to_string())),
        }
    }
}

/// Per-call parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    /// Values for `{name}` placeholders in the path template.
    pub path: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Do not let this response update or clear the session.
    pub skip_session_hook: bool,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path.insert(name.into(), value.to_string());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Keep the session hook away from this response, e.g. for background
    /// refreshes whose result may arrive after a newer sign-out.
    pub fn without_session_hook(mut self) -> Self {
        self.skip_session_hook = true;
        self
    }
}

/// Builds typed [`Service`] handles for operations of an OpenAPI document.
#[derive(Debug, Clone)]
pub struct ServiceFactory {
    client: ApiClient,
    document: Arc<OpenApiDocument>,
}

impl ServiceFactory {
    pub fn new(client: ApiClient, document: impl Into<Arc<OpenApiDocument>>) -> Self {
        Self {
            client,
            document: document.into(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn document(&self) -> &OpenApiDocument {
        &self.document
    }

    /// Create a handle for `method path`, decoding successful bodies as `T`.
    ///
    /// Fails when the document does not define the operation.
    pub fn create<T>(&self, method: HttpMethod, path: &str) -> Result<Service<T>> {
        let mut parameters: HashMap<ParameterLocation, BTreeMap<String, ParameterSchema>> =
            HashMap::new();
        for parameter in self.document.parameters(method, path)? {
            parameters
                .entry(parameter.location)
                .or_default()
                .insert(parameter.name, parameter.schema);
        }

        tracing::debug!(%method, path, "Created service");
        Ok(Service {
            method,
            path: path.to_string(),
            parameters,
            client: self.client.clone(),
            _marker: PhantomData,
        })
    }
}

/// A callable backend operation.
pub struct Service<T = Value> {
    method: HttpMethod,
    path: String,
    parameters: HashMap<ParameterLocation, BTreeMap<String, ParameterSchema>>,
    client: ApiClient,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Service<T> {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Path template, e.g. `/galleries/{gallery_id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared parameters at `location`, keyed by name.
    pub fn parameters(&self, location: ParameterLocation) -> Option<&BTreeMap<String, ParameterSchema>> {
        self.parameters.get(&location)
    }

    /// Build the full URL for `init`.
    pub fn url(&self, init: &RequestInit) -> std::result::Result<String, ApiError> {
        let mut url = Url::parse(self.client.base_url())
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL: {}", e)))?;

        let mut segments = Vec::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            segments.push(fill_segment(segment, &init.path)?);
        }
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidRequest(format!(
                    "Base URL cannot carry a path: {}",
                    self.client.base_url()
                ))
            })?
            .pop_if_empty()
            .extend(segments);

        if !init.query.is_empty() {
            url.query_pairs_mut().extend_pairs(init.query.iter());
        }
        Ok(url.into())
    }
}

impl<T: DeserializeOwned> Service<T> {
    /// Issue the call. Never retries and never panics on backend errors.
    pub async fn request(&self, init: RequestInit) -> ApiResult<T> {
        let url = match self.url(&init) {
            Ok(url) => url,
            Err(e) => return ApiResult::failure(e, None),
        };

        let apply_session = !init.skip_session_hook;
        let request = HttpRequest {
            method: self.method,
            url: url.clone(),
            headers: init.headers,
            body: init.body,
        };
        let response = match self.client.send(request, apply_session).await {
            Ok(response) => response,
            Err(e) => return ApiResult::failure(ApiError::Transport(e.0), None),
        };

        let meta = ResponseMeta {
            status: response.status,
            url,
            headers: response.headers.clone(),
        };

        if !response.is_success() {
            let body = response.json().unwrap_or_else(|| {
                if response.body.is_empty() {
                    Value::Null
                } else {
                    Value::String(String::from_utf8_lossy(&response.body).into_owned())
                }
            });
            return ApiResult::failure(
                ApiError::Status {
                    status: response.status,
                    body,
                },
                Some(meta),
            );
        }

        let value = if response.body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => value,
                Err(e) => return ApiResult::failure(ApiError::Decode(e.to_string()), Some(meta)),
            }
        };

        match serde_json::from_value::<T>(value) {
            Ok(data) => ApiResult::success(data, meta),
            Err(e) => ApiResult::failure(ApiError::Decode(e.to_string()), Some(meta)),
        }
    }
}

impl<T> Clone for Service<T> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            path: self.path.clone(),
            parameters: self.parameters.clone(),
            client: self.client.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Service<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Substitute every `{name}` placeholder in one path segment.
fn fill_segment(
    segment: &str,
    params: &BTreeMap<String, String>,
) -> std::result::Result<String, ApiError> {
    let mut filled = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        filled.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            ApiError::InvalidRequest(format!("Unterminated placeholder in path segment: {}", segment))
        })?;
        let name = &after[..end];
        let value = params
            .get(name)
            .ok_or_else(|| ApiError::InvalidRequest(format!("Missing path parameter: {}", name)))?;
        filled.push_str(value);
        rest = &after[end + 1..];
    }
    filled.push_str(rest);
    Ok(filled)
}
