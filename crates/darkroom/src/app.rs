use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use darkroom_core::api::{
    ApiCall, ApiClient, HttpTransport, RequestInit, ReqwestTransport, Service, ServiceFactory,
};
use darkroom_core::auth::AuthStore;
use darkroom_core::config::{AppConfig, ConfigEnv};
use darkroom_core::error::{DarkroomError, Result};
use darkroom_core::openapi::HttpMethod;
use darkroom_core::storage::{Appearance, FileStore, StorageHub, APPEARANCE_KEY};
use darkroom_core::ui::{ModalRegistry, ToastQueue, DEFAULT_TOAST_LIFETIME};

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;

    pub use darkroom_core::api::{
        ApiCall, ApiError, ApiResult, CallSnapshot, RequestInit, Service, ServiceFactory,
    };
    pub use darkroom_core::auth::{AccessToken, AuthState, AuthStore, User};
    pub use darkroom_core::config::{AppConfig, MappingTable};
    pub use darkroom_core::error::{DarkroomError, Result};
    pub use darkroom_core::input::{InputRules, InputStatus, ValidatedInput};
    pub use darkroom_core::openapi::HttpMethod;
    pub use darkroom_core::storage::Appearance;
    pub use darkroom_core::ui::{Modal, ModalRegistry, Surface, Toast, ToastId, ToastKind, ToastQueue};

    pub use crate::{Darkroom, DarkroomBuilder};
}

/// The application object.
///
/// Owns the configuration, the API client and the shared UI state. The auth
/// store is installed as the client's session hook, so every response can
/// update or clear the session.
pub struct Darkroom {
    config: Arc<AppConfig>,
    client: ApiClient,
    auth: Arc<AuthStore>,
    storage: StorageHub,
    toasts: ToastQueue,
    modals: ModalRegistry,
    factories: BTreeMap<String, ServiceFactory>,
    origin: Uuid,
}

impl Darkroom {
    pub fn builder() -> DarkroomBuilder {
        DarkroomBuilder::new()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn storage(&self) -> &StorageHub {
        &self.storage
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn modals(&self) -> &ModalRegistry {
        &self.modals
    }

    /// Service factory for a configured schema.
    pub fn factory(&self, schema: &str) -> Result<&ServiceFactory> {
        self.factories
            .get(schema)
            .ok_or_else(|| DarkroomError::InvalidArgument(format!("Unknown schema `{}`", schema)))
    }

    pub fn service<T>(&self, schema: &str, method: HttpMethod, path: &str) -> Result<Service<T>> {
        self.factory(schema)?.create(method, path)
    }

    /// Create a mounted call handle; the first request starts immediately.
    pub fn call<T>(
        &self,
        schema: &str,
        method: HttpMethod,
        path: &str,
        init: RequestInit,
        deps: Vec<Value>,
    ) -> Result<ApiCall<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let service = self.service(schema, method, path)?;
        Ok(ApiCall::mount(service, init, deps))
    }

    pub fn appearance(&self) -> Result<Appearance> {
        Appearance::load(self.storage.store())
    }

    /// Persist the appearance and announce it to other instances.
    pub fn set_appearance(&self, appearance: Appearance) -> Result<()> {
        self.storage
            .set(APPEARANCE_KEY, appearance.as_str(), self.origin)
    }
}

impl std::fmt::Debug for Darkroom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Darkroom")
            .field("backend_url", &self.config.backend_url)
            .field("schemas", &self.factories.keys().collect::<Vec<_>>())
            .field("auth", &self.auth)
            .finish()
    }
}

/// Builder for [`Darkroom`].
///
/// Anything left unset is discovered: configuration from the process
/// environment, storage under the OS data directory, and a reqwest transport.
#[derive(Default)]
pub struct DarkroomBuilder {
    config: Option<AppConfig>,
    env: Option<ConfigEnv>,
    storage: Option<StorageHub>,
    transport: Option<Arc<dyn HttpTransport>>,
    toast_lifetime: Option<Duration>,
}

impl DarkroomBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already loaded configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Discover configuration from explicit environment inputs.
    pub fn env(mut self, env: ConfigEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn storage(mut self, storage: StorageHub) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn toast_lifetime(mut self, lifetime: Duration) -> Self {
        self.toast_lifetime = Some(lifetime);
        self
    }

    pub fn build(self) -> Result<Darkroom> {
        let config = match self.config {
            Some(config) => config,
            None => AppConfig::load_with(&self.env.unwrap_or_else(ConfigEnv::from_process))?,
        };
        let config = Arc::new(config);

        let storage = match self.storage {
            Some(storage) => storage,
            None => StorageHub::new(Arc::new(FileStore::default_location()?)),
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new().map_err(|e| DarkroomError::Internal(e.to_string()))?,
            ),
        };

        let auth = Arc::new(AuthStore::from_config(&config, storage.clone()));
        let client =
            ApiClient::new(config.backend_url.clone(), transport).with_session_hook(auth.clone());

        let factories = config
            .schemas
            .iter()
            .map(|(key, schema)| {
                (
                    key.clone(),
                    ServiceFactory::new(client.clone(), schema.document.clone()),
                )
            })
            .collect();

        tracing::debug!(
            backend = %config.backend_url,
            schemas = config.schemas.len(),
            "Darkroom initialized"
        );

        Ok(Darkroom {
            config,
            client,
            auth,
            storage,
            toasts: ToastQueue::with_lifetime(self.toast_lifetime.unwrap_or(DEFAULT_TOAST_LIFETIME)),
            modals: ModalRegistry::new(),
            factories,
            origin: Uuid::new_v4(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_core::auth::AuthState;
    use darkroom_core::testing::{MockHttp, MockResponse};
    use serde_json::json;
    use tempfile::TempDir;

    const SHARED_YAML: &str = r#"
backend_url: https://api.darkroom.test
frontend_url: https://darkroom.test
auth_key: darkroom-auth
header_keys:
  auth_logout: x-force-logout
scope_name_mapping:
  galleries.read: 1
  galleries.write: 2
user_role_name_mapping:
  user: 1
user_role_scopes:
  user: [galleries.read]
"#;

    const API_JSON: &str = r#"{
        "openapi": "3.1.0",
        "paths": {
            "/galleries/{gallery_id}": {
                "get": {
                    "parameters": [
                        { "name": "gallery_id", "in": "path", "required": true }
                    ]
                }
            },
            "/users/me": { "get": {} }
        }
    }"#;

    fn config_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shared.yaml"), SHARED_YAML).unwrap();
        std::fs::write(
            dir.path().join("frontend.yaml"),
            "openapi_schemas:\n  api: api.json\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("api.json"), API_JSON).unwrap();
        dir
    }

    fn build(dir: &TempDir, mock: &MockHttp) -> Darkroom {
        Darkroom::builder()
            .env(ConfigEnv {
                config_env_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            })
            .storage(StorageHub::in_memory())
            .transport(Arc::new(mock.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_service_requests_go_to_backend() {
        let dir = config_dir();
        let mock = MockHttp::new();
        mock.add_mock_sync("*/galleries/*", |_| MockResponse::json(json!({"name": "Dusk"})));
        let app = build(&dir, &mock);

        let service = app
            .service::<Value>("api", HttpMethod::Get, "/galleries/{gallery_id}")
            .unwrap();
        let result = service
            .request(RequestInit::new().path_param("gallery_id", "g-1"))
            .await;

        assert_eq!(result.data, Some(json!({"name": "Dusk"})));
        let requests = mock.requests();
        assert_eq!(requests[0].url, "https://api.darkroom.test/galleries/g-1");
    }

    #[tokio::test]
    async fn test_unknown_schema() {
        let dir = config_dir();
        let app = build(&dir, &MockHttp::new());
        let err = app
            .service::<Value>("admin", HttpMethod::Get, "/users/me")
            .unwrap_err();
        assert!(matches!(err, DarkroomError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_responses_update_session() {
        let dir = config_dir();
        let mock = MockHttp::new();
        mock.add_mock_sync("*/users/me", |_| {
            MockResponse::json(json!({
                "auth": {
                    "user": { "id": 7, "username": "ansel", "user_role_id": 1 },
                    "scope_ids": [1]
                }
            }))
        });
        mock.add_mock_sync("*/galleries/*", |_| {
            MockResponse::unauthorized("expired").with_header("x-force-logout", "1")
        });
        let app = build(&dir, &mock);

        let me = app.service::<Value>("api", HttpMethod::Get, "/users/me").unwrap();
        me.request(RequestInit::new()).await;
        assert!(app.auth().state().is_authenticated());
        assert!(app.auth().has_scope("galleries.read"));
        assert!(!app.auth().has_scope("galleries.write"));

        let gallery = app
            .service::<Value>("api", HttpMethod::Get, "/galleries/{gallery_id}")
            .unwrap();
        let result = gallery
            .request(RequestInit::new().path_param("gallery_id", "g-1"))
            .await;
        assert_eq!(result.error.and_then(|e| e.status()), Some(401));
        assert_eq!(app.auth().state(), AuthState::default());
    }

    #[tokio::test]
    async fn test_call_handle_loads() {
        let dir = config_dir();
        let mock = MockHttp::new();
        mock.add_mock_sync("*/users/me", |_| MockResponse::json(json!({"username": "ansel"})));
        let app = build(&dir, &mock);

        let call = app
            .call::<Value>("api", HttpMethod::Get, "/users/me", RequestInit::new(), vec![])
            .unwrap();
        let mut rx = call.subscribe();
        rx.wait_for(|s| !s.loading).await.unwrap();
        assert_eq!(call.snapshot().data, Some(json!({"username": "ansel"})));
    }

    #[tokio::test]
    async fn test_appearance_round_trip() {
        let dir = config_dir();
        let app = build(&dir, &MockHttp::new());
        assert_eq!(app.appearance().unwrap(), Appearance::System);
        app.set_appearance(Appearance::Dark).unwrap();
        assert_eq!(app.appearance().unwrap(), Appearance::Dark);
    }
}
