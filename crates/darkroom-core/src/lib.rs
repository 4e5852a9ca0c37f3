pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod input;
pub mod openapi;
pub mod storage;
pub mod ui;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{
    ApiCall, ApiClient, ApiError, ApiResult, CallSnapshot, HttpTransport, RequestInit,
    ReqwestTransport, Service, ServiceFactory, SessionHook,
};
pub use auth::{AccessToken, AuthState, AuthStore, User};
pub use config::{AppConfig, ConfigEnv, ConfigPaths, MappingTable};
pub use error::{DarkroomError, Result};
pub use input::{InputRules, InputState, InputStatus, InputValue, ValidatedInput};
pub use openapi::{HttpMethod, OpenApiDocument, ParameterLocation, ParameterSchema};
pub use storage::{Appearance, FileStore, KeyValueStore, MemoryStore, StorageHub};
pub use ui::{Modal, ModalRegistry, Surface, Toast, ToastId, ToastKind, ToastQueue};
