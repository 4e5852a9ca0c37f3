mod mapping;
mod paths;

pub use mapping::{invert, MappingTable};
pub use paths::{
    ConfigEnv, ConfigPaths, APP_DIR_NAME, APP_ENV, CONFIG_ENV_DIR, FRONTEND_CONFIG_PATH,
    FRONTEND_EXAMPLE, SHARED_CONFIG_PATH,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DarkroomError, Result};
use crate::openapi::OpenApiDocument;

/// Shared configuration document, provisioned alongside the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Backend API base URL.
    pub backend_url: String,

    /// Public URL of the frontend.
    pub frontend_url: String,

    /// Storage key under which the auth session is persisted.
    #[serde(default = "default_auth_key")]
    pub auth_key: String,

    /// Reserved header names.
    #[serde(default)]
    pub header_keys: HeaderKeys,

    /// Route name -> path.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    #[serde(default)]
    pub scope_name_mapping: BTreeMap<String, u32>,

    #[serde(default)]
    pub visibility_level_name_mapping: BTreeMap<String, u32>,

    #[serde(default)]
    pub permission_level_name_mapping: BTreeMap<String, u32>,

    #[serde(default)]
    pub user_role_name_mapping: BTreeMap<String, u32>,

    /// Role name -> scope names granted to that role.
    #[serde(default)]
    pub user_role_scopes: BTreeMap<String, Vec<String>>,

    /// Number of digits in a one-time password.
    #[serde(default = "default_otp_length")]
    pub otp_length: usize,

    /// Google OAuth client id.
    #[serde(default)]
    pub google_client_id: Option<String>,
}

fn default_auth_key() -> String {
    "auth".to_string()
}

fn default_otp_length() -> usize {
    6
}

/// Reserved response header names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderKeys {
    /// Presence of this header on a response forces a logout.
    #[serde(default = "default_auth_logout_header")]
    pub auth_logout: String,
}

impl Default for HeaderKeys {
    fn default() -> Self {
        Self {
            auth_logout: default_auth_logout_header(),
        }
    }
}

fn default_auth_logout_header() -> String {
    "x-auth-logout".to_string()
}

/// Frontend configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Development server settings.
    #[serde(default)]
    pub dev_server: DevServerConfig,

    /// Logical schema key -> OpenAPI JSON document path.
    #[serde(default)]
    pub openapi_schemas: BTreeMap<String, PathBuf>,
}

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_dev_host")]
    pub host: String,

    #[serde(default = "default_dev_port")]
    pub port: u16,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: default_dev_host(),
            port: default_dev_port(),
        }
    }
}

fn default_dev_host() -> String {
    "localhost".to_string()
}

fn default_dev_port() -> u16 {
    5173
}

/// An OpenAPI document listed in the frontend config.
#[derive(Debug, Clone)]
pub struct LoadedSchema {
    pub key: String,
    pub path: PathBuf,
    pub document: OpenApiDocument,
}

/// Fully resolved application configuration.
///
/// Built once at startup and shared by reference; nothing mutates it
/// afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    pub frontend_url: String,
    pub auth_key: String,
    pub auth_logout_header: String,
    pub routes: BTreeMap<String, String>,
    pub scopes: MappingTable,
    pub visibility_levels: MappingTable,
    pub permission_levels: MappingTable,
    pub user_roles: MappingTable,
    pub role_scopes: BTreeMap<String, Vec<String>>,
    pub otp_length: usize,
    pub google_client_id: Option<String>,
    pub dev_server: DevServerConfig,
    pub schemas: BTreeMap<String, LoadedSchema>,
    /// Where the documents came from, when loaded from disk.
    pub paths: Option<ConfigPaths>,
}

impl AppConfig {
    /// Discover and load configuration using the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(&ConfigEnv::from_process())
    }

    /// Discover and load configuration using explicit environment inputs.
    pub fn load_with(env: &ConfigEnv) -> Result<Self> {
        let paths = ConfigPaths::resolve(env)?;
        Self::from_paths(paths)
    }

    /// Load both documents from resolved paths.
    pub fn from_paths(paths: ConfigPaths) -> Result<Self> {
        let shared: SharedConfig = parse_yaml(&read_document(&paths.shared)?)?;
        let frontend: FrontendConfig = parse_yaml(&read_document(&paths.frontend)?)?;
        let schema_base = paths
            .frontend
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut config = Self::from_documents(shared, frontend, &schema_base)?;
        config.paths = Some(paths);
        Ok(config)
    }

    /// Build the configuration from parsed documents.
    ///
    /// Relative schema paths are resolved against `schema_base`.
    pub fn from_documents(
        shared: SharedConfig,
        frontend: FrontendConfig,
        schema_base: &Path,
    ) -> Result<Self> {
        if shared.otp_length == 0 {
            return Err(DarkroomError::Config(
                "otp_length must be greater than zero".to_string(),
            ));
        }

        if crate::storage::validate_key(&shared.auth_key).is_err() {
            return Err(DarkroomError::Config(format!(
                "auth_key `{}` is not a valid storage key (use letters, digits, `-`, `_` or `.`)",
                shared.auth_key
            )));
        }

        let scopes = MappingTable::new("scope", shared.scope_name_mapping)?;
        let visibility_levels =
            MappingTable::new("visibility level", shared.visibility_level_name_mapping)?;
        let permission_levels =
            MappingTable::new("permission level", shared.permission_level_name_mapping)?;
        let user_roles = MappingTable::new("user role", shared.user_role_name_mapping)?;

        for (role, scope_names) in &shared.user_role_scopes {
            if user_roles.id(role).is_none() {
                return Err(DarkroomError::Config(format!(
                    "user_role_scopes references unknown role `{}`",
                    role
                )));
            }
            if let Some(unknown) = scope_names.iter().find(|s| scopes.id(s).is_none()) {
                return Err(DarkroomError::Config(format!(
                    "Role `{}` references unknown scope `{}`",
                    role, unknown
                )));
            }
        }

        let mut schemas = BTreeMap::new();
        for (key, path) in frontend.openapi_schemas {
            let path = if path.is_absolute() {
                path
            } else {
                schema_base.join(path)
            };
            let document = OpenApiDocument::from_file(&path)?;
            tracing::debug!(schema = %key, path = %path.display(), "Loaded OpenAPI schema");
            schemas.insert(
                key.clone(),
                LoadedSchema {
                    key,
                    path,
                    document,
                },
            );
        }

        Ok(Self {
            backend_url: shared.backend_url,
            frontend_url: shared.frontend_url,
            auth_key: shared.auth_key,
            auth_logout_header: shared.header_keys.auth_logout,
            routes: shared.routes,
            scopes,
            visibility_levels,
            permission_levels,
            user_roles,
            role_scopes: shared.user_role_scopes,
            otp_length: shared.otp_length,
            google_client_id: shared.google_client_id,
            dev_server: frontend.dev_server,
            schemas,
            paths: None,
        })
    }

    /// Scope ids granted to a role.
    pub fn scopes_for_role(&self, role: &str) -> Vec<u32> {
        self.role_scopes
            .get(role)
            .map(|names| names.iter().filter_map(|n| self.scopes.id(n)).collect())
            .unwrap_or_default()
    }

    /// Path of a named route.
    pub fn route(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }

    /// A loaded OpenAPI schema by key.
    pub fn schema(&self, key: &str) -> Option<&LoadedSchema> {
        self.schemas.get(key)
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DarkroomError::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })
}

/// Parse a YAML document after substituting `${VAR}` references.
pub fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T> {
    let content = substitute_env_vars(content);
    serde_yaml::from_str(&content)
        .map_err(|e| DarkroomError::Config(format!("Failed to parse config: {}", e)))
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") else {
        return content.to_string();
    };
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) const SHARED_YAML: &str = r#"
backend_url: https://api.darkroom.test
frontend_url: https://darkroom.test
auth_key: darkroom-auth
header_keys:
  auth_logout: x-force-logout
routes:
  home: /
  gallery: /galleries
scope_name_mapping:
  admin: 1
  users.read: 2
  galleries.read: 3
  galleries.write: 4
visibility_level_name_mapping:
  private: 1
  public: 2
permission_level_name_mapping:
  view: 1
  edit: 2
  admin: 3
user_role_name_mapping:
  user: 1
  admin: 2
user_role_scopes:
  user: [galleries.read, galleries.write]
  admin: [admin, users.read, galleries.read, galleries.write]
otp_length: 6
google_client_id: client-123.apps.googleusercontent.com
"#;

    pub(crate) fn test_config() -> AppConfig {
        let shared: SharedConfig = parse_yaml(SHARED_YAML).unwrap();
        AppConfig::from_documents(shared, FrontendConfig::default(), Path::new(".")).unwrap()
    }

    #[test]
    fn test_parse_shared_document() {
        let config = test_config();
        assert_eq!(config.backend_url, "https://api.darkroom.test");
        assert_eq!(config.auth_key, "darkroom-auth");
        assert_eq!(config.auth_logout_header, "x-force-logout");
        assert_eq!(config.scopes.id("galleries.write"), Some(4));
        assert_eq!(config.user_roles.name(2), Some("admin"));
        assert_eq!(config.visibility_levels.len(), 2);
        assert_eq!(config.permission_levels.id("edit"), Some(2));
        assert_eq!(config.route("gallery"), Some("/galleries"));
        assert_eq!(config.dev_server.port, 5173);
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let shared: SharedConfig =
            parse_yaml("backend_url: http://localhost:8000\nfrontend_url: http://localhost:5173\n")
                .unwrap();
        assert_eq!(shared.auth_key, "auth");
        assert_eq!(shared.header_keys.auth_logout, "x-auth-logout");
        assert_eq!(shared.otp_length, 6);
        assert!(shared.google_client_id.is_none());
    }

    #[test]
    fn test_scopes_for_role() {
        let config = test_config();
        assert_eq!(config.scopes_for_role("user"), vec![3, 4]);
        assert_eq!(config.scopes_for_role("admin"), vec![1, 2, 3, 4]);
        assert!(config.scopes_for_role("guest").is_empty());
    }

    #[test]
    fn test_unknown_scope_in_role_rejected() {
        let mut shared: SharedConfig = parse_yaml(SHARED_YAML).unwrap();
        shared
            .user_role_scopes
            .insert("user".to_string(), vec!["photos.delete".to_string()]);
        let err = AppConfig::from_documents(shared, FrontendConfig::default(), Path::new("."))
            .unwrap_err();
        assert!(err.to_string().contains("photos.delete"));
    }

    #[test]
    fn test_unstorable_auth_key_rejected_at_load() {
        let mut shared: SharedConfig = parse_yaml(SHARED_YAML).unwrap();
        shared.auth_key = "gallery/auth".to_string();
        let err = AppConfig::from_documents(shared, FrontendConfig::default(), Path::new("."))
            .unwrap_err();
        assert!(matches!(err, DarkroomError::Config(ref msg) if msg.contains("gallery/auth")));
    }

    #[test]
    fn test_colliding_ids_rejected_at_load() {
        let mut shared: SharedConfig = parse_yaml(SHARED_YAML).unwrap();
        shared.visibility_level_name_mapping.insert("unlisted".to_string(), 2);
        assert!(
            AppConfig::from_documents(shared, FrontendConfig::default(), Path::new(".")).is_err()
        );
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DARKROOM_TEST_BACKEND", "https://backend.internal");
        let shared: SharedConfig = parse_yaml(
            "backend_url: ${DARKROOM_TEST_BACKEND}\nfrontend_url: https://darkroom.test\n",
        )
        .unwrap();
        assert_eq!(shared.backend_url, "https://backend.internal");
        std::env::remove_var("DARKROOM_TEST_BACKEND");
    }

    #[test]
    fn test_load_from_env_dir_with_schema() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shared.yaml"), SHARED_YAML).unwrap();
        std::fs::write(
            dir.path().join("frontend.yaml"),
            "dev_server:\n  port: 3000\nopenapi_schemas:\n  api: schemas/api.json\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
        std::fs::write(
            dir.path().join("schemas/api.json"),
            r#"{"openapi": "3.1.0", "paths": {"/users/me": {"get": {}}}}"#,
        )
        .unwrap();

        let env = ConfigEnv {
            config_env_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::load_with(&env).unwrap();

        assert_eq!(config.dev_server.port, 3000);
        assert_eq!(config.dev_server.host, "localhost");
        let schema = config.schema("api").unwrap();
        assert_eq!(schema.path, dir.path().join("schemas/api.json"));
        assert_eq!(schema.document.operations().len(), 1);
        assert!(!config.paths.unwrap().frontend_bootstrapped);
    }

    #[test]
    fn test_missing_shared_path_raises_before_config_exists() {
        let dir = tempdir().unwrap();
        let env = ConfigEnv {
            shared_config_path: Some(dir.path().join("absent.yaml")),
            config_env_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::load_with(&env);
        assert!(matches!(result, Err(DarkroomError::ConfigNotFound { .. })));
        assert!(!dir.path().join("frontend.yaml").exists());
    }
}
