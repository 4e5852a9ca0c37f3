use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DarkroomError, Result};

/// Explicit path of the frontend document.
pub const FRONTEND_CONFIG_PATH: &str = "FRONTEND_CONFIG_PATH";
/// Explicit path of the shared document.
pub const SHARED_CONFIG_PATH: &str = "SHARED_CONFIG_PATH";
/// Named environment subdirectory under the user config directory.
pub const APP_ENV: &str = "APP_ENV";
/// Explicit environment directory, bypassing the user config directory.
pub const CONFIG_ENV_DIR: &str = "CONFIG_ENV_DIR";

/// Directory name under the OS user config directory.
pub const APP_DIR_NAME: &str = "darkroom";
const DEFAULT_ENV: &str = "default";
const SHARED_FILE_NAME: &str = "shared.yaml";
const FRONTEND_FILE_NAME: &str = "frontend.yaml";

/// Frontend document copied into place on first run.
pub const FRONTEND_EXAMPLE: &str = include_str!("../../config/frontend.example.yaml");

/// Environment inputs for config discovery.
#[derive(Debug, Clone, Default)]
pub struct ConfigEnv {
    pub frontend_config_path: Option<PathBuf>,
    pub shared_config_path: Option<PathBuf>,
    pub app_env: Option<String>,
    pub config_env_dir: Option<PathBuf>,
    /// OS user config directory (`dirs::config_dir()` for the process).
    pub user_config_dir: Option<PathBuf>,
}

impl ConfigEnv {
    /// Capture the relevant variables from the process environment.
    pub fn from_process() -> Self {
        Self {
            frontend_config_path: var(FRONTEND_CONFIG_PATH).map(PathBuf::from),
            shared_config_path: var(SHARED_CONFIG_PATH).map(PathBuf::from),
            app_env: var(APP_ENV),
            config_env_dir: var(CONFIG_ENV_DIR).map(PathBuf::from),
            user_config_dir: dirs::config_dir(),
        }
    }

    /// Directory holding the environment's documents.
    pub fn env_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.config_env_dir {
            return Ok(dir.clone());
        }
        let base = self.user_config_dir.as_ref().ok_or_else(|| {
            DarkroomError::Config("Could not determine the user config directory".to_string())
        })?;
        Ok(base
            .join(APP_DIR_NAME)
            .join(self.app_env.as_deref().unwrap_or(DEFAULT_ENV)))
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolved locations of both config documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPaths {
    pub shared: PathBuf,
    pub frontend: PathBuf,
    /// True when the frontend document was created from the bundled example.
    pub frontend_bootstrapped: bool,
}

impl ConfigPaths {
    /// Resolve both documents.
    ///
    /// Explicit paths are checked before anything touches the filesystem, so a
    /// bad `SHARED_CONFIG_PATH` fails without bootstrapping the frontend
    /// document.
    pub fn resolve(env: &ConfigEnv) -> Result<Self> {
        if let Some(path) = &env.shared_config_path {
            require_file(path)?;
        }
        if let Some(path) = &env.frontend_config_path {
            require_file(path)?;
        }

        let shared = match &env.shared_config_path {
            Some(path) => path.clone(),
            None => {
                let path = env.env_dir()?.join(SHARED_FILE_NAME);
                require_file(&path)?;
                path
            }
        };

        let (frontend, frontend_bootstrapped) = match &env.frontend_config_path {
            Some(path) => (path.clone(), false),
            None => {
                let path = env.env_dir()?.join(FRONTEND_FILE_NAME);
                let created = bootstrap_frontend(&path)?;
                (path, created)
            }
        };

        tracing::debug!(
            shared = %shared.display(),
            frontend = %frontend.display(),
            "Resolved config paths"
        );

        Ok(Self {
            shared,
            frontend,
            frontend_bootstrapped,
        })
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DarkroomError::ConfigNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Copy the bundled example into place when the frontend document is missing.
fn bootstrap_frontend(path: &Path) -> Result<bool> {
    if path.is_file() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, FRONTEND_EXAMPLE)?;
    tracing::info!(path = %path.display(), "Created frontend config from example");
    Ok(true)
}
