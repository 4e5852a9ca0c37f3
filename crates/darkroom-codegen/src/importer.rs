use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use darkroom_core::AppConfig;

use crate::error::{Error, Result};
use crate::generator::ExternalGenerator;
use crate::interfaces::InterfaceConverter;

/// Files written for one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedSchema {
    pub key: String,
    pub source: PathBuf,
    pub bindings: PathBuf,
    pub interfaces: PathBuf,
}

/// Outcome of a successful import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub schemas: Vec<ImportedSchema>,
}

impl ImportReport {
    pub fn written_files(&self) -> impl Iterator<Item = &Path> {
        self.schemas
            .iter()
            .flat_map(|s| [s.bindings.as_path(), s.interfaces.as_path()])
    }
}

/// Imports every configured OpenAPI schema into `out_dir`.
///
/// For each key, in sorted order, the external generator writes
/// `<key>.d.ts` and the interface converter writes `<key>-interfaces.ts`.
/// The run stops at the first failure; files already written stay in place.
#[derive(Debug, Clone)]
pub struct SchemaImporter {
    schemas: BTreeMap<String, PathBuf>,
    out_dir: PathBuf,
    generator: ExternalGenerator,
}

impl SchemaImporter {
    pub fn new(schemas: BTreeMap<String, PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas,
            out_dir: out_dir.into(),
            generator: ExternalGenerator::default(),
        }
    }

    /// Import the schemas listed in the frontend configuration.
    pub fn from_config(config: &AppConfig, out_dir: impl Into<PathBuf>) -> Self {
        let schemas = config
            .schemas
            .iter()
            .map(|(key, schema)| (key.clone(), schema.path.clone()))
            .collect();
        Self::new(schemas, out_dir)
    }

    /// Load configuration from the process environment and import its schemas.
    pub fn discover(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let config = AppConfig::load()?;
        Ok(Self::from_config(&config, out_dir))
    }

    pub fn with_generator(mut self, generator: ExternalGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn run(&self) -> Result<ImportReport> {
        fs::create_dir_all(&self.out_dir)?;

        let mut report = ImportReport::default();
        for (key, source) in &self.schemas {
            report.schemas.push(self.import_one(key, source)?);
        }
        Ok(report)
    }

    /// Import a single schema by key.
    pub fn import_one(&self, key: &str, source: &Path) -> Result<ImportedSchema> {
        let bindings = self.out_dir.join(format!("{}.d.ts", key));
        let interfaces = self.out_dir.join(format!("{}-interfaces.ts", key));

        tracing::info!(key, source = %source.display(), "Importing schema");
        self.generator.generate(source, &bindings)?;

        let content = fs::read_to_string(source)?;
        let document: Value = serde_json::from_str(&content).map_err(|e| Error::InvalidSchema {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(&interfaces, InterfaceConverter::convert(key, &document))?;

        tracing::info!(
            key,
            bindings = %bindings.display(),
            interfaces = %interfaces.display(),
            "Schema imported"
        );
        Ok(ImportedSchema {
            key: key.to_string(),
            source: source.to_path_buf(),
            bindings,
            interfaces,
        })
    }
}
