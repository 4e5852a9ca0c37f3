//! Build-time import of backend OpenAPI schemas into TypeScript declarations.

pub mod error;
pub mod generator;
pub mod importer;
pub mod interfaces;

pub use error::{Error, Result};
pub use generator::ExternalGenerator;
pub use importer::{ImportReport, ImportedSchema, SchemaImporter};
pub use interfaces::InterfaceConverter;
