//! Read-only view over a raw OpenAPI document.
//!
//! The document is kept as a `serde_json::Value`; only the pieces the service
//! factory needs (operations and their parameter lists) are interpreted.

mod parameter;

pub use parameter::{Parameter, ParameterLocation, ParameterSchema};

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DarkroomError, Result};

/// HTTP methods that can carry an OpenAPI operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    /// All methods in the order OpenAPI lists them in a path item.
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Trace,
    ];

    /// Lowercase key used inside an OpenAPI path item.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for HttpMethod {
    type Err = DarkroomError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| DarkroomError::InvalidArgument(format!("Unknown HTTP method: {}", s)))
    }
}

/// A parsed OpenAPI document.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    raw: Value,
}

impl OpenApiDocument {
    /// Wrap a raw JSON document. The document must be an object with a `paths` object.
    pub fn from_value(raw: Value) -> Result<Self> {
        match raw.get("paths") {
            Some(Value::Object(_)) => Ok(Self { raw }),
            _ => Err(DarkroomError::Schema(
                "OpenAPI document has no `paths` object".to_string(),
            )),
        }
    }

    /// Parse a document from JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// Read and parse a document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DarkroomError::Schema(format!(
                "Failed to read OpenAPI document {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// The raw JSON document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// `info.title`, if present.
    pub fn title(&self) -> Option<&str> {
        self.raw.pointer("/info/title").and_then(Value::as_str)
    }

    /// Every (method, path) pair declared by the document, sorted.
    pub fn operations(&self) -> Vec<(HttpMethod, String)> {
        let mut ops = Vec::new();
        if let Some(Value::Object(paths)) = self.raw.get("paths") {
            for (path, item) in paths {
                for method in HttpMethod::ALL {
                    if item.get(method.as_str()).is_some() {
                        ops.push((method, path.clone()));
                    }
                }
            }
        }
        ops.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        ops
    }

    /// Look up the operation object for a method and path template.
    pub fn operation(&self, method: HttpMethod, path: &str) -> Option<&Value> {
        self.path_item(path)?.get(method.as_str())
    }

    fn path_item(&self, path: &str) -> Option<&Value> {
        self.raw.get("paths")?.get(path)
    }

    /// Declared parameters of an operation.
    ///
    /// Path-level parameters are merged with operation-level ones; an
    /// operation parameter overrides a path parameter with the same name and
    /// location. `$ref` entries are resolved against this document.
    pub fn parameters(&self, method: HttpMethod, path: &str) -> Result<Vec<Parameter>> {
        let operation = self.operation(method, path).ok_or_else(|| {
            DarkroomError::Schema(format!("No operation {} {} in document", method, path))
        })?;

        let mut merged: Vec<Parameter> = Vec::new();
        let sources = [
            self.path_item(path).and_then(|item| item.get("parameters")),
            operation.get("parameters"),
        ];

        for list in sources.into_iter().flatten() {
            let Some(entries) = list.as_array() else {
                continue;
            };
            for entry in entries {
                let param = Parameter::from_value(self.resolve(entry)?, self)?;
                merged.retain(|p| !(p.name == param.name && p.location == param.location));
                merged.push(param);
            }
        }

        Ok(merged)
    }

    /// Follow local `$ref` pointers until a non-reference value is reached.
    pub(crate) fn resolve<'a>(&'a self, value: &'a Value) -> Result<&'a Value> {
        let mut current = value;
        for _ in 0..16 {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            let pointer = reference.strip_prefix('#').ok_or_else(|| {
                DarkroomError::Schema(format!("Only local references are supported: {}", reference))
            })?;
            current = self.raw.pointer(pointer).ok_or_else(|| {
                DarkroomError::Schema(format!("Unresolved reference: {}", reference))
            })?;
        }
        Err(DarkroomError::Schema("Reference chain too deep".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn gallery_document() -> OpenApiDocument {
        OpenApiDocument::from_value(json!({
            "openapi": "3.1.0",
            "info": { "title": "Gallery API", "version": "1.0.0" },
            "paths": {
                "/galleries/{gallery_id}": {
                    "parameters": [
                        { "name": "gallery_id", "in": "path", "required": true,
                          "schema": { "type": "string", "format": "uuid" } }
                    ],
                    "get": {
                        "parameters": [
                            { "$ref": "#/components/parameters/Depth" }
                        ]
                    },
                    "delete": {}
                },
                "/galleries": {
                    "get": {
                        "parameters": [
                            { "name": "limit", "in": "query",
                              "schema": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 } },
                            { "name": "offset", "in": "query",
                              "schema": { "anyOf": [ { "type": "integer", "minimum": 0 }, { "type": "null" } ] } },
                            { "name": "x-request-id", "in": "header",
                              "schema": { "type": "string", "pattern": "^[a-f0-9]+$" } }
                        ]
                    },
                    "post": {}
                },
                "/users/me": { "get": {} }
            },
            "components": {
                "parameters": {
                    "Depth": { "name": "depth", "in": "query",
                               "schema": { "type": "integer", "enum": [0, 1, 2] } }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("FETCH".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_document_requires_paths() {
        assert!(OpenApiDocument::from_value(json!({"openapi": "3.1.0"})).is_err());
    }

    #[test]
    fn test_operations_listing() {
        let doc = gallery_document();
        let ops = doc.operations();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[0], (HttpMethod::Get, "/galleries".to_string()));
        assert_eq!(doc.title(), Some("Gallery API"));
    }

    #[test]
    fn test_parameters_merge_path_level_and_refs() {
        let doc = gallery_document();
        let params = doc.parameters(HttpMethod::Get, "/galleries/{gallery_id}").unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["gallery_id", "depth"]);
        assert!(params[0].required);
        assert_eq!(params[1].location, ParameterLocation::Query);
        assert_eq!(params[1].schema.enum_values.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn test_parameters_unknown_operation() {
        let doc = gallery_document();
        assert!(doc.parameters(HttpMethod::Put, "/galleries").is_err());
    }

    #[test]
    fn test_unresolved_reference() {
        let doc = OpenApiDocument::from_value(json!({
            "paths": { "/x": { "get": { "parameters": [ { "$ref": "#/components/parameters/Nope" } ] } } }
        }))
        .unwrap();
        assert!(doc.parameters(HttpMethod::Get, "/x").is_err());
    }
}
