use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::OpenApiDocument;
use crate::error::{DarkroomError, Result};

/// Where a parameter is carried in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParameterLocation {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterLocation {
    type Err = DarkroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "query" => Ok(Self::Query),
            "path" => Ok(Self::Path),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            other => Err(DarkroomError::Schema(format!(
                "Unknown parameter location: {}",
                other
            ))),
        }
    }
}

/// The subset of a JSON schema that describes a single parameter value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    /// Primitive type (`integer`, `string`, ...).
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// True when the schema also admits `null`.
    #[serde(default)]
    pub nullable: bool,
}

fn deserialize_type<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .find(|s| s != "null"),
        _ => None,
    })
}

impl ParameterSchema {
    /// Interpret a schema value, collapsing `anyOf`/`oneOf` nullable unions
    /// into the non-null branch.
    pub(crate) fn from_value(value: &Value, doc: &OpenApiDocument) -> Result<Self> {
        let value = doc.resolve(value)?;
        let admits_null = |v: &Value| match v.get("type") {
            Some(Value::String(s)) => s == "null",
            Some(Value::Array(items)) => items.iter().any(|t| t == "null"),
            _ => false,
        };

        if value.get("type").is_none() {
            let union = value
                .get("anyOf")
                .or_else(|| value.get("oneOf"))
                .and_then(Value::as_array);
            if let Some(variants) = union {
                let mut nullable = false;
                let mut chosen: Option<ParameterSchema> = None;
                for variant in variants {
                    let variant = doc.resolve(variant)?;
                    if variant.get("type").and_then(Value::as_str) == Some("null") {
                        nullable = true;
                    } else if chosen.is_none() {
                        chosen = Some(Self::from_value(variant, doc)?);
                    }
                }
                let mut schema = chosen.unwrap_or_default();
                let outer: ParameterSchema = serde_json::from_value(value.clone())?;
                schema.overlay(outer);
                schema.nullable = schema.nullable || nullable;
                return Ok(schema);
            }
        }

        let mut schema: ParameterSchema = serde_json::from_value(value.clone())?;
        schema.nullable = schema.nullable || admits_null(value);
        Ok(schema)
    }

    fn overlay(&mut self, outer: ParameterSchema) {
        self.kind = outer.kind.or(self.kind.take());
        self.format = outer.format.or(self.format.take());
        self.minimum = outer.minimum.or(self.minimum);
        self.maximum = outer.maximum.or(self.maximum);
        self.min_length = outer.min_length.or(self.min_length);
        self.max_length = outer.max_length.or(self.max_length);
        self.default = outer.default.or(self.default.take());
        self.enum_values = outer.enum_values.or(self.enum_values.take());
        self.pattern = outer.pattern.or(self.pattern.take());
    }

    /// Clamp an integer into the schema's `[minimum, maximum]` range.
    pub fn clamp_integer(&self, value: i64) -> i64 {
        let mut value = value;
        if let Some(min) = self.minimum {
            value = value.max(min.ceil() as i64);
        }
        if let Some(max) = self.maximum {
            value = value.min(max.floor() as i64);
        }
        value
    }

    /// The schema default, when it is an integer.
    pub fn default_integer(&self) -> Option<i64> {
        self.default.as_ref().and_then(Value::as_i64)
    }

    /// Whether `value` is one of the enumerated values (always true without an `enum`).
    pub fn allows(&self, value: &Value) -> bool {
        self.enum_values
            .as_ref()
            .map(|values| values.contains(value))
            .unwrap_or(true)
    }
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: Option<String>,
    pub schema: ParameterSchema,
}

impl Parameter {
    pub(crate) fn from_value(value: &Value, doc: &OpenApiDocument) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DarkroomError::Schema("Parameter without a name".to_string()))?
            .to_string();
        let location: ParameterLocation = value
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| DarkroomError::Schema(format!("Parameter `{}` has no location", name)))?
            .parse()?;
        let required = location == ParameterLocation::Path
            || value.get("required").and_then(Value::as_bool).unwrap_or(false);
        let schema = match value.get("schema") {
            Some(schema) => ParameterSchema::from_value(schema, doc)?,
            None => ParameterSchema::default(),
        };

        Ok(Self {
            name,
            location,
            required,
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            schema,
        })
    }
}
