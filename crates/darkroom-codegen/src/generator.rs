use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// External OpenAPI-to-TypeScript binding generator.
///
/// Invoked as `<program> <args..> <schema> --output <out>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalGenerator {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExternalGenerator {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec!["openapi-typescript".to_string()],
        }
    }
}

impl ExternalGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the generator for one schema, writing bindings to `output`.
    pub fn generate(&self, schema: &Path, output: &Path) -> Result<()> {
        tracing::debug!(
            program = %self.program,
            schema = %schema.display(),
            output = %output.display(),
            "Running binding generator"
        );

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(schema)
            .arg("--output")
            .arg(output)
            .output()
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(Error::Generator {
                schema: schema.to_path_buf(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }
        Ok(())
    }
}
