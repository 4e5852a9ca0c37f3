use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use serde_json::Value;

use darkroom::Darkroom;
use darkroom_core::api::{ApiError, RequestInit};
use darkroom_core::openapi::HttpMethod;

use super::parse_pair;

/// Call a backend operation described by a schema.
///
/// The session persisted by earlier calls is reused, and any session change
/// in the response is saved for the next one.
#[derive(Parser)]
pub struct CallCommand {
    /// Schema key from `openapi_schemas`.
    pub schema: String,

    /// HTTP method.
    pub method: HttpMethod,

    /// Path template as written in the schema, e.g. `/galleries/{gallery_id}`.
    pub path: String,

    /// Path parameter as name=value.
    #[arg(short = 'p', long = "path-param", value_parser = parse_pair)]
    pub path_params: Vec<(String, String)>,

    /// Query parameter as name=value.
    #[arg(short = 'q', long = "query", value_parser = parse_pair)]
    pub query: Vec<(String, String)>,

    /// Request header as name=value.
    #[arg(short = 'H', long = "header", value_parser = parse_pair)]
    pub headers: Vec<(String, String)>,

    /// JSON request body.
    #[arg(short, long)]
    pub body: Option<String>,
}

impl CallCommand {
    /// Execute the call command.
    pub async fn execute(self) -> Result<()> {
        let app = Darkroom::builder().build()?;
        let service = app.service::<Value>(&self.schema, self.method, &self.path)?;

        let mut init = RequestInit::new();
        for (name, value) in self.path_params {
            init = init.path_param(name, value);
        }
        for (name, value) in self.query {
            init = init.query(name, value);
        }
        for (name, value) in self.headers {
            init = init.header(name, value);
        }
        if let Some(body) = &self.body {
            let body: Value = serde_json::from_str(body).context("--body is not valid JSON")?;
            init = init.body(body);
        }

        let result = service.request(init).await;
        if let Some(response) = &result.response {
            let status = if response.ok() {
                style(response.status).green()
            } else {
                style(response.status).red()
            };
            eprintln!("{} {} {}", status, self.method, response.url);
        }

        match result.into_result() {
            Ok(data) => {
                println!("{}", serde_json::to_string_pretty(&data)?);
                Ok(())
            }
            Err(e) => {
                if let ApiError::Status { body, .. } = &e {
                    if !body.is_null() {
                        println!("{}", serde_json::to_string_pretty(body)?);
                    }
                }
                anyhow::bail!("{}", e.message())
            }
        }
    }
}
