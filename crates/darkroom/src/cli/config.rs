use anyhow::Result;
use clap::Parser;
use console::style;
use serde_json::{json, Value};

use darkroom_core::config::{AppConfig, MappingTable};

/// Show the resolved configuration.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Print as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

impl ConfigCommand {
    /// Execute the config command.
    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary(&config))?);
            return Ok(());
        }

        if let Some(paths) = &config.paths {
            println!("{} {}", style("shared").bold(), paths.shared.display());
            println!("{} {}", style("frontend").bold(), paths.frontend.display());
            if paths.frontend_bootstrapped {
                println!(
                    "  {} Created from the bundled example; edit it to add schemas.",
                    style("ℹ").blue()
                );
            }
            println!();
        }

        println!("  backend   {}", style(&config.backend_url).cyan());
        println!("  frontend  {}", style(&config.frontend_url).cyan());
        println!(
            "  dev       {}",
            style(format!("http://{}:{}", config.dev_server.host, config.dev_server.port)).cyan()
        );
        println!("  auth key  {}", config.auth_key);
        println!("  otp       {} digits", config.otp_length);
        println!();

        print_table("scopes", &config.scopes);
        print_table("user roles", &config.user_roles);
        print_table("visibility levels", &config.visibility_levels);
        print_table("permission levels", &config.permission_levels);

        if config.schemas.is_empty() {
            println!("{}", style("no schemas").dim());
        }
        for (key, schema) in &config.schemas {
            println!(
                "{} {} ({} operations)",
                style("schema").bold(),
                style(key).green(),
                schema.document.operations().len()
            );
            println!("  {}", schema.path.display());
        }
        Ok(())
    }
}

fn print_table(title: &str, table: &MappingTable) {
    println!("{}", style(title).bold());
    for (name, id) in table.forward() {
        println!("  {:>3}  {}", id, name);
    }
}

fn summary(config: &AppConfig) -> Value {
    let schemas: serde_json::Map<String, Value> = config
        .schemas
        .iter()
        .map(|(key, schema)| {
            (
                key.clone(),
                json!({
                    "path": schema.path,
                    "title": schema.document.title(),
                    "operations": schema.document.operations().len(),
                }),
            )
        })
        .collect();

    json!({
        "paths": config.paths,
        "backend_url": config.backend_url,
        "frontend_url": config.frontend_url,
        "auth_key": config.auth_key,
        "auth_logout_header": config.auth_logout_header,
        "routes": config.routes,
        "scopes": config.scopes.forward(),
        "user_roles": config.user_roles.forward(),
        "user_role_scopes": config.role_scopes,
        "visibility_levels": config.visibility_levels.forward(),
        "permission_levels": config.permission_levels.forward(),
        "otp_length": config.otp_length,
        "google_client_id": config.google_client_id,
        "dev_server": {
            "host": config.dev_server.host,
            "port": config.dev_server.port,
        },
        "schemas": schemas,
    })
}
