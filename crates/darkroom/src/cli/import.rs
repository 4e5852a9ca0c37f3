use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use darkroom_codegen::{ExternalGenerator, SchemaImporter};

/// Generate TypeScript bindings for every configured OpenAPI schema.
#[derive(Parser)]
pub struct ImportSchemasCommand {
    /// Output directory for the generated files.
    #[arg(short, long, default_value = "src/types")]
    pub out: PathBuf,

    /// Generator program (defaults to `npx openapi-typescript`).
    #[arg(long)]
    pub generator: Option<String>,

    /// Extra argument passed to the generator before the schema path.
    #[arg(long = "generator-arg", allow_hyphen_values = true)]
    pub generator_args: Vec<String>,
}

impl ImportSchemasCommand {
    /// Execute the import-schemas command.
    pub async fn execute(self) -> Result<()> {
        let mut importer = SchemaImporter::discover(&self.out)?;
        let count = importer.keys().count();
        if count == 0 {
            println!(
                "{} No OpenAPI schemas configured under `openapi_schemas`.",
                style("ℹ").blue()
            );
            return Ok(());
        }

        if let Some(program) = self.generator {
            let generator = self
                .generator_args
                .into_iter()
                .fold(ExternalGenerator::new(program), |g, arg| g.arg(arg));
            importer = importer.with_generator(generator);
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!(
            "Importing {} schema(s) into {}...",
            count,
            self.out.display()
        ));

        // The importer shells out and blocks.
        let result = tokio::task::spawn_blocking(move || importer.run()).await?;
        pb.finish_and_clear();

        let report = result?;
        for schema in &report.schemas {
            println!("{} {}", style("✓").green(), style(&schema.key).bold());
            println!("    {}", schema.bindings.display());
            println!("    {}", schema.interfaces.display());
        }
        Ok(())
    }
}
