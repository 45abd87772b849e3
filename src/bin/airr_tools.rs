//! AIRR Tools CLI
//!
//! Validates, merges and inspects AIRR data files.
//!
//! Usage:
//!   airr-tools validate rearrangement sample1.tsv sample2.tsv
//!   airr-tools validate airr repertoire.yaml
//!   airr-tools merge -o merged.tsv --drop sample1.tsv sample2.tsv
//!   airr-tools template Repertoire --format yaml
//!   airr-tools info

use std::path::PathBuf;

use airr::interface::{merge_rearrangement, validate_airr, validate_rearrangement};
use airr::{AirrConfig, DataFormat, SchemaRegistry, Validator};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "airr-tools")]
#[command(about = "Validate, merge and inspect AIRR data files")]
struct Cli {
    /// Configuration file (defaults to airr.toml and friends)
    #[arg(short, long)]
    config: Option<String>,

    /// Schema file to use instead of the configured or bundled one
    #[arg(short, long)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate data files
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },

    /// Merge rearrangement files into one
    Merge {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Keep only the columns present in every input
        #[arg(long)]
        drop: bool,

        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print a default-valued object for a schema type
    Template {
        /// Schema type, e.g. Repertoire
        type_name: String,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Show schema information
    Info,
}

#[derive(Subcommand)]
enum ValidateTarget {
    /// Rearrangement TSV files
    Rearrangement {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// AIRR YAML/JSON documents
    Airr {
        /// Force the input format instead of using the extension
        #[arg(short, long)]
        format: Option<String>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = AirrConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let registry = match &cli.schema {
        Some(path) => SchemaRegistry::open(path)
            .with_context(|| format!("loading schema {}", path.display()))?,
        None => config.registry().context("loading schema")?,
    };

    match cli.command {
        Commands::Validate { target } => match target {
            ValidateTarget::Rearrangement { files } => {
                println!("🔍 Validating {} rearrangement file(s)...", files.len());
                let reports = validate_rearrangement(&files, &registry, config.reader_options())?;
                let mut all_valid = true;
                for report in &reports {
                    if report.is_valid() {
                        println!("  ✅ {} - {} rows", report.path.display(), report.rows);
                        if report.flagged_rows > 0 {
                            println!("     └─ {} row(s) with a wrong column count", report.flagged_rows);
                        }
                    } else {
                        all_valid = false;
                        println!("  ❌ {} - {} error(s)", report.path.display(), report.error_count);
                        for err in &report.errors {
                            println!("     └─ {}", err);
                        }
                        if report.omitted_errors() > 0 {
                            println!("     └─ ... and {} more", report.omitted_errors());
                        }
                    }
                }
                Ok(all_valid)
            }

            ValidateTarget::Airr { format, files } => {
                let format = match format {
                    Some(f) => Some(f.parse::<DataFormat>()?),
                    None => config.output.hierarchical_format,
                };
                let validator = Validator::with_options(&registry, config.validation_options());
                println!("🔍 Validating {} AIRR document(s)...", files.len());
                let mut all_valid = true;
                for file in &files {
                    let report = match validate_airr(file, format, &validator) {
                        Ok(report) => report,
                        Err(e) => {
                            all_valid = false;
                            println!("  ❌ {} - {}", file.display(), e);
                            continue;
                        }
                    };
                    if report.is_valid() {
                        println!(
                            "  ✅ {} - {} object(s), {} warning(s)",
                            file.display(),
                            report.objects_checked,
                            report.warnings.len()
                        );
                    } else {
                        all_valid = false;
                        println!(
                            "  ❌ {} - {} of {} object(s) failed",
                            file.display(),
                            report.failures.len(),
                            report.objects_checked
                        );
                        for failure in &report.failures {
                            println!("     └─ {}: {}", failure.object, failure.error);
                        }
                    }
                }
                Ok(all_valid)
            }
        },

        Commands::Merge { output, drop, files } => {
            let rows = merge_rearrangement(&output, &files, &registry, drop, config.reader_options())
                .with_context(|| format!("merging into {}", output.display()))?;
            println!(
                "✅ Merged {} file(s), {} rows -> {}",
                files.len(),
                rows,
                output.display()
            );
            Ok(true)
        }

        Commands::Template { type_name, format } => {
            let format: DataFormat = format.parse()?;
            let template = registry.template(&type_name)?;
            print!("{}", format.render(&template, config.pretty())?);
            if format == DataFormat::Json {
                println!();
            }
            Ok(true)
        }

        Commands::Info => {
            let info = registry.info();
            println!("📋 {}", info.title.as_deref().unwrap_or("AIRR Schema"));
            if let Some(version) = registry.version() {
                println!("   Version: {}", version);
            }
            if let Some(description) = &info.description {
                println!("   {}", description);
            }
            println!();

            let names: Vec<String> = registry.definition_names().map(String::from).collect();
            for name in names {
                let definition = registry.load(&name)?;
                println!(
                    "  {} - {} fields, {} required, {} MiAIRR",
                    name,
                    definition.properties().len(),
                    definition.required().len(),
                    definition.miairr_fields().len()
                );
            }
            Ok(true)
        }
    }
}
