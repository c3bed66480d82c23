//! CLI Application logic
//!
//! Contains the command-line interface implementation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docstamp_core::{CheckReport, StampConfig, StampReport, Stamper};
use docstamp_data::{load_path, DataSource, ExcelSource};

/// Output format for check reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for tool consumption
    Json,
}

#[derive(Parser)]
#[command(name = "docstamp")]
#[command(
    author,
    version,
    about = "Fill DOCX templates driven by comment directives",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stamp a DOCX template with data
    Stamp {
        /// Template DOCX file
        template: PathBuf,

        /// Data file (json, csv, tsv, xlsx, xlsm or properties)
        #[arg(short, long)]
        data: PathBuf,

        /// Output DOCX file (defaults to <template>-stamped.docx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stamping configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worksheet to read when the data is an Excel workbook
        #[arg(long)]
        sheet: Option<String>,
    },

    /// List the directives and placeholders of a template
    Check {
        /// Template DOCX file
        template: PathBuf,

        /// Output format (text or json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Strict mode: exit with error if malformed directives are found
        #[arg(long)]
        strict: bool,
    },
}

/// Arguments of the stamp command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampArgs {
    pub template: PathBuf,
    pub data: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub sheet: Option<String>,
}

impl StampArgs {
    pub fn new(template: impl Into<PathBuf>, data: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            data: data.into(),
            output: None,
            config: None,
            sheet: None,
        }
    }

    /// Output path, defaulting to `<template>-stamped.docx` beside the template
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let stem = self
                    .template
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string());
                self.template.with_file_name(format!("{stem}-stamped.docx"))
            }
        }
    }
}

/// Run the CLI application
///
/// This is the main entry point for the command-line interface.
/// It parses arguments and dispatches to the appropriate command.
pub fn run_cli() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stamp {
            template,
            data,
            output,
            config,
            sheet,
        } => {
            let args = StampArgs {
                template,
                data,
                output,
                config,
                sheet,
            };
            let report = stamp_command(&args)?;
            println!("Stamped: {}", args.output_path().display());
            println!(
                "  {} directives, {} placeholders, {} sub-documents",
                report.directives, report.placeholders, report.sub_documents
            );
            if !report.repair.malformed.is_empty() {
                let ids: Vec<&str> = report.repair.malformed.iter().map(String::as_str).collect();
                println!("  Removed malformed directives: {}", ids.join(", "));
            }
        }
        Commands::Check {
            template,
            format,
            strict,
        } => {
            check_command(&template, format, strict)?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber, honouring `RUST_LOG`
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded in another tool
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the data file, honouring a worksheet selection for workbooks
pub fn load_data(path: &Path, sheet: Option<&str>) -> Result<Value> {
    let value = match sheet {
        Some(sheet) => ExcelSource::new(path)
            .and_then(|source| source.with_sheet(sheet))
            .and_then(|source| source.load()),
        None => load_path(path),
    };
    value.with_context(|| format!("Failed to load data: {}", path.display()))
}

/// Execute the stamp command
pub fn stamp_command(args: &StampArgs) -> Result<StampReport> {
    if !args.template.exists() {
        anyhow::bail!("Template file not found: {}", args.template.display());
    }

    let config = match &args.config {
        Some(path) => StampConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => StampConfig::default(),
    };
    let data = load_data(&args.data, args.sheet.as_deref())?;

    let template = fs::read(&args.template)
        .with_context(|| format!("Failed to read template: {}", args.template.display()))?;

    let stamper = Stamper::new(config);
    let mut output = Vec::new();
    let report = stamper
        .stamp(&template, &data, &mut output)
        .with_context(|| format!("Failed to stamp template: {}", args.template.display()))?;

    let output_path = args.output_path();
    fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
    debug!(output = %output_path.display(), bytes = output.len(), "wrote output");

    Ok(report)
}

/// Execute the check command
pub fn check_command(template: &Path, format: OutputFormat, strict: bool) -> Result<CheckReport> {
    if !template.exists() {
        anyhow::bail!("Template file not found: {}", template.display());
    }
    let bytes = fs::read(template)
        .with_context(|| format!("Failed to read template: {}", template.display()))?;
    let report = Stamper::default()
        .check(&bytes)
        .with_context(|| format!("Failed to inspect template: {}", template.display()))?;

    print!("{}", format_check_report(template, &report, format)?);

    if strict && !report.malformed.is_empty() {
        anyhow::bail!(
            "{} malformed directive(s) in {}",
            report.malformed.len(),
            template.display()
        );
    }
    Ok(report)
}

/// Render a check report as text or JSON
pub fn format_check_report(
    template: &Path,
    report: &CheckReport,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut json =
                serde_json::to_string_pretty(report).context("Failed to serialize report")?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Text => {
            let mut out = format!("Template: {}\n", template.display());

            out.push_str(&format!("Directives: {}\n", report.directives.len()));
            for directive in &report.directives {
                let processor = directive.processor.as_deref().unwrap_or("replace");
                out.push_str(&format!(
                    "  [{}] {} ({})\n",
                    directive.id, directive.expression, processor
                ));
            }

            out.push_str(&format!("Placeholders: {}\n", report.placeholders.len()));
            for placeholder in &report.placeholders {
                out.push_str(&format!("  ${{{}}}\n", placeholder));
            }

            if !report.malformed.is_empty() {
                out.push_str(&format!("Malformed: {}\n", report.malformed.join(", ")));
            }
            Ok(out)
        }
    }
}
