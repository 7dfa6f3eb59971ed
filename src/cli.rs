//! Command line: validate JSON/NDJSON documents against a type name or shape.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use typeshape::validate::render_errors;
use typeshape::{Descriptor, SchemaError, TypeRegistry, ValidationError, connection, get_errors};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// check JSON documents against runtime structural types
#[derive(Parser, Debug)]
#[command(name = "typeshape", version)]
pub struct CommandLineInterface {
    /// tracing filter, e.g. `debug` or `typeshape=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// validate each document against a type name or a shape file
    Check(CheckOut),
    /// validate each document as database connection parameters
    Connection(ConnectionOut),
    /// list every registered type name
    Names(NamesOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is checked separately
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths, quoted glob patterns or '-' for stdin
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct OutputSettings {
    /// report file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    /// type name every document must satisfy, e.g. 'array<int>'
    #[arg(long = "type", value_name = "NAME", conflicts_with = "shape", required_unless_present = "shape")]
    type_name: Option<String>,

    /// JSON file holding a shape descriptor: {"field": "typeName" | {...}}
    #[arg(long, value_name = "FILE")]
    shape: Option<PathBuf>,

    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    output_settings: OutputSettings,
}

#[derive(clap::Parser, Debug)]
struct ConnectionOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    output_settings: OutputSettings,
}

#[derive(clap::Parser, Debug)]
struct NamesOut {
    #[command(flatten)]
    output_settings: OutputSettings,
}

/// One input document, labelled by where it came from.
#[derive(Debug, Clone, PartialEq)]
struct Document {
    source: String,
    value: Value,
}

#[derive(Debug, Serialize)]
struct Report {
    source: String,
    errors: Vec<ValidationError>,
}

#[derive(Debug, Serialize)]
struct NameEntry<'a> {
    name: &'a str,
    kind: &'static str,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for source in resolve_file_path_patterns(&self.input)? {
            let text = read_source(&source)?;
            let parsed = parse_documents(&source, &text, self.ndjson)?;
            for document in parsed {
                documents.extend(self.preprocess(document)?);
            }
        }
        debug!(documents = documents.len(), "loaded input documents");
        Ok(documents)
    }

    /// JSON pointer first, then the jq filter.
    fn preprocess(&self, document: Document) -> Result<Vec<Document>> {
        let Document { source, mut value } = document;
        if let Some(pointer) = self.json_pointer.as_deref() {
            value = match value.pointer(pointer) {
                Some(selected) => selected.clone(),
                None => bail!("JSON pointer {pointer} selects nothing in {source}"),
            };
        }
        let Some(jq_expr) = self.jq_expr.as_deref() else {
            return Ok(vec![Document { source, value }]);
        };
        let outputs = crate::jq_exec::run_jaq(jq_expr, &value)
            .with_context(|| format!("failed to apply jq expression to {source}"))?;
        Ok(outputs
            .into_iter()
            .enumerate()
            .map(|(index, value)| Document { source: format!("{source}#{index}"), value })
            .collect())
    }
}

impl OutputSettings {
    fn emit(&self, text: &str) -> Result<()> {
        match self.out.as_ref() {
            Some(out) => {
                if let Some(parent) = out.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
            }
            None => {
                println!("{text}");
                Ok(())
            }
        }
    }

    fn emit_reports(&self, reports: &[Report]) -> Result<ExitCode> {
        let text = match self.format {
            Format::Json => serde_json::to_string_pretty(reports)?,
            Format::Text => {
                if self.out.is_some() {
                    colored::control::set_override(false);
                }
                render_text(reports)
            }
        };
        self.emit(&text)?;
        let failed = reports.iter().filter(|r| !r.errors.is_empty()).count();
        info!(documents = reports.len(), failed, "validation finished");
        Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// Exit code 1 when any document failed validation.
    pub fn run(&self) -> Result<ExitCode> {
        let registry = full_registry()?;
        match &self.cmd {
            Command::Check(target) => {
                let descriptor = match (&target.type_name, &target.shape) {
                    (Some(name), _) => {
                        registry.is_type_of(name)?;
                        Descriptor::from(name)
                    }
                    (None, Some(shape)) => crate::path_de::read_with_path::<Descriptor>(shape)?,
                    (None, None) => bail!("one of --type or --shape is required"),
                };
                let documents = target.input_settings.load()?;
                let reports = check_all(&documents, |value| get_errors(&registry, &descriptor, Some(value)))?;
                target.output_settings.emit_reports(&reports)
            }
            Command::Connection(target) => {
                let documents = target.input_settings.load()?;
                let reports = check_all(&documents, |value| connection::constructor_errors(&registry, value))?;
                target.output_settings.emit_reports(&reports)
            }
            Command::Names(target) => {
                let entries: Vec<NameEntry> = registry.names().map(|(name, kind)| NameEntry { name, kind }).collect();
                let text = match target.output_settings.format {
                    Format::Json => serde_json::to_string_pretty(&entries)?,
                    Format::Text => entries
                        .iter()
                        .map(|e| format!("{:<28} {}", e.name, e.kind))
                        .collect::<Vec<_>>()
                        .join("\n"),
                };
                target.output_settings.emit(&text)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Vocabulary plus the connection types, so `names` and `--type` see both.
fn full_registry() -> Result<TypeRegistry> {
    let mut registry = TypeRegistry::bootstrap().context("failed to build the type registry")?;
    connection::register(&mut registry).context("failed to register connection types")?;
    Ok(registry)
}

fn check_all<F>(documents: &[Document], check: F) -> Result<Vec<Report>>
where
    F: Fn(&Value) -> Result<Vec<ValidationError>, SchemaError> + Sync,
{
    let reports = documents
        .par_iter()
        .map(|document| -> Result<Report, SchemaError> {
            Ok(Report { source: document.source.clone(), errors: check(&document.value)? })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;
    Ok(reports)
}

fn render_text(reports: &[Report]) -> String {
    let mut lines = Vec::new();
    for report in reports {
        if report.errors.is_empty() {
            lines.push(format!("{} {}", "ok".green().bold(), report.source));
            continue;
        }
        let count = report.errors.len();
        let noun = if count == 1 { "error" } else { "errors" };
        lines.push(format!("{} {} ({count} {noun})", "fail".red().bold(), report.source));
        for line in render_errors(&report.errors).lines() {
            lines.push(format!("    {line}"));
        }
    }
    lines.join("\n")
}

fn read_source(source: &Path) -> Result<String> {
    if source.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source.display()))
}

/// A whole file is one document; NDJSON yields one per non-blank line.
fn parse_documents(source: &Path, text: &str, ndjson: bool) -> Result<Vec<Document>> {
    let name = source.to_string_lossy();
    if !ndjson {
        let value = crate::path_de::from_str_with_path::<Value>(text)
            .with_context(|| format!("failed to parse JSON source file ({name})"))?;
        return Ok(vec![Document { source: name.to_string(), value }]);
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let source = format!("{name}:{}", index + 1);
            let value = crate::path_de::from_str_with_path::<Value>(line)
                .with_context(|| format!("failed to parse NDJSON line ({source})"))?;
            Ok(Document { source, value })
        })
        .collect()
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("bad glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
