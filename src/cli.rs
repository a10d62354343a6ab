//! Command line interface.
//!
//! ```text
//! citer                                  # language server on stdio
//! citer serve                            # same
//! citer scope paper.md --workspace .     # bibliography files paper.md uses
//! citer parse refs.bib [--json]          # records in refs.bib
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;

use crate::bib::{self, CitationRecord, ParsedSource};
use crate::config::Settings;
use crate::discovery::{self, normalize_path, DiscoveryInput, ScopeResult};
use crate::index::BibliographyIndex;

#[derive(Parser, Debug)]
#[command(name = "citer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the language server on stdio (the default)
    Serve,
    /// Print the bibliography files a document refers to
    Scope {
        document: PathBuf,
        /// Workspace root; defaults to the document's directory
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Parse a bibliography file and print its records
    Parse {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

/// Sets up `env_logger` on stderr. `RUST_LOG` wins; otherwise only warnings
/// are shown until settings raise the level.
pub fn init_logging() {
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let mut builder = env_logger::Builder::from_default_env();
    if !from_env {
        builder.filter_level(LevelFilter::Info);
    }
    builder.init();

    if !from_env {
        log::set_max_level(LevelFilter::Warn);
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = std::env::current_dir().context("Can't read current directory")?;
    Ok(normalize_path(&cwd.join(path)))
}

/// Runs discovery for `document` the way the server would on open.
pub fn scope_for(document: &Path, workspace: Option<&Path>) -> anyhow::Result<ScopeResult> {
    let document = absolute(document)?;
    let workspace = workspace.map(absolute).transpose()?;

    let text = std::fs::read_to_string(&document)
        .with_context(|| format!("Failed to read {}", document.display()))?;

    let settings_root = workspace
        .clone()
        .or_else(|| document.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let settings = Settings::new(&settings_root, None)?;

    Ok(discovery::discover(
        &DiscoveryInput {
            text: &text,
            path: &document,
            workspace_root: workspace.as_deref(),
        },
        &settings,
    ))
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    #[serde(flatten)]
    record: &'a CitationRecord,
    line: u32,
}

/// Records one per line (`key type line`), or a JSON array.
pub fn render_records(parsed: &ParsedSource, json: bool) -> anyhow::Result<String> {
    if json {
        let records: Vec<_> = parsed
            .records
            .iter()
            .map(|record| RecordOutput {
                record,
                line: record.position.line + 1,
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&records)?);
    }

    let mut out = String::new();
    for record in &parsed.records {
        writeln!(
            out,
            "{}\t{}\t{}",
            record.key,
            record.entry_type,
            record.position.line + 1
        )?;
    }
    Ok(out)
}

pub fn run_scope(document: &Path, workspace: Option<&Path>) -> anyhow::Result<()> {
    for path in scope_for(document, workspace)? {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn run_parse(file: &Path, json: bool) -> anyhow::Result<()> {
    let file = absolute(file)?;
    let parsed = bib::read_source(&file)?;

    print!("{}", render_records(&parsed, json)?);
    if json {
        println!();
    }

    for warning in &parsed.warnings {
        eprintln!("warning: {warning}");
    }

    let mut index = BibliographyIndex::new();
    index.set_records(&file, parsed.records);
    let duplicates = index.duplicate_keys();
    if !duplicates.is_empty() {
        eprintln!("{}", crate::diagnostics::format_duplicate_keys(&duplicates));
    }

    Ok(())
}
