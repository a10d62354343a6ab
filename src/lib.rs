//! citer: citations for Pandoc Markdown over the Language Server Protocol
//!
//! This crate provides the citation index engine behind the `citer` server.
//! It finds the bibliography files a document uses, parses them, keeps them
//! indexed while they change on disk, and answers completion, hover and
//! go-to-definition requests from that index.
//!
//! # Overview
//!
//! - **Parsing**: BibTeX-style `@type{key, ...}` blocks and CSL-JSON
//! - **Discovery**: `bibliography:` in front matter or on a line, a root
//!   document, and default bibliographies
//! - **Watching**: one service task applies scope changes and on-disk edits
//! - **Queries**: citation and pandoc-crossref completion, hover, definition,
//!   duplicate keys, a citation browser
//!
//! # Architecture
//!
//! - [`bib`]: bibliography text to [`bib::CitationRecord`]s
//! - [`index`]: records per file, shared as [`index::SharedIndex`]
//! - [`discovery`]: which files are in scope for a document
//! - [`watcher`]: keeps the index in step with scope and the filesystem
//! - [`completion`], [`hover`], [`gotodef`], [`commands`], [`diagnostics`]:
//!   read-only views of the index
//! - [`backend`]: the `tower-lsp` server
//!
//! # Usage
//!
//! ```ignore
//! use citer::{bib, index::BibliographyIndex};
//!
//! let parsed = bib::read_source(&path)?;
//! let mut index = BibliographyIndex::new();
//! index.set_records(&path, parsed.records);
//! let duplicates = index.duplicate_keys();
//! ```

// Index engine
pub mod bib;
pub mod discovery;
pub mod index;
pub mod watcher;

// LSP feature modules
pub mod commands;
pub mod completion;
pub mod crossref;
pub mod diagnostics;
pub mod document;
pub mod gotodef;
pub mod hover;

// Server and configuration
pub mod backend;
pub mod cli;
pub mod config;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
