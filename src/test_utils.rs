//! Shared test utilities for citer.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a temporary workspace directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the workspace subdirectory
///
/// The workspace is a non-hidden `workspace` subdirectory, so relative
/// bibliography paths never start with a dot directory.
///
/// # Example
///
/// ```ignore
/// use crate::test_utils::create_test_workspace_dir;
///
/// let (_temp_dir, workspace) = create_test_workspace_dir();
/// std::fs::write(workspace.join("refs.bib"), "@misc{a}").unwrap();
/// ```
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace = temp_dir.path().join("workspace");
    fs::create_dir(&workspace).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace)
}

/// Writes `content` to `relative` inside `workspace`, creating parent
/// directories, and returns the full path.
pub fn write_file(workspace: &Path, relative: &str, content: &str) -> PathBuf {
    let path = workspace.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(&path, content).expect("Failed to write test file");
    path
}

/// A small BibTeX file with three entries on known lines.
///
/// | key | line |
/// |-----|------|
/// | `doe2020` | 0 |
/// | `roe2019` | 6 |
/// | `poe1845` | 11 |
pub const SAMPLE_BIB: &str = r#"@article{doe2020,
  author = {Doe, Jane and Smith, John},
  title = {A Study of Things},
  journal = {Journal of Things},
  year = 2020
}
@book{roe2019,
  author = {Roe, Richard},
  title = {Collected Works},
  publisher = {Example Press}
}
@misc{poe1845,
  title = "The Raven"
}
"#;
