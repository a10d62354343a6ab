//! Bibliography file discovery.
//!
//! Works out which bibliography files are in scope for the active document.
//! Three rules contribute, in this order:
//!
//! 1. the `bibliography` declaration of the active document;
//! 2. the `bibliography` declaration of the configured root document;
//! 3. the configured default bibliographies.
//!
//! Every name is resolved to an absolute, normalized path and probed for
//! existence. Files that do not exist are left out.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::{MetadataDialect, Settings};

/// Existing bibliography files, in the order the rules found them.
pub type ScopeResult = IndexSet<PathBuf>;

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryInput<'a> {
    /// Current text of the active document.
    pub text: &'a str,
    /// Path of the active document.
    pub path: &'a Path,
    pub workspace_root: Option<&'a Path>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize, Debug)]
struct RawFrontmatter {
    #[serde(default)]
    bibliography: Option<OneOrMany>,
}

fn front_matter_bibliography(text: &str) -> Option<Vec<String>> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?s)\A---\r?\n(?<metadata>.*?)\r?\n(?:---|\.\.\.)[ \t]*(?:\r?\n|\z)")
            .expect("Invalid front matter regex")
    });

    let metadata = RE.captures(text)?.name("metadata")?;
    let raw: RawFrontmatter = serde_yaml::from_str(metadata.as_str()).ok()?;

    match raw.bibliography? {
        OneOrMany::One(name) => Some(vec![name]),
        OneOrMany::Many(names) => Some(names),
    }
}

fn line_bibliography(text: &str) -> Option<Vec<String>> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^bibliography:[ \t]*(?<value>.*?)[ \t\r]*$")
            .expect("Invalid bibliography line regex")
    });

    let value = RE.captures(text)?.name("value")?.as_str();

    let names = match value.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        None if value.is_empty() => vec![],
        None => vec![value.to_string()],
    };

    Some(names)
}

/// The raw bibliography names a document declares.
pub fn declared_bibliographies(text: &str, dialect: MetadataDialect) -> Vec<String> {
    let names = match dialect {
        MetadataDialect::Yaml => front_matter_bibliography(text),
        MetadataDialect::Line => line_bibliography(text),
        MetadataDialect::Auto => {
            front_matter_bibliography(text).or_else(|| line_bibliography(text))
        }
    };
    names.unwrap_or_default()
}

/// Removes one matching pair of surrounding `"` or `'`.
pub fn strip_quotes(raw: &str) -> &str {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Resolves `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    components.into_iter().collect()
}

/// Files a bibliography name may refer to, most likely first.
fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut with_bib = path.as_os_str().to_owned();
    with_bib.push(".bib");
    let with_bib = PathBuf::from(with_bib);

    if path.extension().is_none() {
        vec![with_bib, path.to_path_buf(), path.with_extension("json")]
    } else {
        vec![path.to_path_buf(), with_bib]
    }
}

/// Resolves one declared name against `base` to an existing file.
pub fn resolve(raw: &str, base: &Path) -> Option<PathBuf> {
    let name = strip_quotes(raw);
    if name.is_empty() {
        return None;
    }

    let name = Path::new(name);
    let joined = if name.is_absolute() {
        name.to_path_buf()
    } else {
        base.join(name)
    };
    let normalized = normalize_path(&joined);

    let found = candidates(&normalized).into_iter().find(|candidate| {
        let exists = candidate.is_file();
        log::debug!("bibliography candidate {} exists: {exists}", candidate.display());
        exists
    });

    if found.is_none() {
        log::debug!("no bibliography file for {raw:?} under {}", base.display());
    }
    found
}

fn extend(scope: &mut ScopeResult, names: &[String], base: &Path) {
    for name in names {
        if let Some(path) = resolve(name, base) {
            if scope.insert(path.clone()) {
                log::info!("found bibliography {}", path.display());
            }
        }
    }
}

pub fn discover(input: &DiscoveryInput, settings: &Settings) -> ScopeResult {
    let mut scope = ScopeResult::new();
    let base = input
        .workspace_root
        .or_else(|| input.path.parent())
        .unwrap_or(Path::new(""));

    let declared = declared_bibliographies(input.text, settings.metadata_dialect);
    extend(&mut scope, &declared, base);

    if !settings.root_file.is_empty() {
        let root_file = shellexpand::tilde(&settings.root_file);
        let root = normalize_path(&base.join(&*root_file));
        match fs::read_to_string(&root) {
            Ok(text) => {
                let declared = declared_bibliographies(&text, settings.metadata_dialect);
                extend(&mut scope, &declared, root.parent().unwrap_or(base));
            }
            Err(err) => log::warn!("could not read root file {}: {err}", root.display()),
        }
    }

    if settings.use_default_bib {
        let defaults: Vec<String> = settings
            .default_bib
            .iter()
            .map(|name| shellexpand::tilde(strip_quotes(name)).into_owned())
            .collect();
        extend(&mut scope, &defaults, base);
    }

    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_workspace_dir, write_file};

    fn discover_in(workspace: &Path, text: &str, settings: &Settings) -> Vec<PathBuf> {
        let path = workspace.join("doc.md");
        let input = DiscoveryInput {
            text,
            path: &path,
            workspace_root: Some(workspace),
        };
        discover(&input, settings).into_iter().collect()
    }

    #[test]
    fn test_line_list_with_quotes_and_inferred_extension() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", "");
        let extra = write_file(&workspace, "extra.bib", "");

        let found = discover_in(
            &workspace,
            "# Doc\nbibliography: [refs.bib, \"extra\"]\n",
            &Settings::default(),
        );

        assert_eq!(found, vec![refs, extra]);
    }

    #[test]
    fn test_front_matter_single_and_list() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", "");
        let more = write_file(&workspace, "bib/more.bib", "");

        let single = discover_in(
            &workspace,
            "---\ntitle: Paper\nbibliography: refs.bib\n---\nBody",
            &Settings::default(),
        );
        let list = discover_in(
            &workspace,
            "---\nbibliography:\n  - refs.bib\n  - 'bib/more'\n---\nBody",
            &Settings::default(),
        );

        assert_eq!(single, vec![refs.clone()]);
        assert_eq!(list, vec![refs, more]);
    }

    #[test]
    fn test_dialect_restricts_sources() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", "");
        let text = "Some prose\nbibliography: refs.bib\n";

        let yaml_only = Settings {
            metadata_dialect: MetadataDialect::Yaml,
            ..Default::default()
        };
        let line_only = Settings {
            metadata_dialect: MetadataDialect::Line,
            ..Default::default()
        };

        assert!(discover_in(&workspace, text, &yaml_only).is_empty());
        assert_eq!(discover_in(&workspace, text, &line_only), vec![refs]);
    }

    #[test]
    fn test_extension_inference() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let versioned = write_file(&workspace, "refs.v2.bib", "");
        let csl = write_file(&workspace, "library.json", "[]");

        let found = discover_in(
            &workspace,
            "bibliography: [refs.v2, library]",
            &Settings::default(),
        );

        assert_eq!(found, vec![versioned, csl]);
    }

    #[test]
    fn test_missing_files_and_duplicates_are_dropped() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", "");

        let found = discover_in(
            &workspace,
            "bibliography: [nope.bib, refs, ./refs.bib, sub/../refs.bib]",
            &Settings::default(),
        );

        assert_eq!(found, vec![refs]);
    }

    #[test]
    fn test_root_file_resolves_relative_to_itself() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        write_file(
            &workspace,
            "book/main.md",
            "---\nbibliography: chapters.bib\n---\n",
        );
        let chapters = write_file(&workspace, "book/chapters.bib", "");

        let settings = Settings {
            root_file: "book/main.md".to_string(),
            ..Default::default()
        };
        let found = discover_in(&workspace, "No declaration here.", &settings);

        assert_eq!(found, vec![chapters]);
    }

    #[test]
    fn test_unreadable_root_file_is_skipped() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", "");

        let settings = Settings {
            root_file: "missing.md".to_string(),
            ..Default::default()
        };
        let found = discover_in(&workspace, "bibliography: refs.bib", &settings);

        assert_eq!(found, vec![refs]);
    }

    #[test]
    fn test_default_bib_only_when_enabled() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let global = write_file(&workspace, "global/library.bib", "");

        let mut settings = Settings {
            default_bib: vec![global.to_string_lossy().into_owned()],
            ..Default::default()
        };
        assert!(discover_in(&workspace, "", &settings).is_empty());

        settings.use_default_bib = true;
        assert_eq!(discover_in(&workspace, "", &settings), vec![global]);
    }

    #[test]
    fn test_document_directory_without_workspace() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "notes/refs.bib", "");
        let doc = workspace.join("notes/doc.md");

        let input = DiscoveryInput {
            text: "bibliography: refs.bib",
            path: &doc,
            workspace_root: None,
        };
        let found: Vec<_> = discover(&input, &Settings::default()).into_iter().collect();

        assert_eq!(found, vec![refs]);
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"refs.bib\""), "refs.bib");
        assert_eq!(strip_quotes("'refs.bib'"), "refs.bib");
        assert_eq!(strip_quotes("\"refs.bib'"), "\"refs.bib'");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/proj/./a/../refs.bib")),
            PathBuf::from("/proj/refs.bib")
        );
        assert_eq!(
            normalize_path(Path::new("/../refs.bib")),
            PathBuf::from("/refs.bib")
        );
    }

    #[test]
    fn test_declared_bibliographies_empty_list() {
        assert!(declared_bibliographies("bibliography: []", MetadataDialect::Auto).is_empty());
        assert!(declared_bibliographies("no metadata", MetadataDialect::Auto).is_empty());
    }
}
