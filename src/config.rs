use std::path::Path;

use anyhow::anyhow;
use config::{Config, File, FileFormat};
use log::LevelFilter;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// Root document of a multi-file project; its bibliography is always in scope
    pub root_file: String,
    pub use_default_bib: bool,
    pub default_bib: Vec<String>,
    /// Drop files from the index once no document refers to them
    pub forget_unused_bib: bool,
    pub completion_detail_fields: Vec<String>,
    pub citation_label: CitationLabel,
    pub view_type: ViewType,
    pub metadata_dialect: MetadataDialect,
    pub show_log: bool,
    pub debounce_ms: u64,
    pub hover: bool,
}

/// What a citation completion item shows as its label.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum CitationLabel {
    Key,
    Title,
    Authors,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum ViewType {
    /// Regular completion list
    List,
    /// Pick from a message request, then insert via workspace edit
    Browser,
}

/// Where the `bibliography` declaration of a document is looked for.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum MetadataDialect {
    /// Front matter first, then the line pattern
    Auto,
    Yaml,
    Line,
}

impl Settings {
    /// Layers defaults, the user file, the workspace file and the client's
    /// `initializationOptions`, later sources winning.
    pub fn new(
        root_dir: &Path,
        init_options: Option<&serde_json::Value>,
    ) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/citer/settings");
        let mut builder = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.citer",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("root_file", "")?
            .set_default("use_default_bib", false)?
            .set_default("default_bib", Vec::<String>::new())?
            .set_default("forget_unused_bib", true)?
            .set_default("completion_detail_fields", vec!["title"])?
            .set_default("citation_label", "Key")?
            .set_default("view_type", "List")?
            .set_default("metadata_dialect", "Auto")?
            .set_default("show_log", false)?
            .set_default("debounce_ms", 500_i64)?
            .set_default("hover", true)?;

        if let Some(options) = init_options.filter(|options| options.is_object()) {
            builder = builder.add_source(File::from_str(&options.to_string(), FileFormat::Json));
        }

        let settings = builder
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.show_log {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            root_file: "".to_string(),
            use_default_bib: false,
            default_bib: vec![],
            forget_unused_bib: true,
            completion_detail_fields: vec!["title".to_string()],
            citation_label: CitationLabel::Key,
            view_type: ViewType::List,
            metadata_dialect: MetadataDialect::Auto,
            show_log: false,
            debounce_ms: 500,
            hover: true,
        }
    }
}
