//! The language server.
//!
//! Request handlers only read: they take the open document from
//! `documents` and a short read lock on the index. All index writes happen on
//! the watch service task, fed through `watch_tx`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ropey::Rope;
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::commands::{self, BROWSE, COMMANDS, LIST_DUPLICATE_KEYS};
use crate::completion::{citation_context, get_completions, CitationContext};
use crate::config::{Settings, ViewType};
use crate::diagnostics::format_duplicate_keys;
use crate::discovery::{discover, DiscoveryInput};
use crate::document::{is_recognized, Document};
use crate::gotodef::goto_definition;
use crate::hover::hover;
use crate::index::{BibliographyIndex, SharedIndex};
use crate::watcher::{
    send_event, Notice, NotifyWatcher, WatchCoordinator, WatchEvent, WatchService,
};

/// Sent by clients when the focused editor changes, including to a document
/// that was opened earlier.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveEditorChangedParams {
    uri: Url,
    language_id: Option<String>,
}

pub struct Backend {
    client: Client,
    index: SharedIndex,
    documents: Arc<RwLock<HashMap<PathBuf, Document>>>,
    settings: Arc<RwLock<Settings>>,
    workspace_root: Arc<RwLock<Option<PathBuf>>>,
    watch_tx: mpsc::UnboundedSender<WatchEvent>,
    /// Taken when the service starts in `initialized`.
    watch_rx: Mutex<Option<mpsc::UnboundedReceiver<WatchEvent>>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        Self {
            client,
            index: BibliographyIndex::shared(),
            documents: Arc::new(RwLock::new(HashMap::new())),
            settings: Arc::new(RwLock::new(Settings::default())),
            workspace_root: Arc::new(RwLock::new(None)),
            watch_tx,
            watch_rx: Mutex::new(Some(watch_rx)),
        }
    }

    fn apply_log_level(settings: &Settings) {
        if std::env::var_os("RUST_LOG").is_none() {
            log::set_max_level(settings.log_level());
        }
    }

    async fn load_settings(&self, options: Option<&serde_json::Value>) {
        let root = self.workspace_root.read().await.clone();
        let root = root.unwrap_or_else(|| PathBuf::from("."));

        match Settings::new(&root, options) {
            Ok(settings) => {
                Self::apply_log_level(&settings);
                *self.settings.write().await = settings;
            }
            Err(err) => {
                self.client
                    .log_message(MessageType::ERROR, format!("Invalid citer settings: {err}"))
                    .await;
            }
        }
    }

    /// Starts the watch service and the task that forwards its notices.
    async fn start_watching(&self) {
        let Some(watch_rx) = self.watch_rx.lock().take() else {
            return;
        };

        let debounce = Duration::from_millis(self.settings.read().await.debounce_ms);

        let watcher = match NotifyWatcher::new(self.watch_tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log::error!("{err}; changes on disk will not be picked up");
                None
            }
        };

        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let coordinator =
            WatchCoordinator::new(self.index.clone(), watcher).with_notices(notice_tx);
        tokio::spawn(WatchService::new(coordinator, watch_rx, debounce).run());

        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(notice) = notice_rx.recv().await {
                match notice {
                    Notice::DuplicateKeys(keys) => {
                        client
                            .show_message(MessageType::INFO, format_duplicate_keys(&keys))
                            .await;
                    }
                }
            }
        });
    }

    /// Recomputes the bibliography scope of an open document.
    async fn refresh_scope(&self, path: &Path) {
        let text = {
            let documents = self.documents.read().await;
            let Some(document) = documents.get(path) else {
                return;
            };
            if !is_recognized(document.language_id.as_deref(), path) {
                return;
            }
            document.rope.to_string()
        };

        let settings = self.settings.read().await.clone();
        let root = self.workspace_root.read().await.clone();

        let scope = discover(
            &DiscoveryInput {
                text: &text,
                path,
                workspace_root: root.as_deref(),
            },
            &settings,
        );

        let event = WatchEvent::Scope {
            scope,
            prune: settings.forget_unused_bib,
        };
        if let Err(err) = send_event(&self.watch_tx, event) {
            log::error!("{err}; bibliography scope not updated");
        }
    }

    /// Lets the user pick a record and inserts its key over `citation`.
    fn open_browser(&self, uri: Url, citation: CitationContext) {
        let items = commands::browse_matching(
            &self.index.read(),
            &citation.query,
            commands::BROWSER_LIMIT,
        );
        if items.is_empty() {
            return;
        }

        let client = self.client.clone();
        tokio::spawn(async move {
            let actions = commands::pick_actions(&items);
            let choice = client
                .show_message_request(MessageType::INFO, "Select a citation", Some(actions))
                .await;

            let key = match &choice {
                Ok(Some(action)) => commands::chosen_key(&items, action),
                Ok(None) => None,
                Err(err) => {
                    log::warn!("citation browser failed: {err}");
                    None
                }
            };
            let Some(key) = key else {
                return;
            };

            let edit = WorkspaceEdit {
                changes: Some(HashMap::from([(
                    uri,
                    vec![TextEdit {
                        range: citation.range,
                        new_text: key.to_string(),
                    }],
                )])),
                ..Default::default()
            };
            if let Err(err) = client.apply_edit(edit).await {
                log::warn!("could not insert citation: {err}");
            }
        });
    }

    async fn active_editor_changed(&self, params: ActiveEditorChangedParams) {
        let Ok(path) = params.uri.to_file_path() else {
            return;
        };

        if let Some(language_id) = params.language_id {
            if let Some(document) = self.documents.write().await.get_mut(&path) {
                document.language_id = Some(language_id);
            }
        }

        self.refresh_scope(&path).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| folder.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                let root_uri = params.root_uri.as_ref();
                root_uri.and_then(|uri| uri.to_file_path().ok())
            });
        *self.workspace_root.write().await = root;

        self.load_settings(params.initialization_options.as_ref())
            .await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["@".to_string()]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: COMMANDS.iter().map(|command| command.to_string()).collect(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "citer".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.start_watching().await;
        self.client
            .log_message(MessageType::INFO, "citer initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.load_settings(Some(&params.settings)).await;
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Ok(path) = params.text_document.uri.to_file_path() else {
            return;
        };

        self.documents.write().await.insert(
            path.clone(),
            Document::new(
                &params.text_document.text,
                Some(params.text_document.language_id),
            ),
        );
        self.refresh_scope(&path).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Ok(path) = params.text_document.uri.to_file_path() else {
            return;
        };
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };

        self.documents
            .write()
            .await
            .entry(path)
            .and_modify(|document| document.rope = Rope::from_str(&change.text))
            .or_insert_with(|| Document::new(&change.text, None));
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Ok(path) = params.text_document.uri.to_file_path() else {
            return;
        };
        self.refresh_scope(&path).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Ok(path) = params.text_document.uri.to_file_path() {
            self.documents.write().await.remove(&path);
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Ok(path) = uri.to_file_path() else {
            return Ok(None);
        };

        let documents = self.documents.read().await;
        let Some(document) = documents.get(&path) else {
            return Ok(None);
        };
        let settings = self.settings.read().await;

        if settings.view_type == ViewType::Browser {
            if let Some(citation) = citation_context(&document.rope, position) {
                self.open_browser(uri.clone(), citation);
            }
        }

        Ok(get_completions(
            &self.index.read(),
            &document.rope,
            position,
            &settings,
        ))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params.position;
        let Ok(path) = params
            .text_document_position_params
            .text_document
            .uri
            .to_file_path()
        else {
            return Ok(None);
        };

        let documents = self.documents.read().await;
        let Some(document) = documents.get(&path) else {
            return Ok(None);
        };
        let settings = self.settings.read().await;

        Ok(hover(&self.index.read(), &document.rope, position, &settings))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let Ok(path) = params
            .text_document_position_params
            .text_document
            .uri
            .to_file_path()
        else {
            return Ok(None);
        };

        let documents = self.documents.read().await;
        let Some(document) = documents.get(&path) else {
            return Ok(None);
        };

        Ok(goto_definition(&self.index.read(), &document.rope, position)
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        match params.command.as_str() {
            BROWSE => {
                let items = commands::browse(&self.index.read());
                Ok(serde_json::to_value(items).ok())
            }
            LIST_DUPLICATE_KEYS => {
                let duplicates = commands::list_duplicate_keys(&self.index.read());
                if duplicates.is_empty() {
                    self.client
                        .show_message(MessageType::INFO, "No duplicate keys")
                        .await;
                }
                Ok(serde_json::to_value(duplicates).ok())
            }
            other => {
                log::warn!("unknown command {other}");
                Ok(None)
            }
        }
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method("citer/activeEditorChanged", Backend::active_editor_changed)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
