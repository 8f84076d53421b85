//! # BitBake Diagnostics Server (bitbake-diagnostics)
//!
//! A Language Server Protocol (LSP) server that sits next to the BitBake language tooling.
//! The editor forwards the diagnostics that shellcheck, Flake8, Pylint and Pylance report for
//! the generated embedded-language documents of a recipe; the server maps them back onto the
//! recipe, drops known false positives and publishes the rest for the recipe itself.
//!
//! ## Architecture
//! This server uses the Tower LSP framework. The main components are:
//! - Open-document and raw-diagnostic tracking (`server::ClientBridge`)
//! - Embedded-document registry, fed by `bitbake/embeddedDocument` notifications
//! - The reconciler from the library crate, run per generated document and on review

use std::path::PathBuf;
use std::time::Duration;
use std::{borrow::Cow, net::Ipv4Addr, sync::Arc};

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tower_lsp::{async_trait, jsonrpc::Result, lsp_types::*, Client};
use tower_lsp::{LanguageServer, LspService, Server};

use bitbake_diagnostics::embedded_documents::EmbeddedDocuments;
use bitbake_diagnostics::snapshot::Snapshot;
use bitbake_diagnostics::types::EmbeddedLanguageKind;
use bitbake_diagnostics::{ReconcileError, Reconciler};

/// Command-line interface handling
mod cli;

/// Client bridge and the custom protocol
mod server;

use server::{
    ClientBridge, EmbeddedDiagnosticsParams, EmbeddedDocumentParams, PendingUpdates,
    RemoveEmbeddedDocumentsParams,
};

const CMD_REVIEW: &str = "bitbake.reviewDiagnostics";
const CMD_SET_DIAGNOSTICS: &str = "bitbake.setDiagnostics";
const CMD_ENABLE_STATS: &str = "bitbake.diagnostics.enableStats";
const CMD_STATS_REPORT: &str = "bitbake.diagnostics.getStatsReport";

/// Checkers tend to report in bursts; wait for the last report before reconciling
const UPDATE_DEBOUNCE_MS: u64 = 150;

#[derive(Clone)]
struct Backend {
    client: Client,
    bridge: Arc<ClientBridge>,
    reconciler: Arc<Reconciler<ClientBridge, ClientBridge>>,
    // Debounce: pending update task per generated document
    pending_updates: Arc<PendingUpdates>,
}

impl Backend {
    fn new(client: Client) -> Self {
        let embedded = Arc::new(EmbeddedDocuments::new());
        let bridge = Arc::new(ClientBridge::new(client.clone(), embedded.clone()));
        let reconciler = Arc::new(Reconciler::new(bridge.clone(), bridge.clone(), embedded));
        Backend {
            client,
            bridge,
            reconciler,
            pending_updates: Arc::new(PendingUpdates::default()),
        }
    }

    async fn report(&self, error: ReconcileError) {
        tracing::warn!(%error, "reconciliation failed");
        self.client
            .log_message(MessageType::WARNING, format!("BitBake diagnostics: {error}"))
            .await;
    }

    async fn update(&self, uri: &Url) {
        if let Err(error) = self.reconciler.update_diagnostics(uri).await {
            self.report(error).await;
        }
    }

    async fn review(&self) {
        if let Err(error) = self.reconciler.review_diagnostics().await {
            self.report(error).await;
        }
    }

    /// Cancel the pending update of `uri`, if any, and schedule a new one
    async fn schedule_update(&self, uri: Url) {
        let backend = self.clone();
        let uri_for_task = uri.clone();
        self.pending_updates
            .schedule(uri, Duration::from_millis(UPDATE_DEBOUNCE_MS), async move {
                backend.update(&uri_for_task).await;
            })
            .await;
    }

    /// Reconcile the generated documents of a recipe that just became available
    async fn update_recipe(&self, original_uri: &Url) {
        for kind in EmbeddedLanguageKind::ALL {
            if let Some(info) = self.reconciler.embedded().info(original_uri, kind) {
                self.schedule_update(info.uri).await;
            }
        }
    }

    async fn apply_configuration(&self, settings: &Value) {
        let before = self.reconciler.configuration();
        self.reconciler.configure(|config| config.apply(settings));
        let after = self.reconciler.configuration();
        self.client
            .log_message(MessageType::INFO, format!("BitBake diagnostics configuration: {after:?}"))
            .await;

        if before.enabled && !after.enabled {
            self.reconciler.clear().await;
        } else if before != after {
            self.review().await;
        }
    }

    async fn embedded_document(&self, params: EmbeddedDocumentParams) {
        let original_uri = params.original_uri.clone();
        self.reconciler.embedded().register(params.into());
        tracing::debug!(%original_uri, "embedded document registered");
    }

    async fn remove_embedded_documents(&self, params: RemoveEmbeddedDocumentsParams) {
        self.reconciler.embedded().remove_original(&params.original_uri);
    }

    async fn embedded_diagnostics(&self, params: EmbeddedDiagnosticsParams) {
        self.bridge
            .set_raw_diagnostics(params.uri.clone(), params.diagnostics);
        self.schedule_update(params.uri).await;
    }
}

#[async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(init_options) = params.initialization_options {
            self.reconciler.configure(|config| config.apply(&init_options));
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        CMD_REVIEW.to_string(),
                        CMD_SET_DIAGNOSTICS.to_string(),
                        CMD_ENABLE_STATS.to_string(),
                        CMD_STATS_REPORT.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "bitbake-diagnostics".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let config = self.reconciler.configuration();
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "BitBake diagnostics ready: enabled={} importLineThreshold={}",
                    config.enabled, config.import_line_threshold
                ),
            )
            .await;
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        match params.command.as_str() {
            "version" => {
                self.client
                    .show_message(
                        MessageType::INFO,
                        concat!("BitBake diagnostics version: ", env!("CARGO_PKG_VERSION")),
                    )
                    .await;
            }
            CMD_REVIEW => {
                self.review().await;
            }
            CMD_SET_DIAGNOSTICS => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.apply_configuration(&serde_json::json!({ "enableDiagnostics": enabled }))
                        .await;
                }
            }
            CMD_ENABLE_STATS => {
                if let Some(enabled) = params.arguments.first().and_then(Value::as_bool) {
                    self.reconciler.stats().set_enabled(enabled);
                    let message = if enabled {
                        "BitBake diagnostics statistics enabled."
                    } else {
                        "BitBake diagnostics statistics disabled."
                    };
                    self.client.show_message(MessageType::INFO, message).await;
                }
            }
            CMD_STATS_REPORT => {
                let report = self.reconciler.stats().generate_report();
                self.client.log_message(MessageType::INFO, report.clone()).await;
                return Ok(Some(Value::String(report)));
            }
            _ => {}
        }
        Ok(None)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.bridge.set_open_document(uri.clone(), params.text_document.text);
        // Updates were skipped while the recipe was closed.
        self.update_recipe(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change holds the whole document
        if let Some(change) = params.content_changes.into_iter().last() {
            self.bridge
                .set_open_document(params.text_document.uri, change.text);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.bridge.close_document(&params.text_document.uri);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.apply_configuration(&params.settings).await;
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

/// Reconcile snapshot files and print the published diagnostics to stdout
async fn reconcile_snapshots(paths: &[PathBuf]) {
    for path in paths {
        let snapshot = match Snapshot::load(path) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                eprintln!("{error}");
                continue;
            }
        };
        let (workspace, embedded) = snapshot.into_workspace();
        let reconciler = Reconciler::new(workspace.clone(), workspace, embedded);
        if let Err(error) = reconciler.review_diagnostics().await {
            eprintln!("{}: {error}", path.display());
            continue;
        }

        println!("Diagnostics for {}:", path.display());
        let mut uris = reconciler.channels().uris();
        uris.sort();
        if uris.is_empty() {
            println!("  (no diagnostics)");
        }
        for uri in uris {
            println!("  {uri}");
            for d in reconciler.channels().merged(&uri) {
                let sev = match d.severity {
                    Some(DiagnosticSeverity::ERROR) => "ERROR",
                    Some(DiagnosticSeverity::WARNING) => "WARN",
                    Some(DiagnosticSeverity::INFORMATION) => "INFO",
                    Some(DiagnosticSeverity::HINT) => "HINT",
                    _ => "UNKNOWN",
                };
                println!(
                    "    {}:{}:{} [{}] - {}",
                    sev,
                    d.range.start.line,
                    d.range.start.character,
                    d.source.as_deref().unwrap_or_default(),
                    d.message
                );
            }
        }
        println!();
    }
}

#[tokio::main]
async fn main() {
    use clap::Parser as _;
    let cli = cli::Cli::parse();
    init_tracing();

    if !cli.reconcile.is_empty() {
        reconcile_snapshots(&cli.reconcile).await;
        return;
    }

    let (service, socket) = LspService::build(Backend::new)
        .custom_method(server::EMBEDDED_DOCUMENT, Backend::embedded_document)
        .custom_method(server::REMOVE_EMBEDDED_DOCUMENTS, Backend::remove_embedded_documents)
        .custom_method(server::EMBEDDED_DIAGNOSTICS, Backend::embedded_diagnostics)
        .finish();

    if !cli.listen && cli.host.is_none() {
        // stdin/stdout
        Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
            .serve(service)
            .await;
    } else if cli.listen {
        let host = cli
            .host
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed("127.0.0.1"))
            .parse::<Ipv4Addr>()
            .expect("Could not parse IP address");

        let port = cli.port.unwrap_or(9258);

        let stream = {
            let listener = TcpListener::bind((host, port))
                .await
                .expect("Could not bind TCP listener");
            let (stream, _) = listener.accept().await.expect("Could not accept client");
            stream
        };

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    } else {
        let host = cli.host.expect("No host given");
        let port = cli.port.expect("No port given");

        let stream = TcpStream::connect((host, port))
            .await
            .expect("Could not open TCP stream");

        let (input, output) = tokio::io::split(stream);
        Server::new(input, output, socket).serve(service).await;
    }
}
