//! Language-server side of the reconciler
//!
//! The editor extension forwards the diagnostics of generated documents and the generated
//! documents themselves through custom notifications. Definitions and embedded-language
//! regions are asked back from the client, which owns the BitBake language tooling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tower_lsp::async_trait;
use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::{
    Diagnostic, GotoDefinitionResponse, Location, Position, TextDocumentIdentifier,
    TextDocumentPositionParams, Url,
};
use tokio::task::JoinHandle;
use tower_lsp::Client;

use bitbake_diagnostics::embedded_documents::{EmbeddedDocument, EmbeddedDocuments};
use bitbake_diagnostics::host::{DiagnosticsHost, LanguageQueries};
use bitbake_diagnostics::types::{CharacterIndexes, EmbeddedDocInfo, EmbeddedLanguageKind, RawDiagnostic};
use bitbake_diagnostics::{ReconcileError, Result};

pub const EMBEDDED_DOCUMENT: &str = "bitbake/embeddedDocument";
pub const REMOVE_EMBEDDED_DOCUMENTS: &str = "bitbake/removeEmbeddedDocuments";
pub const EMBEDDED_DIAGNOSTICS: &str = "bitbake/embeddedDiagnostics";

/// Definitions of the symbol at a position of a recipe
pub enum GetDefinition {}

impl Request for GetDefinition {
    type Params = TextDocumentPositionParams;
    type Result = Option<GotoDefinitionResponse>;
    const METHOD: &'static str = "bitbake/getDefinition";
}

/// Embedded language covering a position of a recipe
pub enum GetEmbeddedLanguageTypeOnPosition {}

impl Request for GetEmbeddedLanguageTypeOnPosition {
    type Params = TextDocumentPositionParams;
    type Result = Option<EmbeddedLanguageKind>;
    const METHOD: &'static str = "bitbake/getEmbeddedLanguageTypeOnPosition";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDocumentParams {
    pub original_uri: Url,
    pub kind: EmbeddedLanguageKind,
    pub uri: Url,
    pub character_indexes: CharacterIndexes,
    #[serde(default)]
    pub content: Option<String>,
}

impl From<EmbeddedDocumentParams> for EmbeddedDocument {
    fn from(params: EmbeddedDocumentParams) -> Self {
        EmbeddedDocument {
            original_uri: params.original_uri,
            kind: params.kind,
            info: EmbeddedDocInfo {
                uri: params.uri,
                character_indexes: params.character_indexes,
            },
            content: params.content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEmbeddedDocumentsParams {
    pub original_uri: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedDiagnosticsParams {
    pub uri: Url,
    pub diagnostics: Vec<RawDiagnostic>,
}

/// Host and query service backed by the connected client
pub struct ClientBridge {
    client: Client,
    open_documents: DashMap<Url, String>,
    raw_diagnostics: DashMap<Url, Vec<RawDiagnostic>>,
    embedded: Arc<EmbeddedDocuments>,
}

impl ClientBridge {
    pub fn new(client: Client, embedded: Arc<EmbeddedDocuments>) -> Self {
        ClientBridge {
            client,
            open_documents: DashMap::new(),
            raw_diagnostics: DashMap::new(),
            embedded,
        }
    }

    pub fn set_open_document(&self, uri: Url, text: String) {
        self.open_documents.insert(uri, text);
    }

    pub fn close_document(&self, uri: &Url) {
        self.open_documents.remove(uri);
    }

    pub fn set_raw_diagnostics(&self, uri: Url, diagnostics: Vec<RawDiagnostic>) {
        if diagnostics.is_empty() {
            self.raw_diagnostics.remove(&uri);
        } else {
            self.raw_diagnostics.insert(uri, diagnostics);
        }
    }

    fn position_params(uri: &Url, position: Position) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position,
        }
    }
}

fn into_locations(response: GotoDefinitionResponse) -> Vec<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location::new(link.target_uri, link.target_selection_range))
            .collect(),
    }
}

#[async_trait]
impl DiagnosticsHost for ClientBridge {
    async fn diagnostics(&self, uri: &Url) -> Vec<RawDiagnostic> {
        self.raw_diagnostics
            .get(uri)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    async fn uris_with_diagnostics(&self) -> Vec<Url> {
        self.raw_diagnostics
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn open_document(&self, uri: &Url) -> Option<String> {
        self.open_documents.get(uri).map(|entry| entry.value().clone())
    }

    async fn read_document(&self, uri: &Url) -> Result<String> {
        self.embedded.read(uri).await
    }

    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

#[async_trait]
impl LanguageQueries for ClientBridge {
    async fn definitions(&self, uri: &Url, position: Position) -> Result<Vec<Location>> {
        let response = self
            .client
            .send_request::<GetDefinition>(Self::position_params(uri, position))
            .await
            .map_err(|source| ReconcileError::Request {
                method: GetDefinition::METHOD,
                source,
            })?;
        Ok(response.map(into_locations).unwrap_or_default())
    }

    async fn embedded_language_at(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<EmbeddedLanguageKind>> {
        self.client
            .send_request::<GetEmbeddedLanguageTypeOnPosition>(Self::position_params(uri, position))
            .await
            .map_err(|source| ReconcileError::Request {
                method: GetEmbeddedLanguageTypeOnPosition::METHOD,
                source,
            })
    }
}

/// Debounced task per document. A task only clears its own entry when it finishes, so a
/// newer schedule for the same document stays abortable.
#[derive(Default)]
pub struct PendingUpdates {
    next_id: AtomicU64,
    tasks: tokio::sync::Mutex<HashMap<Url, (u64, JoinHandle<()>)>>,
}

impl PendingUpdates {
    /// Abort the pending task of `uri`, if any, and run `task` once `delay` has passed
    pub async fn schedule<F>(self: &Arc<Self>, uri: Url, delay: Duration, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if let Some((_, handle)) = tasks.remove(&uri) {
            handle.abort();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = self.clone();
        let key = uri.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            pending.finish(&key, id).await;
        });
        tasks.insert(uri, (id, handle));
        id
    }

    async fn finish(&self, uri: &Url, id: u64) {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(uri).is_some_and(|(current, _)| *current == id) {
            tasks.remove(uri);
        }
    }

    pub async fn is_pending(&self, uri: &Url) -> bool {
        self.tasks.lock().await.contains_key(uri)
    }
}
