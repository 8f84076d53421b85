//! In-memory workspace loaded from a JSON snapshot
//!
//! A snapshot captures everything the reconciler asks its collaborators for: open recipes,
//! generated documents, raw checker diagnostics, definitions and embedded-language regions.
//! It backs the `--reconcile` command-line mode and the reconciler tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tower_lsp::async_trait;
use tower_lsp::lsp_types::{Diagnostic, Location, Position, Range, Url};

use crate::embedded_documents::{EmbeddedDocument, EmbeddedDocuments};
use crate::error::{ReconcileError, Result};
use crate::host::{DiagnosticsHost, LanguageQueries};
use crate::types::{range_contains, CharacterIndexes, EmbeddedDocInfo, EmbeddedLanguageKind, RawDiagnostic};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEmbeddedDocument {
    pub original_uri: Url,
    pub kind: EmbeddedLanguageKind,
    pub uri: Url,
    pub character_indexes: CharacterIndexes,
    pub content: String,
}

/// A symbol whose definition is found from any position inside `range`
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotDefinition {
    pub uri: Url,
    pub range: Range,
    pub target: Location,
}

/// A region of a recipe written in an embedded language
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRegion {
    pub uri: Url,
    pub kind: EmbeddedLanguageKind,
    pub range: Range,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub open_documents: HashMap<Url, String>,
    #[serde(default)]
    pub embedded_documents: Vec<SnapshotEmbeddedDocument>,
    #[serde(default)]
    pub diagnostics: HashMap<Url, Vec<RawDiagnostic>>,
    #[serde(default)]
    pub definitions: Vec<SnapshotDefinition>,
    #[serde(default)]
    pub regions: Vec<SnapshotRegion>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let snapshot_error = |message: String| ReconcileError::Snapshot {
            path: path.to_path_buf(),
            message,
        };
        let json = std::fs::read_to_string(path).map_err(|e| snapshot_error(e.to_string()))?;
        Self::from_json(&json).map_err(|e| snapshot_error(e.to_string()))
    }

    /// Register the generated documents and turn the snapshot into a host
    pub fn into_workspace(self) -> (Arc<SnapshotWorkspace>, Arc<EmbeddedDocuments>) {
        let embedded = Arc::new(EmbeddedDocuments::new());
        for document in &self.embedded_documents {
            embedded.register(EmbeddedDocument {
                original_uri: document.original_uri.clone(),
                kind: document.kind,
                info: EmbeddedDocInfo {
                    uri: document.uri.clone(),
                    character_indexes: document.character_indexes.clone(),
                },
                content: Some(document.content.clone()),
            });
        }
        let workspace = SnapshotWorkspace {
            snapshot: self,
            embedded: embedded.clone(),
            published: Mutex::new(Vec::new()),
        };
        (Arc::new(workspace), embedded)
    }
}

/// Host and query service over a snapshot, recording every publish
#[derive(Debug)]
pub struct SnapshotWorkspace {
    snapshot: Snapshot,
    embedded: Arc<EmbeddedDocuments>,
    published: Mutex<Vec<(Url, Vec<Diagnostic>)>>,
}

impl SnapshotWorkspace {
    /// Every publish so far, oldest first
    pub fn published(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl DiagnosticsHost for SnapshotWorkspace {
    async fn diagnostics(&self, uri: &Url) -> Vec<RawDiagnostic> {
        self.snapshot.diagnostics.get(uri).cloned().unwrap_or_default()
    }

    async fn uris_with_diagnostics(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self
            .snapshot
            .diagnostics
            .iter()
            .filter(|(_, diagnostics)| !diagnostics.is_empty())
            .map(|(uri, _)| uri.clone())
            .collect();
        uris.sort();
        uris
    }

    async fn open_document(&self, uri: &Url) -> Option<String> {
        self.snapshot.open_documents.get(uri).cloned()
    }

    async fn read_document(&self, uri: &Url) -> Result<String> {
        self.embedded.read(uri).await
    }

    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.published.lock().push((uri, diagnostics));
    }
}

#[async_trait]
impl LanguageQueries for SnapshotWorkspace {
    async fn definitions(&self, uri: &Url, position: Position) -> Result<Vec<Location>> {
        Ok(self
            .snapshot
            .definitions
            .iter()
            .filter(|definition| &definition.uri == uri && range_contains(&definition.range, position))
            .map(|definition| definition.target.clone())
            .collect())
    }

    async fn embedded_language_at(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<EmbeddedLanguageKind>> {
        Ok(self
            .snapshot
            .regions
            .iter()
            .find(|region| &region.uri == uri && range_contains(&region.range, position))
            .map(|region| region.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_camel_case_snapshot() {
        let json = r#"{
            "openDocuments": { "file:///w/a.bb": "do_x() {\n    echo\n}\n" },
            "embeddedDocuments": [{
                "originalUri": "file:///w/a.bb",
                "kind": "bash",
                "uri": "file:///tmp/a.sh",
                "characterIndexes": [0, 1, null],
                "content": "do_x() {\n"
            }],
            "regions": [{
                "uri": "file:///w/a.bb",
                "kind": "bash",
                "range": {"start": {"line": 0, "character": 0}, "end": {"line": 2, "character": 1}}
            }]
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let (workspace, embedded) = snapshot.into_workspace();
        let original = Url::parse("file:///w/a.bb").unwrap();
        let generated = Url::parse("file:///tmp/a.sh").unwrap();

        assert_eq!(embedded.original_uri(&generated), Some(original.clone()));
        assert_eq!(workspace.read_document(&generated).await.unwrap(), "do_x() {\n");
        assert!(workspace.open_document(&original).await.is_some());
        assert_eq!(
            workspace
                .embedded_language_at(&original, Position::new(1, 4))
                .await
                .unwrap(),
            Some(EmbeddedLanguageKind::Bash)
        );
        assert!(workspace.uris_with_diagnostics().await.is_empty());
    }
}
