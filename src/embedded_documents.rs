//! Registry of generated embedded-language documents
//!
//! Every original recipe can have one generated document per embedded-language kind.
//! The registry answers both directions: original + kind -> generated document info,
//! and generated URI -> original URI.

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

use crate::error::{ReconcileError, Result};
use crate::types::{EmbeddedDocInfo, EmbeddedLanguageKind};

/// A registered generated document, optionally with its in-memory content
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub original_uri: Url,
    pub kind: EmbeddedLanguageKind,
    pub info: EmbeddedDocInfo,
    pub content: Option<String>,
}

#[derive(Debug, Default)]
pub struct EmbeddedDocuments {
    by_original: DashMap<(Url, EmbeddedLanguageKind), EmbeddedDocument>,
    originals: DashMap<Url, Url>,
}

impl EmbeddedDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the generated document of `kind` for an original document
    pub fn register(&self, document: EmbeddedDocument) {
        let key = (document.original_uri.clone(), document.kind);
        if let Some(previous) = self.by_original.get(&key) {
            if previous.info.uri != document.info.uri {
                self.originals.remove(&previous.info.uri);
            }
        }
        self.originals
            .insert(document.info.uri.clone(), document.original_uri.clone());
        self.by_original.insert(key, document);
    }

    /// Forget every generated document of an original document
    pub fn remove_original(&self, original_uri: &Url) {
        for kind in EmbeddedLanguageKind::ALL {
            if let Some((_, document)) = self.by_original.remove(&(original_uri.clone(), kind)) {
                self.originals.remove(&document.info.uri);
            }
        }
    }

    pub fn original_uri(&self, generated_uri: &Url) -> Option<Url> {
        self.originals.get(generated_uri).map(|entry| entry.value().clone())
    }

    pub fn info(&self, original_uri: &Url, kind: EmbeddedLanguageKind) -> Option<EmbeddedDocInfo> {
        self.by_original
            .get(&(original_uri.clone(), kind))
            .map(|entry| entry.info.clone())
    }

    /// In-memory content of a generated document, if the client sent one
    pub fn content(&self, generated_uri: &Url) -> Option<String> {
        let original = self.original_uri(generated_uri)?;
        let kind = EmbeddedLanguageKind::from_uri(generated_uri)?;
        self.by_original
            .get(&(original, kind))
            .and_then(|entry| entry.content.clone())
    }

    /// Text of a generated document: the in-memory copy if there is one, the file otherwise
    pub async fn read(&self, generated_uri: &Url) -> Result<String> {
        if let Some(content) = self.content(generated_uri) {
            return Ok(content);
        }
        let path = generated_uri
            .to_file_path()
            .map_err(|()| ReconcileError::NotAFile(generated_uri.clone()))?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ReconcileError::ReadDocument {
                uri: generated_uri.clone(),
                source,
            })
    }
}
