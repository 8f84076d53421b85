//! Seams to the collaborators the reconciler relies on
//!
//! The host editor owns documents and the diagnostics produced by third-party checkers.
//! The language queries come from the BitBake language tooling that knows which symbols
//! are defined and which embedded language covers a position of a recipe.

use tower_lsp::async_trait;
use tower_lsp::lsp_types::{Diagnostic, Location, Position, Url};

use crate::error::Result;
use crate::types::{EmbeddedLanguageKind, RawDiagnostic};

#[async_trait]
pub trait DiagnosticsHost: Send + Sync {
    /// Current diagnostics attached to a document
    async fn diagnostics(&self, uri: &Url) -> Vec<RawDiagnostic>;

    /// Every document that currently holds at least one diagnostic
    async fn uris_with_diagnostics(&self) -> Vec<Url>;

    /// Text of a document the user has open, `None` when it is closed
    async fn open_document(&self, uri: &Url) -> Option<String>;

    /// Read a generated document
    async fn read_document(&self, uri: &Url) -> Result<String>;

    /// Replace every diagnostic shown for an original document
    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>);
}

#[async_trait]
pub trait LanguageQueries: Send + Sync {
    /// Definitions of the symbol at a position of an original document
    async fn definitions(&self, uri: &Url, position: Position) -> Result<Vec<Location>>;

    /// Embedded language covering a position of an original document
    async fn embedded_language_at(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<EmbeddedLanguageKind>>;
}
