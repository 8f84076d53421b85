//! Named diagnostic output channels
//!
//! One channel per embedded-language kind. A channel holds the cleaned diagnostics of each
//! original document and is overwritten wholesale on every publish.

use dashmap::DashMap;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::types::EmbeddedLanguageKind;

#[derive(Debug)]
pub struct DiagnosticChannel {
    name: &'static str,
    entries: DashMap<Url, Vec<Diagnostic>>,
}

impl DiagnosticChannel {
    pub fn new(name: &'static str) -> Self {
        DiagnosticChannel {
            name,
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn set(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.entries.insert(uri, diagnostics);
    }

    pub fn get(&self, uri: &Url) -> Vec<Diagnostic> {
        self.entries
            .get(uri)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn uris(&self) -> Vec<Url> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn remove(&self, uri: &Url) {
        self.entries.remove(uri);
    }
}

/// The `bitbake-bash` and `bitbake-python` channels
#[derive(Debug)]
pub struct DiagnosticChannels {
    bash: DiagnosticChannel,
    python: DiagnosticChannel,
}

impl Default for DiagnosticChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticChannels {
    pub fn new() -> Self {
        DiagnosticChannels {
            bash: DiagnosticChannel::new(EmbeddedLanguageKind::Bash.channel_name()),
            python: DiagnosticChannel::new(EmbeddedLanguageKind::Python.channel_name()),
        }
    }

    pub fn channel(&self, kind: EmbeddedLanguageKind) -> &DiagnosticChannel {
        match kind {
            EmbeddedLanguageKind::Bash => &self.bash,
            EmbeddedLanguageKind::Python => &self.python,
        }
    }

    /// Everything published for one original document, across both channels
    pub fn merged(&self, uri: &Url) -> Vec<Diagnostic> {
        let mut diagnostics = self.bash.get(uri);
        diagnostics.extend(self.python.get(uri));
        diagnostics
    }

    /// Every original document that has an entry in either channel
    pub fn uris(&self) -> Vec<Url> {
        let mut uris = self.bash.uris();
        for uri in self.python.uris() {
            if !uris.contains(&uri) {
                uris.push(uri);
            }
        }
        uris
    }

    /// Forget one original document in both channels
    pub fn remove(&self, uri: &Url) {
        self.bash.remove(uri);
        self.python.remove(uri);
    }
}
