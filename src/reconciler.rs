//! Diagnostics reconciler
//!
//! Takes the diagnostics third-party checkers report for a generated embedded-language
//! document, maps them back onto the recipe they were extracted from, drops the false
//! positives the embedding causes and publishes the rest on the channel of the language.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::channels::DiagnosticChannels;
use crate::config::Configuration;
use crate::embedded_documents::EmbeddedDocuments;
use crate::error::Result;
use crate::host::{DiagnosticsHost, LanguageQueries};
use crate::ignore_rules::{first_matching_rule, RuleContext};
use crate::import_fixer::fix_import_message;
use crate::position_mapping::original_doc_range;
use crate::stats::{self, ReconcileStats, TimingGuard};
use crate::types::{EmbeddedDocInfo, EmbeddedLanguageKind, RawDiagnostic};

/// Checkers whose diagnostics are reconciled; anything else is dropped
pub const RECOGNIZED_SOURCES: [&str; 4] = ["Flake8", "Pylance", "Pylint", "shellcheck"];

/// Inputs shared by every diagnostic of one update
struct Update<'a> {
    kind: EmbeddedLanguageKind,
    channel: &'static str,
    original_uri: &'a Url,
    original_text: &'a str,
    generated_text: &'a str,
    info: &'a EmbeddedDocInfo,
    import_line_threshold: u32,
}

pub struct Reconciler<H, Q> {
    host: Arc<H>,
    queries: Arc<Q>,
    embedded: Arc<EmbeddedDocuments>,
    channels: DiagnosticChannels,
    // Held across channel write, merge and publish so the last publish of a recipe
    // always carries both channels.
    publish_locks: DashMap<Url, Arc<Mutex<()>>>,
    config: RwLock<Configuration>,
    stats: ReconcileStats,
}

impl<H, Q> Reconciler<H, Q>
where
    H: DiagnosticsHost,
    Q: LanguageQueries,
{
    pub fn new(host: Arc<H>, queries: Arc<Q>, embedded: Arc<EmbeddedDocuments>) -> Self {
        Reconciler {
            host,
            queries,
            embedded,
            channels: DiagnosticChannels::new(),
            publish_locks: DashMap::new(),
            config: RwLock::new(Configuration::default()),
            stats: ReconcileStats::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn embedded(&self) -> &EmbeddedDocuments {
        &self.embedded
    }

    pub fn channels(&self) -> &DiagnosticChannels {
        &self.channels
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    pub fn configuration(&self) -> Configuration {
        self.config.read().clone()
    }

    pub fn configure(&self, update: impl FnOnce(&mut Configuration)) {
        update(&mut self.config.write());
    }

    /// Reconcile the diagnostics of one generated document.
    ///
    /// Anything that is not a generated document of a currently open recipe is ignored;
    /// closed recipes are never reopened to compute diagnostics.
    pub async fn update_diagnostics(&self, uri: &Url) -> Result<()> {
        let config = self.configuration();
        if !config.enabled {
            return Ok(());
        }
        let Some(kind) = EmbeddedLanguageKind::from_uri(uri) else {
            return Ok(());
        };
        let Some(original_uri) = self.embedded.original_uri(uri) else {
            tracing::trace!(%uri, "not a registered embedded document");
            return Ok(());
        };
        let Some(original_text) = self.host.open_document(&original_uri).await else {
            tracing::trace!(%original_uri, "recipe is not open, skipping");
            return Ok(());
        };
        let Some(info) = self.embedded.info(&original_uri, kind) else {
            return Ok(());
        };

        let _timer = TimingGuard::new(&self.stats, stats::UPDATE);
        let generated_text = self.host.read_document(&info.uri).await?;
        let raw_diagnostics = self.host.diagnostics(&info.uri).await;
        let channel = self.channels.channel(kind);

        let update = Update {
            kind,
            channel: channel.name(),
            original_uri: &original_uri,
            original_text: &original_text,
            generated_text: &generated_text,
            info: &info,
            import_line_threshold: config.import_line_threshold,
        };
        let results = join_all(
            raw_diagnostics
                .iter()
                .map(|diagnostic| self.reconcile(diagnostic, &update)),
        )
        .await;

        let mut clean = Vec::with_capacity(results.len());
        for result in results {
            if let Some(diagnostic) = result? {
                clean.push(diagnostic);
            }
        }
        tracing::debug!(
            %original_uri,
            %kind,
            raw = raw_diagnostics.len(),
            published = clean.len(),
            "reconciled embedded diagnostics"
        );
        self.stats.increment(stats::PUBLISHED, clean.len() as u64);

        let lock = self.publish_lock(&original_uri);
        let _guard = lock.lock().await;
        channel.set(original_uri.clone(), clean);
        let merged = self.channels.merged(&original_uri);
        self.host.publish(original_uri, merged).await;
        Ok(())
    }

    fn publish_lock(&self, original_uri: &Url) -> Arc<Mutex<()>> {
        self.publish_locks
            .entry(original_uri.clone())
            .or_default()
            .clone()
    }

    /// Re-run `update_diagnostics` for every document that holds diagnostics, typically
    /// once a full scan has made better definition information available.
    pub async fn review_diagnostics(&self) -> Result<()> {
        let uris = self.host.uris_with_diagnostics().await;
        join_all(uris.iter().map(|uri| self.update_diagnostics(uri)))
            .await
            .into_iter()
            .collect()
    }

    /// Drop everything published so far and tell the host
    pub async fn clear(&self) {
        for uri in self.channels.uris() {
            let lock = self.publish_lock(&uri);
            let _guard = lock.lock().await;
            self.channels.remove(&uri);
            self.host.publish(uri, Vec::new()).await;
        }
    }

    async fn reconcile(&self, diagnostic: &RawDiagnostic, update: &Update<'_>) -> Result<Option<Diagnostic>> {
        if !RECOGNIZED_SOURCES
            .iter()
            .any(|source| diagnostic.source().contains(source))
        {
            self.stats.increment(stats::DROPPED_SOURCE, 1);
            return Ok(None);
        }

        let Some(range) = original_doc_range(
            update.original_text,
            update.generated_text,
            &update.info.character_indexes,
            diagnostic.range,
        ) else {
            tracing::trace!(message = %diagnostic.message, "range has no origin in the recipe");
            self.stats.increment(stats::DROPPED_UNMAPPED, 1);
            return Ok(None);
        };

        // Regions may overlap or have moved since the document was generated.
        let kind_at = self
            .queries
            .embedded_language_at(update.original_uri, range.start)
            .await?;
        if kind_at != Some(update.kind) {
            self.stats.increment(stats::DROPPED_LANGUAGE, 1);
            return Ok(None);
        }

        let context = RuleContext {
            diagnostic,
            range,
            original_uri: update.original_uri,
            original_text: update.original_text,
        };
        if let Some(rule) = first_matching_rule(&context, self.queries.as_ref()).await? {
            tracing::trace!(?rule, message = %diagnostic.message, "ignored");
            self.stats.increment(rule.counter(), 1);
            return Ok(None);
        }

        let message = fix_import_message(diagnostic, update.import_line_threshold);
        if message != diagnostic.message.as_str() {
            self.stats.increment(stats::MESSAGES_REWRITTEN, 1);
        }

        let (code, code_description) = match diagnostic.code.as_ref().map(|code| code.to_lsp()) {
            Some((code, description)) => (Some(code), description),
            None => (None, None),
        };
        Ok(Some(Diagnostic {
            range,
            severity: diagnostic.severity,
            code,
            code_description,
            source: Some(format!("{}, {}", diagnostic.source(), update.channel)),
            message: message.into_owned(),
            related_information: None,
            tags: diagnostic.tags.clone(),
            data: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotWorkspace};
    use serde_json::json;
    use std::time::Duration;
    use tower_lsp::async_trait;
    use tower_lsp::lsp_types::{Position, Range};

    const RECIPE_URI: &str = "file:///work/meta-demo/demo.bb";
    const SHELL_URI: &str = "file:///tmp/bitbake-embedded/demo_bb_1.sh";
    const PYTHON_URI: &str = "file:///tmp/bitbake-embedded/demo_bb_1.py";

    /// Recipe:
    /// ```text
    /// 0: do_install() {
    /// 1:     install -d ${D}${bindir}
    /// 2:     cp ${FOO} ${MY_VAR}
    /// 3: }
    /// 4: python do_x() {
    /// 5:     d.getVar('PN')
    /// 6: }
    /// ```
    const RECIPE: &str = "do_install() {\n    install -d ${D}${bindir}\n    cp ${FOO} ${MY_VAR}\n}\npython do_x() {\n    d.getVar('PN')\n}\n";

    fn utf16_len(text: &str) -> usize {
        text.encode_utf16().count()
    }

    /// Generated shell document: a synthetic header line, then lines 0..=3 of the recipe.
    fn shell_document() -> (String, Vec<Option<usize>>) {
        let header = "#!/bin/sh\n";
        let body_end = RECIPE.find("python").unwrap();
        let body = &RECIPE[..body_end];
        let mut indexes = vec![None; utf16_len(header)];
        indexes.extend((0..utf16_len(body)).map(Some));
        (format!("{header}{body}"), indexes)
    }

    /// Generated Python document: 8 preamble lines, then line 5 of the recipe.
    fn python_document() -> (String, Vec<Option<usize>>) {
        let preamble = "import bb\nimport os\n\n\n\n\n\ndef do_x():\n";
        let line_start = RECIPE.find("    d.getVar").unwrap();
        let line = "    d.getVar('PN')\n";
        let mut indexes = vec![None; utf16_len(preamble)];
        indexes.extend((0..utf16_len(line)).map(|i| Some(line_start + i)));
        (format!("{preamble}{line}"), indexes)
    }

    fn range(line: u32, start: u32, end: u32) -> serde_json::Value {
        json!({ "start": { "line": line, "character": start }, "end": { "line": line, "character": end } })
    }

    fn diagnostic(line: u32, start: u32, end: u32, source: &str, code: Option<&str>, message: &str) -> serde_json::Value {
        let mut value = json!({ "range": range(line, start, end), "severity": 2, "source": source, "message": message });
        if let Some(code) = code {
            value["code"] = json!(code);
        }
        value
    }

    fn snapshot(shell: Vec<serde_json::Value>, python: Vec<serde_json::Value>, open: bool) -> Snapshot {
        let (shell_text, shell_indexes) = shell_document();
        let (python_text, python_indexes) = python_document();
        let open_documents = if open { json!({ RECIPE_URI: RECIPE }) } else { json!({}) };
        let value = json!({
            "openDocuments": open_documents,
            "embeddedDocuments": [
                { "originalUri": RECIPE_URI, "kind": "bash", "uri": SHELL_URI,
                  "characterIndexes": shell_indexes, "content": shell_text },
                { "originalUri": RECIPE_URI, "kind": "python", "uri": PYTHON_URI,
                  "characterIndexes": python_indexes, "content": python_text }
            ],
            "diagnostics": { SHELL_URI: shell, PYTHON_URI: python },
            "definitions": [
                // FOO is assigned elsewhere in the recipe
                { "uri": RECIPE_URI, "range": range(2, 9, 12),
                  "target": { "uri": RECIPE_URI, "range": range(0, 0, 3) } },
                // `d` is the datastore BitBake injects
                { "uri": RECIPE_URI, "range": range(5, 4, 5),
                  "target": { "uri": "file:///poky/bitbake/lib/bb/data_smart.py", "range": range(0, 0, 1) } }
            ],
            "regions": [
                { "uri": RECIPE_URI, "kind": "bash", "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 3, "character": 1 } } },
                { "uri": RECIPE_URI, "kind": "python", "range": { "start": { "line": 4, "character": 0 }, "end": { "line": 6, "character": 1 } } }
            ]
        });
        serde_json::from_value(value).unwrap()
    }

    fn reconciler(snapshot: Snapshot) -> Reconciler<SnapshotWorkspace, SnapshotWorkspace> {
        let (workspace, embedded) = snapshot.into_workspace();
        Reconciler::new(workspace.clone(), workspace, embedded)
    }

    fn recipe() -> Url {
        Url::parse(RECIPE_URI).unwrap()
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.message.as_str()).collect()
    }

    #[tokio::test]
    async fn unrecognized_sources_are_never_published() {
        let shell = vec![diagnostic(2, 4, 6, "bashls", Some("SC9999"), "something")];
        let reconciler = reconciler(snapshot(shell, vec![], true));
        reconciler
            .update_diagnostics(&Url::parse(SHELL_URI).unwrap())
            .await
            .unwrap();
        assert!(reconciler.channels().channel(EmbeddedLanguageKind::Bash).get(&recipe()).is_empty());
        let published = reconciler.host().published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.is_empty());
    }

    #[tokio::test]
    async fn shell_diagnostics_are_mapped_and_filtered() {
        let shell = vec![
            // ${FOO}: defined through the definition service
            diagnostic(3, 7, 13, "shellcheck", Some("SC2154"), "FOO is referenced but not assigned."),
            // ${D}: common directory fallback
            diagnostic(2, 15, 19, "shellcheck", Some("SC2154"), "D is referenced but not assigned."),
            // ${MY_VAR}: a real finding
            diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned."),
            // header line has no origin
            diagnostic(0, 0, 9, "shellcheck", Some("SC2148"), "Tips depend on target shell."),
        ];
        let reconciler = reconciler(snapshot(shell, vec![], true));
        reconciler
            .update_diagnostics(&Url::parse(SHELL_URI).unwrap())
            .await
            .unwrap();

        let published = reconciler.channels().channel(EmbeddedLanguageKind::Bash).get(&recipe());
        assert_eq!(messages(&published), vec!["MY_VAR is referenced but not assigned."]);
        assert_eq!(
            published[0].range,
            Range::new(Position::new(2, 14), Position::new(2, 23))
        );
        assert_eq!(published[0].source.as_deref(), Some("shellcheck, bitbake-bash"));
    }

    #[tokio::test]
    async fn python_diagnostics_are_mapped_filtered_and_rewritten() {
        let python = vec![
            diagnostic(8, 4, 5, "Pylance", Some("reportUndefinedVariable"), "\"d\" is not defined"),
            diagnostic(8, 4, 18, "Flake8", Some("E501"), "line too long (120 > 79 characters)"),
            diagnostic(8, 4, 5, "Pylance", None, "\"__anonymous\" is not accessed"),
            diagnostic(8, 6, 12, "Flake8", Some("F811"), "redefinition of unused 'getVar' from line 2"),
            diagnostic(8, 6, 12, "Flake8", Some("F811"), "redefinition of unused 'getVar' from line 9"),
        ];
        let reconciler = reconciler(snapshot(vec![], python, true));
        reconciler
            .update_diagnostics(&Url::parse(PYTHON_URI).unwrap())
            .await
            .unwrap();

        let published = reconciler.channels().channel(EmbeddedLanguageKind::Python).get(&recipe());
        assert_eq!(
            messages(&published),
            vec![
                "redefinition of unused 'getVar' (imported by BitBake)",
                "redefinition of unused 'getVar' from line 9",
            ]
        );
        assert_eq!(published[0].range, Range::new(Position::new(5, 6), Position::new(5, 12)));
        assert_eq!(published[0].source.as_deref(), Some("Flake8, bitbake-python"));
    }

    #[tokio::test]
    async fn language_mismatch_is_dropped() {
        // A Python diagnostic that maps into the shell region of the recipe.
        let mut snapshot = snapshot(
            vec![],
            vec![diagnostic(8, 4, 5, "Pylint", Some("W0104"), "Statement seems to have no effect")],
            true,
        );
        snapshot.regions.retain(|region| region.kind == EmbeddedLanguageKind::Bash);
        let reconciler = reconciler(snapshot);
        reconciler.stats().set_enabled(true);
        reconciler
            .update_diagnostics(&Url::parse(PYTHON_URI).unwrap())
            .await
            .unwrap();
        assert_eq!(reconciler.stats().counter(stats::DROPPED_LANGUAGE), 1);
        assert!(reconciler.channels().merged(&recipe()).is_empty());
    }

    #[tokio::test]
    async fn other_extensions_and_closed_recipes_are_no_ops() {
        let shell = vec![diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned.")];
        let open = reconciler(snapshot(shell.clone(), vec![], true));
        open.update_diagnostics(&recipe()).await.unwrap();
        open.update_diagnostics(&Url::parse("file:///tmp/bitbake-embedded/demo_bb_1.txt").unwrap())
            .await
            .unwrap();
        assert!(open.host().published().is_empty());

        let closed = reconciler(snapshot(shell, vec![], false));
        closed.update_diagnostics(&Url::parse(SHELL_URI).unwrap()).await.unwrap();
        assert!(closed.host().published().is_empty());
    }

    #[tokio::test]
    async fn review_without_diagnostics_publishes_nothing() {
        let reconciler = reconciler(snapshot(vec![], vec![], true));
        reconciler.review_diagnostics().await.unwrap();
        assert!(reconciler.host().published().is_empty());
    }

    #[tokio::test]
    async fn review_updates_every_document_and_merges_channels() {
        let shell = vec![diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned.")];
        let python = vec![diagnostic(8, 6, 12, "Pylint", Some("W0404:reimported"), "Reimport 'getVar' (imported line 1)")];
        let reconciler = reconciler(snapshot(shell, python, true));
        reconciler.review_diagnostics().await.unwrap();

        let published = reconciler.host().published();
        assert_eq!(published.len(), 2);
        let last = &published[1].1;
        assert_eq!(last.len(), 2);
        assert!(messages(last).contains(&"Reimport 'getVar' (imported by BitBake)"));
    }

    #[tokio::test]
    async fn repeated_updates_publish_identical_sets() {
        let shell = vec![
            diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned."),
            diagnostic(2, 4, 11, "shellcheck", Some("SC2086"), "Double quote to prevent globbing and word splitting."),
        ];
        let reconciler = reconciler(snapshot(shell, vec![], true));
        let uri = Url::parse(SHELL_URI).unwrap();
        reconciler.update_diagnostics(&uri).await.unwrap();
        reconciler.update_diagnostics(&uri).await.unwrap();
        let published = reconciler.host().published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0], published[1]);
    }

    #[tokio::test]
    async fn disabling_clears_published_diagnostics() {
        let shell = vec![diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned.")];
        let reconciler = reconciler(snapshot(shell, vec![], true));
        let uri = Url::parse(SHELL_URI).unwrap();
        reconciler.update_diagnostics(&uri).await.unwrap();

        reconciler.configure(|config| config.enabled = false);
        reconciler.clear().await;
        reconciler.update_diagnostics(&uri).await.unwrap();

        let published = reconciler.host().published();
        assert_eq!(published.len(), 2);
        assert!(published[1].1.is_empty());
    }

    #[tokio::test]
    async fn python_undefined_variable_reports_with_definition_are_dropped() {
        let python = vec![
            diagnostic(8, 4, 5, "Flake8", Some("F821"), "undefined name 'd'"),
            diagnostic(8, 4, 5, "Pylint", Some("E0602:undefined-variable"), "Undefined variable 'd'"),
        ];
        let reconciler = reconciler(snapshot(vec![], python, true));
        reconciler.stats().set_enabled(true);
        reconciler
            .update_diagnostics(&Url::parse(PYTHON_URI).unwrap())
            .await
            .unwrap();
        assert!(reconciler.channels().channel(EmbeddedLanguageKind::Python).get(&recipe()).is_empty());
        assert_eq!(
            reconciler
                .stats()
                .counter(crate::ignore_rules::IgnoreRule::DefinedVariable.counter()),
            2
        );
    }

    /// Host whose publishes of Python-only sets are slow to land
    struct SlowPythonPublish(Arc<SnapshotWorkspace>);

    #[async_trait]
    impl DiagnosticsHost for SlowPythonPublish {
        async fn diagnostics(&self, uri: &Url) -> Vec<RawDiagnostic> {
            self.0.diagnostics(uri).await
        }

        async fn uris_with_diagnostics(&self) -> Vec<Url> {
            self.0.uris_with_diagnostics().await
        }

        async fn open_document(&self, uri: &Url) -> Option<String> {
            self.0.open_document(uri).await
        }

        async fn read_document(&self, uri: &Url) -> Result<String> {
            self.0.read_document(uri).await
        }

        async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
            let python_only = !diagnostics.is_empty()
                && diagnostics
                    .iter()
                    .all(|d| d.source.as_deref().is_some_and(|s| s.ends_with("bitbake-python")));
            if python_only {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.0.publish(uri, diagnostics).await;
        }
    }

    #[tokio::test]
    async fn concurrent_channel_updates_publish_both_channels_last() {
        let shell = vec![diagnostic(3, 14, 23, "shellcheck", Some("SC2154"), "MY_VAR is referenced but not assigned.")];
        let python = vec![diagnostic(8, 6, 12, "Pylint", Some("W0404"), "Reimport 'getVar' (imported line 9)")];
        let (workspace, embedded) = snapshot(shell, python, true).into_workspace();
        let host = Arc::new(SlowPythonPublish(workspace.clone()));
        let reconciler = Reconciler::new(host, workspace.clone(), embedded);

        reconciler.review_diagnostics().await.unwrap();

        assert_eq!(reconciler.channels().merged(&recipe()).len(), 2);
        let published = workspace.published();
        let (uri, last) = published.last().unwrap();
        assert_eq!(uri, &recipe());
        assert_eq!(
            messages(last),
            vec!["MY_VAR is referenced but not assigned.", "Reimport 'getVar' (imported line 9)"]
        );
    }
}
