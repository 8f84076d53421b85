//! Diagnostic and embedded-document types shared by the reconciler
//!
//! This module provides the shapes that cross the boundary between the host editor,
//! the third-party checkers and the reconciler: raw diagnostics as reported against
//! generated documents, their codes, and the embedded-language kinds.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    CodeDescription, DiagnosticSeverity, DiagnosticTag, NumberOrString, Position, Range, Url,
};

/// Language of a generated document extracted from a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddedLanguageKind {
    Python,
    Bash,
}

impl EmbeddedLanguageKind {
    pub const ALL: [EmbeddedLanguageKind; 2] = [EmbeddedLanguageKind::Bash, EmbeddedLanguageKind::Python];

    /// Determine the kind of a generated document from its file extension.
    pub fn from_uri(uri: &Url) -> Option<Self> {
        let path = uri.path();
        if path.ends_with(".py") {
            Some(EmbeddedLanguageKind::Python)
        } else if path.ends_with(".sh") {
            Some(EmbeddedLanguageKind::Bash)
        } else {
            None
        }
    }

    /// Name of the output channel diagnostics of this kind are published to
    pub fn channel_name(self) -> &'static str {
        match self {
            EmbeddedLanguageKind::Python => "bitbake-python",
            EmbeddedLanguageKind::Bash => "bitbake-bash",
        }
    }
}

impl fmt::Display for EmbeddedLanguageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddedLanguageKind::Python => write!(f, "python"),
            EmbeddedLanguageKind::Bash => write!(f, "bash"),
        }
    }
}

/// A diagnostic code as the host reports it.
///
/// Some checkers report a bare value, others a value with a documentation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    Plain(NumberOrString),
    Structured {
        value: NumberOrString,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Url>,
    },
}

impl DiagnosticCode {
    /// Normalized textual value of the code, whatever its shape
    pub fn value(&self) -> Cow<'_, str> {
        let raw = match self {
            DiagnosticCode::Plain(value) | DiagnosticCode::Structured { value, .. } => value,
        };
        match raw {
            NumberOrString::String(s) => Cow::Borrowed(s.as_str()),
            NumberOrString::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Check the code against a checker identifier such as `W0404`.
    ///
    /// Pylint reports codes as `W0404:reimported`, so a `:`-suffixed symbolic name is accepted.
    pub fn matches(&self, id: &str) -> bool {
        let value = self.value();
        match value.strip_prefix(id) {
            Some(rest) => rest.is_empty() || rest.starts_with(':'),
            None => false,
        }
    }

    pub fn to_lsp(&self) -> (NumberOrString, Option<CodeDescription>) {
        match self {
            DiagnosticCode::Plain(value) => (value.clone(), None),
            DiagnosticCode::Structured { value, target } => (
                value.clone(),
                target.clone().map(|href| CodeDescription { href }),
            ),
        }
    }
}

impl From<&str> for DiagnosticCode {
    fn from(value: &str) -> Self {
        DiagnosticCode::Plain(NumberOrString::String(value.to_string()))
    }
}

/// A diagnostic reported by a third-party checker against a generated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDiagnostic {
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<DiagnosticCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<DiagnosticTag>>,
}

impl RawDiagnostic {
    pub fn new(range: Range, source: &str, code: Option<&str>, message: impl Into<String>) -> Self {
        RawDiagnostic {
            range,
            severity: Some(DiagnosticSeverity::WARNING),
            code: code.map(DiagnosticCode::from),
            source: Some(source.to_string()),
            message: message.into(),
            tags: None,
        }
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or_default()
    }

    /// True when the source names `tool` and the code matches `id`
    pub fn is(&self, tool: &str, id: &str) -> bool {
        self.source().contains(tool) && self.code.as_ref().is_some_and(|code| code.matches(id))
    }
}

/// Mapping from each UTF-16 offset of a generated document to an offset in the original
/// document. Synthetic characters that have no origin map to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterIndexes(pub Vec<Option<usize>>);

impl CharacterIndexes {
    pub fn get(&self, generated_offset: usize) -> Option<usize> {
        self.0.get(generated_offset).copied().flatten()
    }
}

/// Metadata about the generated document of one kind for an original document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDocInfo {
    pub uri: Url,
    pub character_indexes: CharacterIndexes,
}

/// Check if a range contains a given position, both ends inclusive
pub fn range_contains(range: &Range, position: Position) -> bool {
    let start = (range.start.line, range.start.character);
    let end = (range.end.line, range.end.character);
    let point = (position.line, position.character);
    point >= start && point <= end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_derived_from_extension() {
        let py = Url::parse("file:///tmp/embedded/recipe_bb.py").unwrap();
        let sh = Url::parse("file:///tmp/embedded/recipe_bb.sh").unwrap();
        let bb = Url::parse("file:///work/recipe.bb").unwrap();
        assert_eq!(EmbeddedLanguageKind::from_uri(&py), Some(EmbeddedLanguageKind::Python));
        assert_eq!(EmbeddedLanguageKind::from_uri(&sh), Some(EmbeddedLanguageKind::Bash));
        assert_eq!(EmbeddedLanguageKind::from_uri(&bb), None);
        assert_eq!(EmbeddedLanguageKind::Python.to_string(), "python");
    }

    #[test]
    fn structured_and_plain_codes_normalize_the_same() {
        let plain: DiagnosticCode = serde_json::from_str(r#""SC2154""#).unwrap();
        let structured: DiagnosticCode = serde_json::from_str(
            r#"{"value": "SC2154", "target": "https://www.shellcheck.net/wiki/SC2154"}"#,
        )
        .unwrap();
        assert!(matches!(structured, DiagnosticCode::Structured { .. }));
        assert_eq!(plain.value(), structured.value());
        assert!(structured.matches("SC2154"));

        let numeric: DiagnosticCode = serde_json::from_str("2154").unwrap();
        assert_eq!(numeric.value(), "2154");
    }

    #[test]
    fn pylint_symbolic_suffix_matches() {
        let code = DiagnosticCode::from("W0404:reimported");
        assert!(code.matches("W0404"));
        assert!(!code.matches("W040"));
        assert!(!DiagnosticCode::from("E5011").matches("E501"));
    }

    #[test]
    fn raw_diagnostic_deserializes_host_shape() {
        let raw: RawDiagnostic = serde_json::from_str(
            r#"{
                "range": {"start": {"line": 1, "character": 4}, "end": {"line": 1, "character": 7}},
                "severity": 2,
                "source": "Pylint",
                "code": {"value": "W0621:redefined-outer-name", "target": "https://pylint.readthedocs.io/"},
                "message": "Redefining name 'os' from outer scope (line 1)"
            }"#,
        )
        .unwrap();
        assert!(raw.is("Pylint", "W0621"));
        assert!(!raw.is("Flake8", "W0621"));
        let (_, description) = raw.code.unwrap().to_lsp();
        assert!(description.is_some());
    }
}
