//! Rules that recognize false positives caused by embedding recipe code
//!
//! The rules are checked in order and the first match wins. Each rule looks at the raw
//! diagnostic together with its range mapped onto the original recipe.

use std::sync::OnceLock;

use phf::phf_map;
use regex::Regex;
use tower_lsp::lsp_types::{Position, Range, Url};

use crate::common_directories::is_common_directory;
use crate::error::Result;
use crate::host::LanguageQueries;
use crate::position_mapping::{advance, text_in_range};
use crate::types::RawDiagnostic;

/// Codes that only ever report artifacts of the generated document layout
static ALWAYS_IGNORED: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    // blank line at end of file, line too long, whitespace before ':' and '(',
    // expected 2 blank lines, too many blank lines
    "Flake8" => &["W391", "E501", "E203", "E211", "E302", "E303"],
    // missing module/function docstring, trailing newlines, import outside toplevel,
    // statement has no effect, expression not assigned
    "Pylint" => &["C0114", "C0116", "C0305", "C0415", "W0104", "W0106"],
};

const ANONYMOUS_NOT_ACCESSED: &str = "\"__anonymous\" is not accessed";

const UNDEFINED_VARIABLE: [(&str, &str); 3] = [
    ("Flake8", "F821"),
    ("Pylance", "reportUndefinedVariable"),
    ("Pylint", "E0602"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreRule {
    /// Layout artifacts of generated documents
    AlwaysIgnoredCode,
    /// The synthetic `__anonymous` wrapper around anonymous Python functions
    AnonymousFunction,
    /// Undefined-variable reports for variables BitBake or the recipe defines
    DefinedVariable,
    /// SC2154 for shell variables BitBake assigns
    AssignedShellVariable,
}

/// A diagnostic with its range translated onto the original document
pub struct RuleContext<'a> {
    pub diagnostic: &'a RawDiagnostic,
    pub range: Range,
    pub original_uri: &'a Url,
    pub original_text: &'a str,
}

impl IgnoreRule {
    pub const CHAIN: [IgnoreRule; 4] = [
        IgnoreRule::AlwaysIgnoredCode,
        IgnoreRule::AnonymousFunction,
        IgnoreRule::DefinedVariable,
        IgnoreRule::AssignedShellVariable,
    ];

    /// Statistics counter for diagnostics dropped by this rule
    pub fn counter(self) -> &'static str {
        match self {
            IgnoreRule::AlwaysIgnoredCode => "diagnostics.ignored.always_ignored_code",
            IgnoreRule::AnonymousFunction => "diagnostics.ignored.anonymous_function",
            IgnoreRule::DefinedVariable => "diagnostics.ignored.defined_variable",
            IgnoreRule::AssignedShellVariable => "diagnostics.ignored.assigned_shell_variable",
        }
    }

    pub async fn matches<Q>(self, context: &RuleContext<'_>, queries: &Q) -> Result<bool>
    where
        Q: LanguageQueries + ?Sized,
    {
        match self {
            IgnoreRule::AlwaysIgnoredCode => Ok(is_always_ignored(context.diagnostic)),
            IgnoreRule::AnonymousFunction => Ok(is_anonymous_function_warning(context.diagnostic)),
            IgnoreRule::DefinedVariable => {
                if !is_undefined_variable(context.diagnostic) {
                    return Ok(false);
                }
                // Step inside the identifier so the lookup does not resolve the token before it.
                let start = context.range.start;
                let position = Position::new(start.line, start.character + 1);
                let definitions = queries.definitions(context.original_uri, position).await?;
                Ok(!definitions.is_empty())
            }
            IgnoreRule::AssignedShellVariable => {
                if !context.diagnostic.is("shellcheck", "SC2154") {
                    return Ok(false);
                }
                let position = shell_variable_position(context.original_text, context.range);
                let definitions = queries.definitions(context.original_uri, position).await?;
                if !definitions.is_empty() {
                    return Ok(true);
                }
                // The scan may not have run yet; fall back to the well-known directories.
                Ok(unassigned_variable_name(&context.diagnostic.message)
                    .is_some_and(is_common_directory))
            }
        }
    }
}

/// First rule of the chain that matches, if any
pub async fn first_matching_rule<Q>(context: &RuleContext<'_>, queries: &Q) -> Result<Option<IgnoreRule>>
where
    Q: LanguageQueries + ?Sized,
{
    for rule in IgnoreRule::CHAIN {
        if rule.matches(context, queries).await? {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

pub fn is_always_ignored(diagnostic: &RawDiagnostic) -> bool {
    ALWAYS_IGNORED
        .entries()
        .any(|(tool, codes)| codes.iter().any(|code| diagnostic.is(tool, code)))
}

/// Pylance reports the unused wrapper without a code. Other tools or reports with a code
/// are real findings.
pub fn is_anonymous_function_warning(diagnostic: &RawDiagnostic) -> bool {
    diagnostic.source().contains("Pylance")
        && diagnostic.code.is_none()
        && diagnostic.message == ANONYMOUS_NOT_ACCESSED
}

pub fn is_undefined_variable(diagnostic: &RawDiagnostic) -> bool {
    UNDEFINED_VARIABLE
        .iter()
        .any(|(tool, code)| diagnostic.is(tool, code))
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").expect("word pattern is valid"))
}

fn unassigned_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>\S+) is referenced but not assigned\.$")
            .expect("unassigned pattern is valid")
    })
}

/// Position at the end of the variable name a SC2154 range covers.
///
/// Shellcheck ranges may include `${`, in which case the name ends before the range does.
pub fn shell_variable_position(original_text: &str, range: Range) -> Position {
    let text = text_in_range(original_text, range);
    match word_pattern().find(text) {
        Some(word) if word.start() == 0 => range.end,
        Some(word) => {
            let units = text[..word.end()].encode_utf16().count();
            advance(original_text, range.start, units)
        }
        None => {
            tracing::error!(?range, text, "no variable name in the range of a SC2154 diagnostic");
            range.end
        }
    }
}

/// Variable name of a "FOO is referenced but not assigned." message
pub fn unassigned_variable_name(message: &str) -> Option<&str> {
    unassigned_pattern()
        .captures(message)
        .and_then(|captures| captures.name("name"))
        .map(|name| name.as_str())
}
