//! Rewrites of redefinition/reimport warnings
//!
//! Generated Python documents start with a preamble of imports that BitBake provides
//! implicitly. Warnings pointing at a line of that preamble name a line that does not exist
//! in the recipe, so the clause is replaced with a note that BitBake did the import.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::RawDiagnostic;

const IMPORTED_BY_BITBAKE: &str = " (imported by BitBake)";

struct ImportWarning {
    tool: &'static str,
    code: &'static str,
    /// Must capture `prefix` (kept) and `line` (the cited 1-based line)
    pattern: &'static str,
}

const IMPORT_WARNINGS: [ImportWarning; 3] = [
    // redefinition of unused 'x' from line 3
    ImportWarning {
        tool: "Flake8",
        code: "F811",
        pattern: r"^(?P<prefix>.+) from line (?P<line>\d+)$",
    },
    // Reimport 'os' (imported line 3)
    ImportWarning {
        tool: "Pylint",
        code: "W0404",
        pattern: r"^(?P<prefix>.+) \(imported line (?P<line>\d+)\)$",
    },
    // Redefining name 'os' from outer scope (line 3)
    ImportWarning {
        tool: "Pylint",
        code: "W0621",
        pattern: r"^(?P<prefix>.+) \(line (?P<line>\d+)\)$",
    },
];

fn compiled_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        IMPORT_WARNINGS
            .iter()
            .map(|warning| Regex::new(warning.pattern).expect("import warning pattern is valid"))
            .collect()
    })
}

/// Message to publish for `diagnostic`; unchanged unless it cites a preamble line.
pub fn fix_import_message(diagnostic: &RawDiagnostic, import_line_threshold: u32) -> Cow<'_, str> {
    let message = diagnostic.message.as_str();
    for (warning, pattern) in IMPORT_WARNINGS.iter().zip(compiled_patterns()) {
        if !diagnostic.is(warning.tool, warning.code) {
            continue;
        }
        let Some(captures) = pattern.captures(message) else {
            return Cow::Borrowed(message);
        };
        let cited_line = captures["line"].parse::<u32>().unwrap_or(u32::MAX);
        if cited_line <= import_line_threshold {
            return Cow::Owned(format!("{}{}", &captures["prefix"], IMPORTED_BY_BITBAKE));
        }
        return Cow::Borrowed(message);
    }
    Cow::Borrowed(message)
}
