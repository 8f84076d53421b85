//! # BitBake Embedded-Language Diagnostics
//!
//! BitBake recipes embed shell and Python code. To let real checkers (shellcheck, Flake8,
//! Pylint, Pylance) analyze that code, the tooling extracts it into generated documents.
//! This library maps the diagnostics those checkers report back onto the recipe and drops
//! the false positives the extraction causes.
//!
//! ## Modules
//! - `reconciler` - Per-document reconciliation and the review pass
//! - `ignore_rules` - False-positive rules, checked in order
//! - `import_fixer` - Rewrites of warnings citing the generated import preamble
//! - `position_mapping` - Generated-to-original position translation
//! - `embedded_documents` - Registry of generated documents
//! - `channels` - The `bitbake-bash` and `bitbake-python` output channels
//! - `host` - Traits for the editor and the language queries
//! - `snapshot` - In-memory host loaded from JSON

pub mod channels;
pub mod common_directories;
pub mod config;
pub mod embedded_documents;
pub mod error;
pub mod host;
pub mod ignore_rules;
pub mod import_fixer;
pub mod position_mapping;
pub mod reconciler;
pub mod snapshot;
pub mod stats;
pub mod types;

pub use error::{ReconcileError, Result};
pub use reconciler::Reconciler;
