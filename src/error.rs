//! Errors that escape the reconciler entry points
//!
//! Missing data is not an error: an unknown document, a closed recipe or an unmappable
//! range make the reconciler return early. Only failures of the collaborators surface here.

use std::path::PathBuf;

use thiserror::Error;
use tower_lsp::lsp_types::Url;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("could not read embedded document {uri}: {source}")]
    ReadDocument {
        uri: Url,
        #[source]
        source: std::io::Error,
    },

    #[error("embedded document {0} is neither in memory nor a local file")]
    NotAFile(Url),

    #[error("request {method} failed: {source}")]
    Request {
        method: &'static str,
        #[source]
        source: tower_lsp::jsonrpc::Error,
    },

    #[error("could not load snapshot {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
