use thiserror::Error;

/// Errors produced while reading metadata or extracting symbols from it.
///
/// Per-symbol variants are collected next to the successfully extracted
/// symbols; one bad symbol never aborts the rest of the module.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("symbol `{symbol}` has an unsupported type: {cause}")]
    UnsupportedType { symbol: String, cause: String },

    #[error("symbol `{symbol}` is exported more than once")]
    DuplicateSymbol { symbol: String },

    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetadataError {
    /// The symbol the error belongs to, if it is a per-symbol error.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            MetadataError::UnsupportedType { symbol, .. }
            | MetadataError::DuplicateSymbol { symbol } => Some(symbol),
            MetadataError::Json(_) => None,
        }
    }
}
