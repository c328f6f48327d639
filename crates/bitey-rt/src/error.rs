use bitey_layout::LayoutError;
use bitey_meta::MetadataError;
use bitey_native::NativeError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors reported by loading, binding and calling.
///
/// Every variant names the symbol it concerns (or the module, for load
/// failures) and carries a human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum BindError {
    #[error("`{symbol}` has an unsupported type: {cause}")]
    #[diagnostic(code(bitey::bind::unsupported_type))]
    UnsupportedType { symbol: String, cause: String },

    #[error("`{symbol}` is variadic ({signature})")]
    #[diagnostic(
        code(bitey::bind::unsupported_variadic),
        help("variadic functions cannot be bound; export a fixed-arity wrapper instead")
    )]
    UnsupportedVariadic { symbol: String, signature: String },

    #[error("layout mismatch for `{symbol}`: {cause}")]
    #[diagnostic(code(bitey::bind::layout_mismatch))]
    LayoutMismatch { symbol: String, cause: String },

    #[error("module `{module}` does not export `{symbol}`")]
    #[diagnostic(code(bitey::bind::symbol_not_found))]
    SymbolNotFound { symbol: String, module: String },

    #[error("`{symbol}` belongs to module `{module}`, which has been unloaded")]
    #[diagnostic(code(bitey::bind::stale_module), help("load the module again and re-bind the symbol"))]
    StaleModule { symbol: String, module: String },

    #[error("bad arguments for `{symbol}`: {cause}")]
    #[diagnostic(code(bitey::bind::argument_type_mismatch))]
    ArgumentTypeMismatch { symbol: String, cause: String },

    #[error("failed to load module `{module}`: {cause}")]
    #[diagnostic(code(bitey::bind::load_error))]
    LoadError { module: String, cause: String },

    #[error("cannot invoke `{symbol}`: {cause}")]
    #[diagnostic(code(bitey::bind::native_invocation_fault))]
    NativeInvocationFault { symbol: String, cause: String },
}

impl BindError {
    /// The symbol the error concerns; `None` for load failures.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            BindError::UnsupportedType { symbol, .. }
            | BindError::UnsupportedVariadic { symbol, .. }
            | BindError::LayoutMismatch { symbol, .. }
            | BindError::SymbolNotFound { symbol, .. }
            | BindError::StaleModule { symbol, .. }
            | BindError::ArgumentTypeMismatch { symbol, .. }
            | BindError::NativeInvocationFault { symbol, .. } => Some(symbol),
            BindError::LoadError { .. } => None,
        }
    }

    pub(crate) fn from_layout(symbol: &str, err: LayoutError) -> Self {
        match err {
            LayoutError::Mismatch { .. } => BindError::LayoutMismatch { symbol: symbol.to_string(), cause: err.to_string() },
            other => BindError::UnsupportedType { symbol: symbol.to_string(), cause: other.to_string() },
        }
    }

    pub(crate) fn from_native(symbol: &str, signature: String, err: NativeError) -> Self {
        match err {
            NativeError::UnsupportedVariadic => BindError::UnsupportedVariadic { symbol: symbol.to_string(), signature },
            NativeError::UnsupportedType { .. } => {
                BindError::UnsupportedType { symbol: symbol.to_string(), cause: err.to_string() }
            }
            NativeError::Layout(err) => BindError::from_layout(symbol, err),
            other => BindError::NativeInvocationFault {
                symbol: symbol.to_string(),
                cause: format!("trampoline compilation failed: {}", other),
            },
        }
    }

    pub(crate) fn from_metadata(err: &MetadataError) -> Option<Self> {
        let symbol = err.symbol()?.to_string();
        let cause = match err {
            MetadataError::UnsupportedType { cause, .. } => cause.clone(),
            other => other.to_string(),
        };
        Some(BindError::UnsupportedType { symbol, cause })
    }
}
