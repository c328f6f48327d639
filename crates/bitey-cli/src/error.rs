use bitey_rt::BindError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error type that provides rich diagnostics
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Failed to {operation} {}", path.display())]
    #[diagnostic(code(bitey::cli::io_error))]
    IoError {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {}", path.display())]
    #[diagnostic(code(bitey::cli::config_error))]
    ConfigError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown log level `{level}` in {}", path.display())]
    #[diagnostic(
        code(bitey::cli::config_error),
        help("use one of: off, error, warn, info, debug, trace")
    )]
    LogLevel { path: PathBuf, level: String },

    #[error("Invalid manifest {}", path.display())]
    #[diagnostic(code(bitey::cli::manifest_error))]
    ManifestError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Library `{}` not found (searched: {searched})", library.display())]
    #[diagnostic(
        code(bitey::cli::library_not_found),
        help("add a directory with --search-path or [loader] search_paths in bitey.toml")
    )]
    LibraryNotFound { library: PathBuf, searched: String },

    #[error("Argument {index} (`{text}`): expected {expected}")]
    #[diagnostic(code(bitey::cli::bad_argument))]
    BadArgument { index: usize, text: String, expected: String },

    #[error("`{symbol}` takes {expected} arguments, {found} given")]
    #[diagnostic(code(bitey::cli::argument_count))]
    ArgumentCount { symbol: String, expected: usize, found: usize },

    #[error("Failed to render output")]
    #[diagnostic(code(bitey::cli::output_error))]
    OutputError(#[source] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bind(#[from] BindError),
}
