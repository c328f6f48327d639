use bitey_layout::LayoutError;
use cranelift_codegen::settings::SetError;
use thiserror::Error;

/// Errors that can occur while preparing a native call.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("variadic functions cannot be bound")]
    UnsupportedVariadic,

    #[error("{ty} cannot be passed: {cause}")]
    UnsupportedType { ty: String, cause: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Failed to configure Cranelift settings: {0}")]
    SettingsError(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetupError(String),

    #[error("Unsupported host architecture or calling convention: {0}")]
    UnsupportedHost(String),
}

/// Errors converting between host values and native bytes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: Box<MarshalError>,
    },

    /// The native call completed but its result could not be converted.
    #[error("result: {source}")]
    ReturnValue {
        #[source]
        source: Box<MarshalError>,
    },

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("{value} does not fit in {ty}")]
    OutOfRange { value: String, ty: String },

    #[error("struct {ty} has {expected} fields, found {found}")]
    FieldCount { ty: String, expected: usize, found: usize },

    #[error("struct {ty}: expected field `{expected}`, found `{found}`")]
    FieldName { ty: String, expected: String, found: String },

    #[error("expected {expected} array elements, found {found}")]
    ArrayLength { expected: u64, found: usize },

    #[error("string contains an interior NUL byte")]
    InteriorNul,

    #[error("{0} has no native representation")]
    Unrepresentable(String),
}

impl MarshalError {
    pub(crate) fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        MarshalError::TypeMismatch { expected: expected.to_string(), found: found.to_string() }
    }
}
