//! Loads compiled modules and turns their exported functions into callable
//! bindings.
//!
//! ```text
//! Artifact -> load -> Module -> bind -> BoundFunction -> call -> Value
//! ```
//!
//! The free functions below are thin wrappers over [`Module`] and
//! [`BoundFunction`] methods.

mod bound;
mod error;
mod loader;
mod module;
mod registry;
pub mod session;

use std::sync::Arc;

pub use bitey_layout::Layout;
pub use bitey_meta::{MetadataBuilder, ModuleMetadata, SymbolKind};
pub use bitey_native::Value;
pub use bitey_types::{StructTable, TypeDescriptor};
pub use bound::BoundFunction;
pub use error::BindError;
pub use loader::{Artifact, ArtifactImage};
pub use module::{Module, ModuleId, SymbolEntry};
pub use session::{CompileOptions, Session, SessionError, Toolchain, ToolchainError};

/// Loads an artifact: opens its image, extracts its metadata and resolves
/// every exported symbol.
pub fn load(artifact: Artifact) -> Result<Module, BindError> {
    Module::load(artifact)
}

/// The module's symbols in export order, and the symbols that could not be
/// extracted.
pub fn extract(module: &Module) -> (Vec<SymbolEntry>, Vec<BindError>) {
    (module.symbols().to_vec(), module.extraction_errors().to_vec())
}

pub fn bind(module: &Module, name: &str) -> Result<Arc<BoundFunction>, BindError> {
    module.bind(name)
}

pub fn call(bound: &BoundFunction, args: &[Value]) -> Result<Value, BindError> {
    bound.call(args)
}

pub fn unload(module: &Module) {
    module.unload()
}
