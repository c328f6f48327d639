//! Type and symbol metadata of compiled modules.
//!
//! A toolchain hands over a [`ModuleMetadata`] next to every compiled
//! artifact. [`extract`] walks it and produces one [`TypeDescriptor`] per
//! exported symbol, keeping the module's export order.
//!
//! [`TypeDescriptor`]: bitey_types::TypeDescriptor

mod error;
mod extract;
mod metadata;

pub use error::MetadataError;
pub use extract::{extract, ExtractedSymbol, Extraction};
pub use metadata::{
    Encoding, Member, MetadataBuilder, ModuleMetadata, Qualifier, SymbolKind, SymbolRecord,
    TypeId, TypeNode,
};
