use crate::descriptor::{StructType, TypeDescriptor};
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown struct `{0}`")]
    UnknownStruct(String),

    #[error("struct definition without a name cannot be registered")]
    AnonymousStruct,

    #[error("struct `{name}` redefined: {previous} vs {current}")]
    ConflictingStruct { name: String, previous: String, current: String },
}

/// Named struct definitions of one module, used to resolve
/// [`TypeDescriptor::StructRef`] back-references.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    structs: FxHashMap<String, TypeDescriptor>,
}

impl StructTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named definition. Re-registering an identical definition
    /// is a no-op; a different one is rejected. An opaque declaration never
    /// replaces a full definition, and a full definition completes an opaque
    /// one.
    pub fn insert(&mut self, def: StructType) -> Result<(), TypeError> {
        let name = def.name.clone().ok_or(TypeError::AnonymousStruct)?;
        if let Some(TypeDescriptor::Struct(existing)) = self.structs.get(&name) {
            if *existing == def || def.is_opaque() {
                return Ok(());
            }
            if !existing.is_opaque() {
                return Err(TypeError::ConflictingStruct {
                    previous: existing.to_string(),
                    current: def.to_string(),
                    name,
                });
            }
        }
        self.structs.insert(name, TypeDescriptor::Struct(def));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StructType> {
        match self.structs.get(name) {
            Some(TypeDescriptor::Struct(def)) => Some(def),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.structs.keys().map(String::as_str)
    }

    /// Follows a back-reference to its definition. Any other descriptor is
    /// returned unchanged.
    pub fn resolve<'a>(&'a self, ty: &'a TypeDescriptor) -> Result<&'a TypeDescriptor, TypeError> {
        match ty {
            TypeDescriptor::StructRef(name) => self
                .structs
                .get(name)
                .ok_or_else(|| TypeError::UnknownStruct(name.clone())),
            other => Ok(other),
        }
    }

    /// Descriptor-level equivalence: structural equality, except that a
    /// named struct and a back-reference of the same name are the same type.
    pub fn same_type(&self, a: &TypeDescriptor, b: &TypeDescriptor) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (TypeDescriptor::Pointer { pointee: pa }, TypeDescriptor::Pointer { pointee: pb }) => {
                self.same_type(pa, pb)
            }
            (
                TypeDescriptor::Array { element: ea, count: ca },
                TypeDescriptor::Array { element: eb, count: cb },
            ) => ca == cb && self.same_type(ea, eb),
            _ => match (a.struct_name(), b.struct_name()) {
                (Some(na), Some(nb)) => na == nb,
                _ => false,
            },
        }
    }
}
