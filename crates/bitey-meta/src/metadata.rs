//! On-disk / in-memory format of the type metadata a toolchain hands over
//! together with a compiled module.
//!
//! The shape follows compiler debug information: a flat table of type nodes
//! that reference each other by index, and a list of exported symbols in the
//! order the native module exports them.

use crate::error::MetadataError;
use serde::{Deserialize, Serialize};

/// Index into [`ModuleMetadata::types`].
pub type TypeId = usize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    #[serde(default)]
    pub types: Vec<TypeNode>,
    /// Exported symbols, in native export order.
    #[serde(default)]
    pub symbols: Vec<SymbolRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TypeNode {
    Base {
        name: String,
        encoding: Encoding,
        size_bits: u64,
    },
    /// `pointee == None` is `void *`.
    Pointer {
        #[serde(default)]
        pointee: Option<TypeId>,
    },
    Typedef {
        name: String,
        target: TypeId,
    },
    Qualified {
        qualifier: Qualifier,
        target: TypeId,
    },
    /// `count == None` is a flexible / incomplete array.
    Array {
        element: TypeId,
        #[serde(default)]
        count: Option<u64>,
    },
    /// `members == None` is a declaration without definition.
    Struct {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        size_bits: Option<u64>,
        #[serde(default)]
        align_bits: Option<u64>,
        #[serde(default)]
        members: Option<Vec<Member>>,
    },
    Union {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        size_bits: Option<u64>,
        #[serde(default)]
        members: Option<Vec<Member>>,
    },
    Vector {
        element: TypeId,
        count: u64,
    },
    Enum {
        #[serde(default)]
        name: Option<String>,
        underlying: TypeId,
    },
    Subroutine {
        #[serde(default)]
        params: Vec<TypeId>,
        /// `None` is `void`.
        #[serde(default)]
        ret: Option<TypeId>,
        #[serde(default)]
        variadic: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
    #[serde(default)]
    pub offset_bits: Option<u64>,
    /// Set for bit-field members.
    #[serde(default)]
    pub bit_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Signed,
    Unsigned,
    SignedChar,
    UnsignedChar,
    Boolean,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qualifier {
    Const,
    Volatile,
    Restrict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Variable,
}

impl ModuleMetadata {
    pub fn from_json(text: &str) -> Result<Self, MetadataError> {
        serde_json::from_str(text).map_err(MetadataError::Json)
    }

    pub fn to_json(&self) -> Result<String, MetadataError> {
        serde_json::to_string_pretty(self).map_err(MetadataError::Json)
    }

    pub fn node(&self, id: TypeId) -> Option<&TypeNode> {
        self.types.get(id)
    }
}

/// Programmatic construction of [`ModuleMetadata`], for front-ends that
/// already know their types and for tests.
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    metadata: ModuleMetadata,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: TypeNode) -> TypeId {
        let id = self.metadata.types.len();
        self.metadata.types.push(node);
        id
    }

    pub fn base(&mut self, name: &str, encoding: Encoding, size_bits: u64) -> TypeId {
        self.push(TypeNode::Base { name: name.to_string(), encoding, size_bits })
    }

    pub fn pointer(&mut self, pointee: Option<TypeId>) -> TypeId {
        self.push(TypeNode::Pointer { pointee })
    }

    pub fn typedef(&mut self, name: &str, target: TypeId) -> TypeId {
        self.push(TypeNode::Typedef { name: name.to_string(), target })
    }

    pub fn qualified(&mut self, qualifier: Qualifier, target: TypeId) -> TypeId {
        self.push(TypeNode::Qualified { qualifier, target })
    }

    pub fn array(&mut self, element: TypeId, count: Option<u64>) -> TypeId {
        self.push(TypeNode::Array { element, count })
    }

    /// Declares a struct without members. Complete it with
    /// [`MetadataBuilder::define_struct`] to build self-referential records.
    pub fn declare_struct(&mut self, name: Option<&str>) -> TypeId {
        self.push(TypeNode::Struct {
            name: name.map(str::to_string),
            size_bits: None,
            align_bits: None,
            members: None,
        })
    }

    /// Sets the members of a struct previously returned by
    /// [`MetadataBuilder::declare_struct`]. Offsets are left to the layout
    /// resolver.
    pub fn define_struct(&mut self, id: TypeId, members: &[(&str, TypeId)]) {
        if let Some(TypeNode::Struct { members: slot, .. }) = self.metadata.types.get_mut(id) {
            *slot = Some(
                members
                    .iter()
                    .map(|(name, ty)| Member {
                        name: name.to_string(),
                        ty: *ty,
                        offset_bits: None,
                        bit_size: None,
                    })
                    .collect(),
            );
        }
    }

    pub fn structure(&mut self, name: Option<&str>, members: &[(&str, TypeId)]) -> TypeId {
        let id = self.declare_struct(name);
        self.define_struct(id, members);
        id
    }

    /// Pushes an arbitrary node, e.g. a struct with authoritative offsets.
    pub fn node(&mut self, node: TypeNode) -> TypeId {
        self.push(node)
    }

    pub fn subroutine(&mut self, params: &[TypeId], ret: Option<TypeId>, variadic: bool) -> TypeId {
        self.push(TypeNode::Subroutine { params: params.to_vec(), ret, variadic })
    }

    pub fn function(&mut self, name: &str, ty: TypeId) -> &mut Self {
        self.metadata.symbols.push(SymbolRecord {
            name: name.to_string(),
            kind: SymbolKind::Function,
            ty,
        });
        self
    }

    pub fn variable(&mut self, name: &str, ty: TypeId) -> &mut Self {
        self.metadata.symbols.push(SymbolRecord {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            ty,
        });
        self
    }

    pub fn finish(self) -> ModuleMetadata {
        self.metadata
    }
}
