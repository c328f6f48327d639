use bitey_types::{StructTable, TypeDescriptor, TypeError};
use repc::Target;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

mod array;
mod helpers;
mod record;

pub use helpers::primitive_size_align;

/// Errors that can occur during layout computation.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("type {ty} has no layout: {cause}")]
    UnsupportedType { ty: String, cause: String },

    #[error("layout of {ty} disagrees with toolchain metadata: {detail}")]
    Mismatch { ty: String, detail: String },

    #[error(transparent)]
    UnknownStruct(#[from] TypeError),

    #[error("struct {0} contains itself by value")]
    TypeRecursion(String),

    #[error("Layout computation failed: {0}")]
    RepcError(#[from] repc::Error),

    #[error("the host target is not supported by the C layout engine")]
    UnsupportedHost,
}

/// Concrete memory layout of a descriptor under the host C ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
    pub shape: LayoutShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutShape {
    Int { width: u16, signed: bool },
    Float { width: u16 },
    Pointer,
    Array {
        element: Arc<Layout>,
        count: u64,
        /// Distance between consecutive elements, in bytes.
        stride: u64,
    },
    Struct { fields: Box<[FieldLayout]> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u64,
    pub layout: Arc<Layout>,
}

impl Layout {
    pub fn fields(&self) -> &[FieldLayout] {
        match &self.shape {
            LayoutShape::Struct { fields } => fields,
            _ => &[],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields().iter().find(|field| field.name == name)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.shape, LayoutShape::Array { .. } | LayoutShape::Struct { .. })
    }

    /// Visits every scalar leaf with its absolute byte offset.
    pub fn for_each_scalar(&self, base: u64, visit: &mut impl FnMut(u64, &Layout)) {
        match &self.shape {
            LayoutShape::Struct { fields } => {
                for field in fields.iter() {
                    field.layout.for_each_scalar(base + field.offset, visit);
                }
            }
            LayoutShape::Array { element, count, stride } => {
                for i in 0..*count {
                    element.for_each_scalar(base + i * stride, visit);
                }
            }
            _ => visit(base, self),
        }
    }
}

/// Computes layouts for type descriptors of one module.
///
/// Uses the repc crate to reproduce the C compiler's record layout for the
/// host target. Layouts are cached per descriptor and shared as `Arc`s.
pub struct LayoutResolver {
    /// Target platform for layout computation
    target: Target,

    /// Struct definitions used to resolve back-references
    structs: Arc<StructTable>,

    /// Cache of computed layouts
    cache: FxHashMap<TypeDescriptor, Arc<Layout>>,

    /// Structs currently being laid out, to detect by-value recursion
    processing_layout: FxHashSet<String>,
}

impl LayoutResolver {
    /// Creates a resolver for the host target.
    pub fn new(structs: Arc<StructTable>) -> Result<Self, LayoutError> {
        let target = repc::HOST_TARGET.ok_or(LayoutError::UnsupportedHost)?;
        Ok(Self::with_target(target, structs))
    }

    pub(crate) fn with_target(target: Target, structs: Arc<StructTable>) -> Self {
        LayoutResolver {
            target,
            structs,
            cache: FxHashMap::default(),
            processing_layout: FxHashSet::default(),
        }
    }

    pub fn structs(&self) -> &StructTable {
        &self.structs
    }

    /// Number of distinct descriptors laid out so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Gets or computes the layout of `ty`.
    pub fn resolve(&mut self, ty: &TypeDescriptor) -> Result<Arc<Layout>, LayoutError> {
        if let Some(layout) = self.cache.get(ty) {
            return Ok(layout.clone());
        }

        let layout = match ty {
            TypeDescriptor::Int { width, signed } => {
                let (size, align) = primitive_size_align(ty).ok_or_else(|| unsupported(
                    ty,
                    format!("no {}-bit integer on this target", width),
                ))?;
                Layout { size, align, shape: LayoutShape::Int { width: *width, signed: *signed } }
            }
            TypeDescriptor::Float { width } => {
                let (size, align) = primitive_size_align(ty).ok_or_else(|| unsupported(
                    ty,
                    format!("no {}-bit float on this target", width),
                ))?;
                Layout { size, align, shape: LayoutShape::Float { width: *width } }
            }
            TypeDescriptor::Pointer { .. } => self.compute_pointer_layout()?,
            TypeDescriptor::Array { element, count } => self.compute_array_layout(element, *count)?,
            TypeDescriptor::Struct(def) => {
                let Some(name) = def.name.clone() else {
                    let layout = self.compute_struct_layout(def)?;
                    return self.cache_insert(ty, layout);
                };
                if !self.processing_layout.insert(name.clone()) {
                    return Err(LayoutError::TypeRecursion(name));
                }
                let result = self.compute_struct_layout(def);
                self.processing_layout.remove(&name);
                result?
            }
            TypeDescriptor::StructRef(_) => {
                let structs = self.structs.clone();
                let def = structs.resolve(ty)?;
                let layout = self.resolve(def)?;
                return self.cache_insert_arc(ty, layout);
            }
            TypeDescriptor::Void => return Err(unsupported(ty, "void values have no size".to_string())),
            TypeDescriptor::Function(_) => {
                return Err(unsupported(ty, "functions are not first-class values".to_string()))
            }
        };

        self.cache_insert(ty, layout)
    }

    fn cache_insert(&mut self, ty: &TypeDescriptor, layout: Layout) -> Result<Arc<Layout>, LayoutError> {
        self.cache_insert_arc(ty, Arc::new(layout))
    }

    fn cache_insert_arc(&mut self, ty: &TypeDescriptor, layout: Arc<Layout>) -> Result<Arc<Layout>, LayoutError> {
        log::trace!("Layout of {}: size {} align {}", ty, layout.size, layout.align);
        self.cache.insert(ty.clone(), layout.clone());
        Ok(layout)
    }
}

pub(crate) fn unsupported(ty: &TypeDescriptor, cause: String) -> LayoutError {
    LayoutError::UnsupportedType { ty: ty.to_string(), cause }
}
