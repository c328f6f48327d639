/// A language-neutral description of a native (C) type.
///
/// Descriptors form finite trees. The only way to express a cycle is
/// [`TypeDescriptor::StructRef`], a by-name back-reference that is resolved
/// through a [`crate::StructTable`] and may only appear beneath a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Void,
    /// Integer of `width` bits.
    Int { width: u16, signed: bool },
    /// IEEE float of `width` bits.
    Float { width: u16 },
    Pointer { pointee: Box<TypeDescriptor> },
    Array { element: Box<TypeDescriptor>, count: u64 },
    Struct(StructType),
    /// Named reference to a struct defined elsewhere in the same module.
    StructRef(String),
    Function(FunctionType),
}

/// A record type.
///
/// `fields == None` marks an opaque declaration (`struct foo;`). `size` and
/// `align` are the values reported by the toolchain, in bytes, when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Option<String>,
    pub fields: Option<Vec<Field>>,
    pub size: Option<u64>,
    pub align: Option<u64>,
}

/// A named struct member. `offset` is the toolchain-reported byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<TypeDescriptor>,
    pub ret: Box<TypeDescriptor>,
    pub variadic: bool,
}

impl TypeDescriptor {
    pub fn int(width: u16, signed: bool) -> Self {
        TypeDescriptor::Int { width, signed }
    }

    pub fn i8() -> Self {
        Self::int(8, true)
    }

    pub fn u8() -> Self {
        Self::int(8, false)
    }

    pub fn i16() -> Self {
        Self::int(16, true)
    }

    pub fn u16() -> Self {
        Self::int(16, false)
    }

    pub fn i32() -> Self {
        Self::int(32, true)
    }

    pub fn u32() -> Self {
        Self::int(32, false)
    }

    pub fn i64() -> Self {
        Self::int(64, true)
    }

    pub fn u64() -> Self {
        Self::int(64, false)
    }

    pub fn float(width: u16) -> Self {
        TypeDescriptor::Float { width }
    }

    pub fn f32() -> Self {
        Self::float(32)
    }

    pub fn f64() -> Self {
        Self::float(64)
    }

    pub fn pointer_to(pointee: TypeDescriptor) -> Self {
        TypeDescriptor::Pointer { pointee: Box::new(pointee) }
    }

    /// `void *`
    pub fn void_pointer() -> Self {
        Self::pointer_to(TypeDescriptor::Void)
    }

    pub fn array_of(element: TypeDescriptor, count: u64) -> Self {
        TypeDescriptor::Array { element: Box::new(element), count }
    }

    /// A fully defined struct without toolchain-reported layout values.
    pub fn structure<N, I, S>(name: Option<N>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (S, TypeDescriptor)>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Field { name: name.into(), ty, offset: None })
            .collect();
        TypeDescriptor::Struct(StructType {
            name: name.map(Into::into),
            fields: Some(fields),
            size: None,
            align: None,
        })
    }

    /// A declared-but-not-defined struct.
    pub fn opaque_struct(name: impl Into<String>) -> Self {
        TypeDescriptor::Struct(StructType {
            name: Some(name.into()),
            fields: None,
            size: None,
            align: None,
        })
    }

    pub fn struct_ref(name: impl Into<String>) -> Self {
        TypeDescriptor::StructRef(name.into())
    }

    pub fn function(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        TypeDescriptor::Function(FunctionType { params, ret: Box::new(ret), variadic: false })
    }

    pub fn variadic_function(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        TypeDescriptor::Function(FunctionType { params, ret: Box::new(ret), variadic: true })
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Void => "void",
            TypeDescriptor::Int { .. } => "integer",
            TypeDescriptor::Float { .. } => "float",
            TypeDescriptor::Pointer { .. } => "pointer",
            TypeDescriptor::Array { .. } => "array",
            TypeDescriptor::Struct(_) | TypeDescriptor::StructRef(_) => "struct",
            TypeDescriptor::Function(_) => "function",
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            TypeDescriptor::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Void)
    }

    pub fn is_variadic(&self) -> bool {
        self.as_function().map_or(false, |func| func.variadic)
    }

    /// Name of the struct this descriptor denotes, for both definitions and
    /// back-references.
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Struct(def) => def.name.as_deref(),
            TypeDescriptor::StructRef(name) => Some(name),
            _ => None,
        }
    }
}

impl StructType {
    pub fn is_opaque(&self) -> bool {
        self.fields.is_none()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.as_ref()?.iter().find(|field| field.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> TypeDescriptor {
        TypeDescriptor::structure(
            Some("Point"),
            [("x", TypeDescriptor::i32()), ("y", TypeDescriptor::i32())],
        )
    }

    #[test]
    fn test_structural_equality_is_recursive() {
        assert_eq!(point(), point());
        let other = TypeDescriptor::structure(
            Some("Point"),
            [("x", TypeDescriptor::i32()), ("y", TypeDescriptor::i64())],
        );
        assert_ne!(point(), other);

        let f1 = TypeDescriptor::function(vec![point()], TypeDescriptor::Void);
        let f2 = TypeDescriptor::function(vec![point()], TypeDescriptor::Void);
        assert_eq!(f1, f2);
        assert_ne!(f1, TypeDescriptor::variadic_function(vec![point()], TypeDescriptor::Void));
    }

    #[test]
    fn test_signedness_distinguishes_integers() {
        assert_ne!(TypeDescriptor::i32(), TypeDescriptor::u32());
        assert_eq!(TypeDescriptor::int(16, false), TypeDescriptor::u16());
    }

    #[test]
    fn test_struct_name_covers_references() {
        assert_eq!(point().struct_name(), Some("Point"));
        assert_eq!(TypeDescriptor::struct_ref("Node").struct_name(), Some("Node"));
        assert_eq!(TypeDescriptor::i8().struct_name(), None);
    }

    #[test]
    fn test_opaque_struct() {
        let TypeDescriptor::Struct(def) = TypeDescriptor::opaque_struct("FILE") else {
            panic!("expected struct");
        };
        assert!(def.is_opaque());
        assert!(def.field("anything").is_none());
    }
}
