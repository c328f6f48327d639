use crate::{unsupported, LayoutError, LayoutResolver};
use bitey_types::TypeDescriptor;
use repc::layout::{Array, BuiltinType, Record, RecordField, RecordKind, Type, TypeVariant};

/// 64-bit scalars are only 4-byte aligned inside records on 32-bit x86 SysV.
const WIDE_ALIGN: u64 = if cfg!(all(target_arch = "x86", not(windows))) { 4 } else { 8 };

/// Fixed size/alignment table for scalar descriptors, keyed by kind and
/// width. Returns `None` for widths without a C counterpart on the host.
pub fn primitive_size_align(ty: &TypeDescriptor) -> Option<(u64, u64)> {
    match ty {
        TypeDescriptor::Int { width: 8, .. } => Some((1, 1)),
        TypeDescriptor::Int { width: 16, .. } => Some((2, 2)),
        TypeDescriptor::Int { width: 32, .. } => Some((4, 4)),
        TypeDescriptor::Int { width: 64, .. } => Some((8, WIDE_ALIGN)),
        TypeDescriptor::Float { width: 32 } => Some((4, 4)),
        TypeDescriptor::Float { width: 64 } => Some((8, WIDE_ALIGN)),
        _ => None,
    }
}

pub(crate) fn builtin(variant: BuiltinType) -> Type<()> {
    Type {
        layout: (),
        annotations: vec![],
        variant: TypeVariant::Builtin(variant),
    }
}

impl LayoutResolver {
    /// Converts a descriptor into the equivalent repc type.
    pub(crate) fn descriptor_to_repc_type(&self, ty: &TypeDescriptor) -> Result<Type<()>, LayoutError> {
        match ty {
            TypeDescriptor::Int { width, signed } => {
                let builtin_type = match (width, signed) {
                    (8, true) => BuiltinType::Char,
                    (8, false) => BuiltinType::UnsignedChar,
                    (16, true) => BuiltinType::Short,
                    (16, false) => BuiltinType::UnsignedShort,
                    (32, true) => BuiltinType::Int,
                    (32, false) => BuiltinType::UnsignedInt,
                    (64, true) => BuiltinType::LongLong,
                    (64, false) => BuiltinType::UnsignedLongLong,
                    _ => return Err(unsupported(ty, format!("no {}-bit integer on this target", width))),
                };
                Ok(builtin(builtin_type))
            }
            TypeDescriptor::Float { width: 32 } => Ok(builtin(BuiltinType::Float)),
            TypeDescriptor::Float { width: 64 } => Ok(builtin(BuiltinType::Double)),
            TypeDescriptor::Float { width } => {
                Err(unsupported(ty, format!("no {}-bit float on this target", width)))
            }
            // Pointee never influences the layout of the pointer itself.
            TypeDescriptor::Pointer { .. } => Ok(builtin(BuiltinType::Pointer)),
            TypeDescriptor::Array { element, count } => Ok(Type {
                layout: (),
                annotations: vec![],
                variant: TypeVariant::Array(Array {
                    element_type: Box::new(self.descriptor_to_repc_type(element)?),
                    num_elements: Some(*count),
                }),
            }),
            TypeDescriptor::Struct(def) => {
                let fields = def
                    .fields
                    .as_ref()
                    .ok_or_else(|| unsupported(ty, "struct is opaque (declared but never defined)".to_string()))?;
                let fields = fields
                    .iter()
                    .map(|field| {
                        Ok(RecordField {
                            layout: None, // Layout will be computed by repc
                            annotations: vec![],
                            named: true,
                            bit_width: None,
                            ty: self.descriptor_to_repc_type(&field.ty)?,
                        })
                    })
                    .collect::<Result<Vec<_>, LayoutError>>()?;
                Ok(Type {
                    layout: (),
                    annotations: vec![],
                    variant: TypeVariant::Record(Record { kind: RecordKind::Struct, fields }),
                })
            }
            TypeDescriptor::StructRef(_) => {
                let def = self.structs.resolve(ty)?;
                self.descriptor_to_repc_type(def)
            }
            TypeDescriptor::Void => Err(unsupported(ty, "void values have no size".to_string())),
            TypeDescriptor::Function(_) => {
                Err(unsupported(ty, "functions are not first-class values".to_string()))
            }
        }
    }

    /// Size and alignment of a computed repc type, in bytes.
    pub(crate) fn size_align_of(&self, ty: &Type<()>) -> Result<(u64, u64), LayoutError> {
        let computed = repc::compute_layout(self.target, ty)?;
        Ok((computed.layout.size_bits / 8, computed.layout.field_alignment_bits / 8))
    }
}
