use crate::helpers::builtin;
use crate::{unsupported, FieldLayout, Layout, LayoutError, LayoutResolver, LayoutShape};
use bitey_types::{StructType, TypeDescriptor};
use repc::layout::{BuiltinType, TypeVariant};

impl LayoutResolver {
    /// Computes layout for a pointer of any pointee.
    pub(crate) fn compute_pointer_layout(&self) -> Result<Layout, LayoutError> {
        let (size, align) = self.size_align_of(&builtin(BuiltinType::Pointer))?;
        Ok(Layout { size, align, shape: LayoutShape::Pointer })
    }

    /// Computes layout for a struct type.
    ///
    /// Offsets come from repc. Any size, alignment or member offset the
    /// toolchain reported must agree with the computed value.
    pub(crate) fn compute_struct_layout(&mut self, def: &StructType) -> Result<Layout, LayoutError> {
        let ty = TypeDescriptor::Struct(def.clone());
        let fields = def
            .fields
            .as_ref()
            .ok_or_else(|| unsupported(&ty, "struct is opaque (declared but never defined)".to_string()))?;
        if fields.is_empty() {
            return Err(unsupported(&ty, "struct has no members".to_string()));
        }

        // Resolve members first; this also rejects by-value recursion before
        // the repc type is built.
        let mut field_layouts = Vec::with_capacity(fields.len());
        for field in fields {
            field_layouts.push(self.resolve(&field.ty)?);
        }

        let struct_type = self.descriptor_to_repc_type(&ty)?;
        let computed_layout = repc::compute_layout(self.target, &struct_type)?;

        let repc_record = match computed_layout.variant {
            TypeVariant::Record(record) => record,
            _ => return Err(unsupported(&ty, "layout engine did not return a record".to_string())),
        };

        let mut laid_out = Vec::with_capacity(fields.len());
        for ((field, layout), repc_field) in fields.iter().zip(field_layouts).zip(&repc_record.fields) {
            let offset = repc_field
                .layout
                .map(|field_layout| field_layout.offset_bits / 8)
                .ok_or_else(|| unsupported(&ty, format!("no offset computed for `{}`", field.name)))?;
            if let Some(reported) = field.offset {
                if reported != offset {
                    return Err(mismatch(
                        &ty,
                        format!("member `{}` at offset {} but computed {}", field.name, reported, offset),
                    ));
                }
            }
            laid_out.push(FieldLayout { name: field.name.clone(), offset, layout });
        }

        let size = computed_layout.layout.size_bits / 8;
        let align = computed_layout.layout.field_alignment_bits / 8;
        if let Some(reported) = def.size {
            if reported != size {
                return Err(mismatch(&ty, format!("size {} but computed {}", reported, size)));
            }
        }
        if let Some(reported) = def.align {
            if reported != align {
                return Err(mismatch(&ty, format!("alignment {} but computed {}", reported, align)));
            }
        }

        Ok(Layout {
            size,
            align,
            shape: LayoutShape::Struct { fields: laid_out.into_boxed_slice() },
        })
    }
}

fn mismatch(ty: &TypeDescriptor, detail: String) -> LayoutError {
    log::warn!("Layout mismatch for {}: {}", ty, detail);
    LayoutError::Mismatch { ty: ty.to_string(), detail }
}
