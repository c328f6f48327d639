//! Conversion between host [`Value`]s and native bytes laid out per a
//! [`Layout`].

use crate::{MarshalError, Value};
use bitey_layout::{Layout, LayoutShape};
use bitey_types::{StructTable, StructType, TypeDescriptor};
use std::ffi::CString;

/// Zero-initialized, 8-byte aligned storage for one marshaled value.
pub(crate) struct ValueBuffer {
    words: Vec<u64>,
}

impl ValueBuffer {
    /// At least `size` bytes, rounded up to whole words so that trampolines
    /// may load register-sized pieces past the end of the value.
    pub(crate) fn zeroed(size: u64) -> Self {
        let words = ((size as usize) + 7) / 8;
        ValueBuffer { words: vec![0; words.max(2)] }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        // SAFETY: u64 storage is valid as bytes for its whole length.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast(), self.words.len() * 8) }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; any byte pattern is a valid u64.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast(), self.words.len() * 8) }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }
}

/// Writes validated host values into native buffers.
///
/// Strings passed to `char*` parameters are copied into NUL-terminated
/// buffers owned by the encoder; pointers handed to native code stay valid
/// until the encoder is dropped.
pub struct Encoder<'a> {
    structs: &'a StructTable,
    strings: Vec<CString>,
}

impl<'a> Encoder<'a> {
    pub fn new(structs: &'a StructTable) -> Self {
        Encoder { structs, strings: Vec::new() }
    }

    /// Encodes `value` as `ty` into `out`, which must hold `layout.size` bytes.
    pub fn encode(
        &mut self,
        ty: &TypeDescriptor,
        layout: &Layout,
        value: &Value,
        out: &mut [u8],
    ) -> Result<(), MarshalError> {
        let ty = resolve(self.structs, ty)?;
        match (ty, &layout.shape) {
            (TypeDescriptor::Int { width, signed }, _) => {
                let bits = check_int(ty, *width, *signed, value)?;
                write_int(out, *width, bits);
            }
            (TypeDescriptor::Float { width: 32 }, _) => {
                let v = check_float(ty, value)?;
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    return Err(MarshalError::OutOfRange { value: value.to_string(), ty: ty.to_string() });
                }
                out[..4].copy_from_slice(&(v as f32).to_ne_bytes());
            }
            (TypeDescriptor::Float { .. }, _) => {
                let v = check_float(ty, value)?;
                out[..8].copy_from_slice(&v.to_ne_bytes());
            }
            (TypeDescriptor::Pointer { pointee }, _) => {
                let address = self.pointer_address(ty, pointee, value)?;
                out[..std::mem::size_of::<usize>()].copy_from_slice(&address.to_ne_bytes());
            }
            (TypeDescriptor::Array { element, count }, LayoutShape::Array { element: element_layout, stride, .. }) => {
                let Value::Array(items) = value else {
                    return Err(MarshalError::mismatch(ty, value.kind_name()));
                };
                if items.len() as u64 != *count {
                    return Err(MarshalError::ArrayLength { expected: *count, found: items.len() });
                }
                for (i, item) in items.iter().enumerate() {
                    let start = i * *stride as usize;
                    let end = start + element_layout.size as usize;
                    self.encode(element, element_layout, item, &mut out[start..end])?;
                }
            }
            (TypeDescriptor::Struct(def), LayoutShape::Struct { .. }) => self.encode_struct(ty, def, layout, value, out)?,
            _ => return Err(MarshalError::Unrepresentable(ty.to_string())),
        }
        Ok(())
    }

    fn encode_struct(
        &mut self,
        ty: &TypeDescriptor,
        def: &StructType,
        layout: &Layout,
        value: &Value,
        out: &mut [u8],
    ) -> Result<(), MarshalError> {
        let Value::Struct { name, fields: values } = value else {
            return Err(MarshalError::mismatch(ty, value.kind_name()));
        };
        if let (Some(found), Some(expected)) = (name, &def.name) {
            if found != expected {
                return Err(MarshalError::mismatch(ty, format!("struct {}", found)));
            }
        }
        let fields = def.fields.as_deref().unwrap_or_default();
        let display_name = def.name.clone().unwrap_or_else(|| ty.to_string());
        if values.len() != fields.len() {
            return Err(MarshalError::FieldCount { ty: display_name, expected: fields.len(), found: values.len() });
        }
        for ((field, field_layout), (found, field_value)) in fields.iter().zip(layout.fields()).zip(values) {
            if *found != field.name {
                return Err(MarshalError::FieldName {
                    ty: display_name,
                    expected: field.name.clone(),
                    found: found.clone(),
                });
            }
            let start = field_layout.offset as usize;
            let end = start + field_layout.layout.size as usize;
            self.encode(&field.ty, &field_layout.layout, field_value, &mut out[start..end])?;
        }
        Ok(())
    }

    fn pointer_address(
        &mut self,
        ty: &TypeDescriptor,
        pointee: &TypeDescriptor,
        value: &Value,
    ) -> Result<usize, MarshalError> {
        let byte_pointee = matches!(self.structs.resolve(pointee), Ok(TypeDescriptor::Int { width: 8, .. }));
        match value {
            Value::Pointer { address, pointee: found } => {
                if pointee.is_void() || found.is_void() || self.structs.same_type(pointee, found) {
                    Ok(*address)
                } else {
                    Err(MarshalError::mismatch(ty, TypeDescriptor::pointer_to(found.clone())))
                }
            }
            Value::Str(s) if byte_pointee => {
                let c_string = CString::new(s.as_str()).map_err(|_| MarshalError::InteriorNul)?;
                let address = c_string.as_ptr() as usize;
                self.strings.push(c_string);
                Ok(address)
            }
            other => Err(MarshalError::mismatch(ty, other.kind_name())),
        }
    }
}

fn resolve<'t>(structs: &'t StructTable, ty: &'t TypeDescriptor) -> Result<&'t TypeDescriptor, MarshalError> {
    structs.resolve(ty).map_err(|err| MarshalError::Unrepresentable(err.to_string()))
}

fn check_int(ty: &TypeDescriptor, width: u16, signed: bool, value: &Value) -> Result<u64, MarshalError> {
    let v: i128 = match *value {
        Value::Int(v) => v.into(),
        Value::UInt(v) => v.into(),
        _ => return Err(MarshalError::mismatch(ty, value.kind_name())),
    };
    let (min, max) = if signed {
        (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1)
    } else {
        (0, (1i128 << width) - 1)
    };
    if v < min || v > max {
        return Err(MarshalError::OutOfRange { value: value.to_string(), ty: ty.to_string() });
    }
    Ok(v as u64)
}

fn check_float(ty: &TypeDescriptor, value: &Value) -> Result<f64, MarshalError> {
    value.as_f64().ok_or_else(|| MarshalError::mismatch(ty, value.kind_name()))
}

fn write_int(out: &mut [u8], width: u16, bits: u64) {
    match width {
        8 => out[..1].copy_from_slice(&(bits as u8).to_ne_bytes()),
        16 => out[..2].copy_from_slice(&(bits as u16).to_ne_bytes()),
        32 => out[..4].copy_from_slice(&(bits as u32).to_ne_bytes()),
        _ => out[..8].copy_from_slice(&bits.to_ne_bytes()),
    }
}

fn read_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    buf
}

/// Reads a value of type `ty` from native bytes.
pub fn decode(
    ty: &TypeDescriptor,
    layout: &Layout,
    bytes: &[u8],
    structs: &StructTable,
) -> Result<Value, MarshalError> {
    let resolved = resolve(structs, ty)?;
    let value = match (resolved, &layout.shape) {
        (TypeDescriptor::Void, _) => Value::Void,
        (TypeDescriptor::Int { width, signed: true }, _) => Value::Int(match width {
            8 => i8::from_ne_bytes(read_bytes(bytes)).into(),
            16 => i16::from_ne_bytes(read_bytes(bytes)).into(),
            32 => i32::from_ne_bytes(read_bytes(bytes)).into(),
            _ => i64::from_ne_bytes(read_bytes(bytes)),
        }),
        (TypeDescriptor::Int { width, signed: false }, _) => Value::UInt(match width {
            8 => u8::from_ne_bytes(read_bytes(bytes)).into(),
            16 => u16::from_ne_bytes(read_bytes(bytes)).into(),
            32 => u32::from_ne_bytes(read_bytes(bytes)).into(),
            _ => u64::from_ne_bytes(read_bytes(bytes)),
        }),
        (TypeDescriptor::Float { width: 32 }, _) => Value::Float(f32::from_ne_bytes(read_bytes(bytes)).into()),
        (TypeDescriptor::Float { .. }, _) => Value::Float(f64::from_ne_bytes(read_bytes(bytes))),
        (TypeDescriptor::Pointer { pointee }, _) => Value::Pointer {
            address: usize::from_ne_bytes(read_bytes(bytes)),
            pointee: pointee.as_ref().clone(),
        },
        (TypeDescriptor::Array { element, .. }, LayoutShape::Array { element: element_layout, count, stride }) => {
            let items = (0..*count as usize)
                .map(|i| {
                    let start = i * *stride as usize;
                    decode(element, element_layout, &bytes[start..], structs)
                })
                .collect::<Result<Vec<_>, MarshalError>>()?;
            Value::Array(items)
        }
        (TypeDescriptor::Struct(def), LayoutShape::Struct { fields: field_layouts }) => {
            let fields = def.fields.as_deref().unwrap_or_default();
            let values = fields
                .iter()
                .zip(field_layouts.iter())
                .map(|(field, field_layout)| {
                    let start = field_layout.offset as usize;
                    let value = decode(&field.ty, &field_layout.layout, &bytes[start..], structs)?;
                    Ok((field.name.clone(), value))
                })
                .collect::<Result<Vec<_>, MarshalError>>()?;
            Value::Struct { name: def.name.clone(), fields: values }
        }
        _ => return Err(MarshalError::Unrepresentable(resolved.to_string())),
    };
    Ok(value)
}

/// Reads a value of type `ty` stored at `address`.
///
/// # Safety
///
/// `address` must point to at least `layout.size` readable bytes holding a
/// value of type `ty`.
pub unsafe fn read_native(
    address: *const u8,
    ty: &TypeDescriptor,
    layout: &Layout,
    structs: &StructTable,
) -> Result<Value, MarshalError> {
    let bytes = std::slice::from_raw_parts(address, layout.size as usize);
    decode(ty, layout, bytes, structs)
}
