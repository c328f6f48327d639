//! Command-line text to host values, guided by the declared parameter types.
//!
//! Scalars are written as plain literals (`42`, `-1`, `2.5`), pointers as
//! `null` or a hexadecimal address, and strings as-is when the parameter
//! points to 8-bit integers. Structs and arrays are written as JSON.

use crate::error::CliError;
use bitey_rt::{StructTable, TypeDescriptor, Value};
use serde_json::Value as Json;

pub fn parse_argument(
    index: usize,
    text: &str,
    ty: &TypeDescriptor,
    structs: &StructTable,
) -> Result<Value, CliError> {
    let bad = |expected: String| CliError::BadArgument { index, text: text.to_string(), expected };
    let ty = structs.resolve(ty).map_err(|e| bad(e.to_string()))?;
    match ty {
        TypeDescriptor::Int { signed: true, .. } => text.parse().map(Value::Int).map_err(|_| bad(ty.to_string())),
        TypeDescriptor::Int { signed: false, .. } => text.parse().map(Value::UInt).map_err(|_| bad(ty.to_string())),
        TypeDescriptor::Float { .. } => text.parse().map(Value::Float).map_err(|_| bad(ty.to_string())),
        TypeDescriptor::Pointer { pointee } => {
            if let Some(address) = parse_address(text) {
                return Ok(Value::pointer(address, pointee.as_ref().clone()));
            }
            if is_byte(pointee, structs) {
                return Ok(Value::Str(text.to_string()));
            }
            Err(bad(format!("{} (`null` or a hexadecimal address)", ty)))
        }
        TypeDescriptor::Struct(_) | TypeDescriptor::Array { .. } => {
            let json: Json = serde_json::from_str(text).map_err(|e| bad(format!("JSON for {}: {}", ty, e)))?;
            from_json(&json, ty, structs).map_err(bad)
        }
        other => Err(bad(format!("a value of a bindable type, not {}", other))),
    }
}

fn parse_address(text: &str) -> Option<usize> {
    if text == "null" {
        return Some(0);
    }
    let hex = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    usize::from_str_radix(hex, 16).ok()
}

fn is_byte(ty: &TypeDescriptor, structs: &StructTable) -> bool {
    matches!(structs.resolve(ty), Ok(TypeDescriptor::Int { width: 8, .. }))
}

fn from_json(json: &Json, ty: &TypeDescriptor, structs: &StructTable) -> Result<Value, String> {
    let ty = structs.resolve(ty).map_err(|e| e.to_string())?;
    let mismatch = || format!("{} for {}", ty, json);
    match (ty, json) {
        (TypeDescriptor::Int { signed: true, .. }, Json::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(mismatch),
        (TypeDescriptor::Int { signed: false, .. }, Json::Number(n)) => {
            n.as_u64().map(Value::UInt).ok_or_else(mismatch)
        }
        (TypeDescriptor::Float { .. }, Json::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(mismatch),
        (TypeDescriptor::Pointer { pointee }, Json::Null) => Ok(Value::pointer(0, pointee.as_ref().clone())),
        (TypeDescriptor::Pointer { pointee }, Json::String(s)) => match parse_address(s) {
            Some(address) => Ok(Value::pointer(address, pointee.as_ref().clone())),
            None if is_byte(pointee, structs) => Ok(Value::Str(s.clone())),
            None => Err(mismatch()),
        },
        (TypeDescriptor::Array { element, .. }, Json::Array(items)) => items
            .iter()
            .map(|item| from_json(item, element, structs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (TypeDescriptor::Struct(def), Json::Object(object)) => {
            let fields = def.fields.as_deref().ok_or_else(|| format!("{} is opaque", ty))?;
            if object.len() != fields.len() {
                return Err(format!("{} fields for {}, found {}", fields.len(), ty, object.len()));
            }
            let values = fields
                .iter()
                .map(|field| {
                    let item = object.get(&field.name).ok_or_else(|| format!("field `{}` of {}", field.name, ty))?;
                    Ok((field.name.clone(), from_json(item, &field.ty, structs)?))
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(Value::Struct { name: def.name.clone(), fields: values })
        }
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> TypeDescriptor {
        TypeDescriptor::structure(Some("Point"), [("x", TypeDescriptor::i32()), ("y", TypeDescriptor::i32())])
    }

    fn parse(text: &str, ty: &TypeDescriptor) -> Result<Value, CliError> {
        parse_argument(0, text, ty, &StructTable::new())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse("-12", &TypeDescriptor::i32()).unwrap(), Value::Int(-12));
        assert_eq!(parse("7", &TypeDescriptor::u8()).unwrap(), Value::UInt(7));
        assert_eq!(parse("2.5", &TypeDescriptor::f64()).unwrap(), Value::Float(2.5));
        assert!(matches!(parse("x", &TypeDescriptor::i32()), Err(CliError::BadArgument { index: 0, .. })));
        assert!(parse("-1", &TypeDescriptor::u32()).is_err());
    }

    #[test]
    fn test_pointers() {
        let string = TypeDescriptor::pointer_to(TypeDescriptor::i8());
        assert_eq!(parse("hello", &string).unwrap(), Value::Str("hello".to_string()));
        assert_eq!(parse("null", &string).unwrap(), Value::pointer(0, TypeDescriptor::i8()));
        assert_eq!(
            parse("0x1000", &TypeDescriptor::void_pointer()).unwrap(),
            Value::pointer(0x1000, TypeDescriptor::Void)
        );
        assert!(parse("hello", &TypeDescriptor::pointer_to(TypeDescriptor::f64())).is_err());
    }

    #[test]
    fn test_struct_from_json_keeps_declared_order() {
        let value = parse(r#"{ "y": 2, "x": 1 }"#, &point()).unwrap();
        assert_eq!(value, Value::structure(Some("Point"), [("x", Value::Int(1)), ("y", Value::Int(2))]));

        assert!(parse(r#"{ "x": 1 }"#, &point()).is_err());
        assert!(parse(r#"{ "x": 1, "z": 2 }"#, &point()).is_err());
    }

    #[test]
    fn test_array_from_json() {
        let ty = TypeDescriptor::array_of(TypeDescriptor::u16(), 3);
        assert_eq!(
            parse("[1, 2, 3]", &ty).unwrap(),
            Value::Array(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3)])
        );
        assert!(parse("[1, -2]", &ty).is_err());
    }

    #[test]
    fn test_struct_ref_resolves_through_table() {
        let mut structs = StructTable::new();
        let TypeDescriptor::Struct(def) = point() else { unreachable!() };
        structs.insert(def).unwrap();

        let value = parse_argument(1, r#"{"x": 3, "y": 4}"#, &TypeDescriptor::struct_ref("Point"), &structs).unwrap();
        assert_eq!(value.field("y"), Some(&Value::Int(4)));
    }
}
