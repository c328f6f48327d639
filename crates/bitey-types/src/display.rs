// Stable rendering of descriptors for diagnostics and CLI output.
// The format is part of the error messages users see, so keep it unchanged.

use crate::descriptor::{FunctionType, StructType, TypeDescriptor};
use std::fmt;

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "void"),
            TypeDescriptor::Int { width, signed: true } => write!(f, "i{}", width),
            TypeDescriptor::Int { width, signed: false } => write!(f, "u{}", width),
            TypeDescriptor::Float { width } => write!(f, "f{}", width),
            TypeDescriptor::Pointer { pointee } => match pointee.as_ref() {
                // Only the name of a pointed-to struct is printed; this keeps
                // self-referential records finite.
                TypeDescriptor::Struct(StructType { name: Some(name), .. }) => {
                    write!(f, "*struct {}", name)
                }
                other => write!(f, "*{}", other),
            },
            TypeDescriptor::Array { element, count } => write!(f, "[{}; {}]", element, count),
            TypeDescriptor::Struct(def) => def.fmt(f),
            TypeDescriptor::StructRef(name) => write!(f, "struct {}", name),
            TypeDescriptor::Function(func) => func.fmt(f),
        }
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct")?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        let Some(fields) = &self.fields else {
            return write!(f, " <opaque>");
        };
        write!(f, " {{")?;
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", field.name, field.ty)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;
        if !self.ret.is_void() {
            write!(f, " -> {}", self.ret)?;
        }
        Ok(())
    }
}
