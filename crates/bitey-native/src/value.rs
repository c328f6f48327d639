use bitey_types::TypeDescriptor;
use std::fmt;

/// A host-side value crossing the native boundary.
///
/// Arguments are validated against the declared parameter descriptors before
/// they are converted; results are produced from the declared return
/// descriptor (signed integers as `Int`, unsigned as `UInt`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Passed as a NUL-terminated copy to pointers to 8-bit integers.
    Str(String),
    Pointer { address: usize, pointee: TypeDescriptor },
    Array(Vec<Value>),
    Struct { name: Option<String>, fields: Vec<(String, Value)> },
}

impl Value {
    pub fn null() -> Self {
        Value::Pointer { address: 0, pointee: TypeDescriptor::Void }
    }

    pub fn pointer(address: usize, pointee: TypeDescriptor) -> Self {
        Value::Pointer { address, pointee }
    }

    pub fn structure<N, I, S>(name: Option<N>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Value::Struct {
            name: name.map(Into::into),
            fields: fields.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }

    /// Short description of the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Int(_) => "signed integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Pointer { .. } => "pointer",
            Value::Array(_) => "array",
            Value::Struct { .. } => "struct",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct { fields, .. } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "()"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Pointer { address, pointee } => write!(f, "{:#x} as *{}", address, PointeeName(pointee)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct { name, fields } => {
                if let Some(name) = name {
                    write!(f, "{} ", name)?;
                }
                write!(f, "{{")?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    write!(f, "{}{}: {}", if i > 0 { ", " } else { " " }, field, value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

struct PointeeName<'a>(&'a TypeDescriptor);

impl fmt::Display for PointeeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.struct_name() {
            Some(name) => write!(f, "struct {}", name),
            None => write!(f, "{}", self.0),
        }
    }
}
