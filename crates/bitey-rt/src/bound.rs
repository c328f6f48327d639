use crate::module::{ModuleId, ModuleShared};
use crate::BindError;
use bitey_native::{MarshalError, NativeCall, Value};
use bitey_types::{FunctionType, TypeDescriptor};
use std::fmt;
use std::sync::Weak;

/// A callable binding to one exported function.
///
/// Holds only a weak reference to its module: once the module is unloaded
/// (or dropped) every call fails with [`BindError::StaleModule`].
pub struct BoundFunction {
    pub(crate) module: Weak<ModuleShared>,
    pub(crate) module_id: ModuleId,
    pub(crate) module_name: String,
    pub(crate) symbol: String,
    pub(crate) index: usize,
    pub(crate) descriptor: TypeDescriptor,
    pub(crate) call: NativeCall,
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("symbol", &self.symbol)
            .field("module", &self.module_id)
            .field("signature", &self.descriptor.to_string())
            .finish()
    }
}

impl BoundFunction {
    pub fn name(&self) -> &str {
        &self.symbol
    }

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn signature(&self) -> Option<&FunctionType> {
        self.descriptor.as_function()
    }

    pub fn arity(&self) -> usize {
        self.call.arity()
    }

    pub fn native_call(&self) -> &NativeCall {
        &self.call
    }

    /// Validates and converts `args`, invokes the native function and
    /// converts its result. Blocks until the native call returns.
    pub fn call(&self, args: &[Value]) -> Result<Value, BindError> {
        let stale = || BindError::StaleModule { symbol: self.symbol.clone(), module: self.module_name.clone() };
        let module = self.module.upgrade().ok_or_else(stale)?;
        // Recursive: native code may call back into the host and bind or call
        // again while this lock is held.
        let state = module.state.read_recursive();
        if !state.loaded {
            return Err(stale());
        }

        let entry = &module.symbols[self.index];
        if entry.address == 0 {
            return Err(BindError::NativeInvocationFault {
                symbol: self.symbol.clone(),
                cause: "entry address is null".to_string(),
            });
        }

        log::trace!("Calling `{}` with {} arguments", self.symbol, args.len());
        // SAFETY: the entry point was resolved from the still-loaded image and
        // its signature was planned from the module's own metadata; the
        // trampoline lives as long as the module stays loaded.
        let result = unsafe { self.call.invoke(entry.address as *const u8, args, &module.structs) };
        drop(state);
        result.map_err(|err| call_error(&self.symbol, err))
    }
}

fn call_error(symbol: &str, err: MarshalError) -> BindError {
    match err {
        // The native side already ran; only its result was unusable.
        MarshalError::ReturnValue { source } => BindError::NativeInvocationFault {
            symbol: symbol.to_string(),
            cause: format!("cannot convert the result: {}", source),
        },
        other => BindError::ArgumentTypeMismatch { symbol: symbol.to_string(), cause: other.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_failures_are_type_mismatches() {
        let err = call_error("add", MarshalError::ArgumentCount { expected: 2, found: 1 });
        assert!(matches!(&err, BindError::ArgumentTypeMismatch { symbol, .. } if symbol == "add"), "{err:?}");

        let source = Box::new(MarshalError::OutOfRange { value: "300".to_string(), ty: "u8".to_string() });
        let err = call_error("add", MarshalError::Argument { index: 1, source });
        match err {
            BindError::ArgumentTypeMismatch { cause, .. } => assert_eq!(cause, "argument 1: 300 does not fit in u8"),
            other => panic!("expected an argument mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_result_conversion_failure_is_an_invocation_fault() {
        let source = Box::new(MarshalError::Unrepresentable("struct Opaque".to_string()));
        let err = call_error("open", MarshalError::ReturnValue { source });
        match err {
            BindError::NativeInvocationFault { symbol, cause } => {
                assert_eq!(symbol, "open");
                assert_eq!(cause, "cannot convert the result: struct Opaque has no native representation");
            }
            other => panic!("expected an invocation fault, got {other:?}"),
        }
    }
}
