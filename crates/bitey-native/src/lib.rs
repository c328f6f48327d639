//! Native call machinery: plans how a C signature travels through the host
//! ABI, JIT-compiles a trampoline per plan and converts host values to and
//! from native bytes.

pub mod abi;
pub mod error;
pub mod marshal;
pub mod trampoline;
pub mod value;

use bitey_layout::{Layout, LayoutResolver};
use bitey_types::{FunctionType, StructTable, TypeDescriptor};
use std::sync::Arc;

pub use abi::{Abi, ArgPassing, CallPlan, RetPassing};
pub use error::{MarshalError, NativeError};
pub use marshal::{decode, read_native, Encoder};
pub use trampoline::{TrampolineCompiler, TrampolineFn};
pub use value::Value;

use marshal::ValueBuffer;

/// A fully prepared call: resolved layouts, the call plan and the trampoline
/// that performs it.
#[derive(Debug, Clone)]
pub struct NativeCall {
    params: Vec<(TypeDescriptor, Arc<Layout>)>,
    ret: Option<(TypeDescriptor, Arc<Layout>)>,
    plan: CallPlan,
    trampoline: TrampolineFn,
}

impl NativeCall {
    /// Resolves every parameter and the return type of `func`, classifies
    /// the signature and obtains its trampoline.
    pub fn prepare(
        func: &FunctionType,
        resolver: &mut LayoutResolver,
        compiler: &mut TrampolineCompiler,
    ) -> Result<NativeCall, NativeError> {
        if func.variadic {
            return Err(NativeError::UnsupportedVariadic);
        }

        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            match param {
                TypeDescriptor::Void => {
                    return Err(NativeError::UnsupportedType {
                        ty: param.to_string(),
                        cause: "void is not a parameter type".to_string(),
                    })
                }
                TypeDescriptor::Function(_) => {
                    return Err(NativeError::UnsupportedType {
                        ty: param.to_string(),
                        cause: "functions cannot be passed by value".to_string(),
                    })
                }
                _ => params.push((param.clone(), resolver.resolve(param)?)),
            }
        }
        let ret = match func.ret.as_ref() {
            TypeDescriptor::Void => None,
            ty => Some((ty.clone(), resolver.resolve(ty)?)),
        };

        let pairs: Vec<_> = params.iter().map(|(ty, layout)| (ty, &**layout)).collect();
        let plan = compiler.abi().plan(&pairs, ret.as_ref().map(|(ty, layout)| (ty, &**layout)))?;
        let trampoline = compiler.get_or_compile(&plan)?;
        Ok(NativeCall { params, ret, plan, trampoline })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn plan(&self) -> &CallPlan {
        &self.plan
    }

    pub fn params(&self) -> impl Iterator<Item = (&TypeDescriptor, &Layout)> {
        self.params.iter().map(|(ty, layout)| (ty, &**layout))
    }

    pub fn ret(&self) -> Option<(&TypeDescriptor, &Layout)> {
        self.ret.as_ref().map(|(ty, layout)| (ty, &**layout))
    }

    /// Marshals `args`, calls `callee` through the trampoline and converts
    /// the result back.
    ///
    /// # Safety
    ///
    /// `callee` must be the entry point of a function with the prepared
    /// signature, and the trampoline compiler that produced this call must
    /// still be alive.
    pub unsafe fn invoke(
        &self,
        callee: *const u8,
        args: &[Value],
        structs: &StructTable,
    ) -> Result<Value, MarshalError> {
        if args.len() != self.params.len() {
            return Err(MarshalError::ArgumentCount { expected: self.params.len(), found: args.len() });
        }

        let mut encoder = Encoder::new(structs);
        let mut buffers = Vec::with_capacity(args.len());
        for (index, ((ty, layout), value)) in self.params.iter().zip(args).enumerate() {
            let mut buffer = ValueBuffer::zeroed(layout.size);
            encoder
                .encode(ty, layout, value, &mut buffer.bytes_mut()[..layout.size as usize])
                .map_err(|source| MarshalError::Argument { index, source: Box::new(source) })?;
            buffers.push(buffer);
        }
        let slots: Vec<*mut u8> = buffers.iter_mut().map(ValueBuffer::as_mut_ptr).collect();
        let mut ret = ValueBuffer::zeroed(self.ret.as_ref().map_or(0, |(_, layout)| layout.size));

        (self.trampoline)(callee, slots.as_ptr(), ret.as_mut_ptr());
        drop(encoder);

        match &self.ret {
            None => Ok(Value::Void),
            Some((ty, layout)) => decode(ty, layout, ret.bytes(), structs)
                .map_err(|source| MarshalError::ReturnValue { source: Box::new(source) }),
        }
    }
}
