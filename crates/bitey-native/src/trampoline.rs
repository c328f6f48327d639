//! JIT-compiled call trampolines.
//!
//! Every trampoline has the same host-facing shape,
//! `extern "C" fn(callee, args, ret)`: `args` points to one buffer pointer per
//! parameter and `ret` to a buffer large enough for the result. The body
//! loads each argument as its [`CallPlan`] says, performs an indirect call
//! with the planned native signature and stores the result pieces back.

use crate::abi::{Abi, ArgPassing, CallPlan, Extension, Piece, PieceKind, RetPassing};
use crate::NativeError;
use cranelift_codegen::ir::{types, AbiParam, ArgumentPurpose, InstBuilder, MemFlags, Signature, Type};
use cranelift_codegen::isa::{CallConv, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module};
use rustc_hash::FxHashMap;
use std::fmt;

/// Entry point of a compiled trampoline.
pub type TrampolineFn = unsafe extern "C" fn(callee: *const u8, args: *const *mut u8, ret: *mut u8);

/// Owns the executable memory of one module's trampolines.
struct JitHandle(JITModule);

// SAFETY: the JIT module is only reached through `&mut TrampolineCompiler`;
// the finalized code it owns is immutable.
unsafe impl Send for JitHandle {}

/// Compiles and caches trampolines, one per distinct [`CallPlan`].
pub struct TrampolineCompiler {
    module: Option<JitHandle>,
    builder_ctx: FunctionBuilderContext,
    abi: Abi,
    call_conv: CallConv,
    compiled: FxHashMap<CallPlan, TrampolineFn>,
}

impl fmt::Debug for TrampolineCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrampolineCompiler")
            .field("abi", &self.abi)
            .field("call_conv", &self.call_conv)
            .field("compiled", &self.compiled.len())
            .finish()
    }
}

impl TrampolineCompiler {
    /// Sets up a JIT module for the host ISA.
    pub fn new() -> Result<Self, NativeError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false")?;
        flag_builder.set("is_pic", "false")?;
        flag_builder.set("opt_level", "speed")?;
        #[cfg(debug_assertions)]
        flag_builder.set("enable_verifier", "true")?;
        let flags = settings::Flags::new(flag_builder);

        let isa_builder = cranelift_native::builder()
            .map_err(|e| NativeError::IsaSetupError(format!("Host target lookup failed: {}", e)))?;
        let isa = isa_builder
            .finish(flags)
            .map_err(|e| NativeError::IsaSetupError(format!("ISA construction failed: {}", e)))?;
        let abi = host_abi(&*isa)?;
        let call_conv = isa.default_call_conv();
        log::debug!("Trampoline compiler for {} ({:?}, {:?})", isa.triple(), abi, call_conv);

        let builder = JITBuilder::with_isa(isa, default_libcall_names());
        Ok(TrampolineCompiler {
            module: Some(JitHandle(JITModule::new(builder))),
            builder_ctx: FunctionBuilderContext::new(),
            abi,
            call_conv,
            compiled: FxHashMap::default(),
        })
    }

    pub fn abi(&self) -> Abi {
        self.abi
    }

    /// Number of trampolines compiled so far.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Returns the trampoline for `plan`, compiling it on first use.
    pub fn get_or_compile(&mut self, plan: &CallPlan) -> Result<TrampolineFn, NativeError> {
        if let Some(trampoline) = self.compiled.get(plan) {
            return Ok(*trampoline);
        }
        let trampoline = self.compile(plan)?;
        self.compiled.insert(plan.clone(), trampoline);
        Ok(trampoline)
    }

    fn compile(&mut self, plan: &CallPlan) -> Result<TrampolineFn, NativeError> {
        let JitHandle(module) = self
            .module
            .as_mut()
            .ok_or_else(|| NativeError::IsaSetupError("trampoline memory already released".to_string()))?;
        let ptr = module.target_config().pointer_type();

        let mut signature = Signature::new(self.call_conv);
        for _ in 0..3 {
            signature.params.push(AbiParam::new(ptr));
        }
        let callee_signature = callee_signature(plan, ptr, self.call_conv);

        let mut ctx = module.make_context();
        ctx.func.signature = signature;
        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let params = builder.block_params(entry).to_vec();
            let (callee, args, ret) = (params[0], params[1], params[2]);

            let mut call_args = Vec::with_capacity(callee_signature.params.len());
            if plan.is_indirect() {
                call_args.push(ret);
            }
            for (index, arg) in plan.args.iter().enumerate() {
                let slot_offset = (index * ptr.bytes() as usize) as i32;
                let buffer = builder.ins().load(ptr, MemFlags::trusted(), args, slot_offset);
                match arg {
                    ArgPassing::Pieces { pieces, padding } => {
                        for _ in 0..*padding {
                            call_args.push(builder.ins().iconst(types::I64, 0));
                        }
                        for piece in pieces {
                            let ty = piece_type(piece.kind);
                            call_args.push(builder.ins().load(ty, MemFlags::trusted(), buffer, piece.offset as i32));
                        }
                    }
                    ArgPassing::Memory { .. } | ArgPassing::Reference => call_args.push(buffer),
                }
            }

            let sig_ref = builder.import_signature(callee_signature);
            let call = builder.ins().call_indirect(sig_ref, callee, &call_args);

            if let RetPassing::Pieces(pieces) = &plan.ret {
                let results = builder.inst_results(call).to_vec();
                for (piece, value) in pieces.iter().zip(results) {
                    builder.ins().store(MemFlags::trusted(), value, ret, piece.offset as i32);
                }
            }
            builder.ins().return_(&[]);
            builder.finalize();
        }

        let func_id = module.declare_anonymous_function(&ctx.func.signature)?;
        module.define_function(func_id, &mut ctx)?;
        module.clear_context(&mut ctx);
        module.finalize_definitions()?;
        let code = module.get_finalized_function(func_id);
        log::debug!("Compiled trampoline #{} for {:?}", self.compiled.len(), plan);

        // SAFETY: the function was just defined with the `TrampolineFn`
        // signature under the host's default calling convention.
        Ok(unsafe { std::mem::transmute::<*const u8, TrampolineFn>(code) })
    }
}

impl Drop for TrampolineCompiler {
    fn drop(&mut self) {
        if let Some(JitHandle(module)) = self.module.take() {
            log::trace!("Releasing {} trampolines", self.compiled.len());
            self.compiled.clear();
            // SAFETY: callers only invoke trampolines while the owning module
            // is loaded, and unloading drops the compiler.
            unsafe { module.free_memory() };
        }
    }
}

fn host_abi(isa: &dyn TargetIsa) -> Result<Abi, NativeError> {
    match (isa.name(), isa.default_call_conv()) {
        ("x64", CallConv::SystemV) => Ok(Abi::SysV64),
        ("x64", CallConv::WindowsFastcall) => Ok(Abi::Win64),
        ("aarch64", CallConv::SystemV | CallConv::AppleAarch64) => Ok(Abi::Aapcs64),
        (name, call_conv) => Err(NativeError::UnsupportedHost(format!("{} with {}", name, call_conv))),
    }
}

fn piece_type(kind: PieceKind) -> Type {
    match kind {
        PieceKind::I8 => types::I8,
        PieceKind::I16 => types::I16,
        PieceKind::I32 => types::I32,
        PieceKind::I64 => types::I64,
        PieceKind::F32 => types::F32,
        PieceKind::F64 => types::F64,
    }
}

fn piece_param(piece: &Piece) -> AbiParam {
    let param = AbiParam::new(piece_type(piece.kind));
    match piece.extension {
        Extension::None => param,
        Extension::Sign => param.sext(),
        Extension::Zero => param.uext(),
    }
}

/// Native signature of the callee as described by `plan`.
fn callee_signature(plan: &CallPlan, ptr: Type, call_conv: CallConv) -> Signature {
    let mut signature = Signature::new(call_conv);
    if plan.is_indirect() {
        signature.params.push(AbiParam::special(ptr, ArgumentPurpose::StructReturn));
    }
    for arg in &plan.args {
        match arg {
            ArgPassing::Pieces { pieces, padding } => {
                signature.params.extend((0..*padding).map(|_| AbiParam::new(types::I64)));
                signature.params.extend(pieces.iter().map(piece_param));
            }
            ArgPassing::Memory { size } => {
                signature.params.push(AbiParam::special(ptr, ArgumentPurpose::StructArgument(*size)));
            }
            ArgPassing::Reference => signature.params.push(AbiParam::new(ptr)),
        }
    }
    if let RetPassing::Pieces(pieces) = &plan.ret {
        signature.returns.extend(pieces.iter().map(piece_param));
    }
    signature
}
