//! Calling-convention planning.
//!
//! A [`CallPlan`] records, for one signature on one ABI, how every argument
//! and the result travel between the marshaled byte buffers and the
//! registers or stack slots the callee expects. Plans are plain data: equal
//! plans share one compiled trampoline.

use crate::NativeError;
use bitey_layout::{Layout, LayoutShape};
use bitey_types::TypeDescriptor;

/// The host calling conventions trampolines can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    /// x86-64 System V (Linux, macOS, the BSDs).
    SysV64,
    /// Microsoft x64.
    Win64,
    /// AArch64 procedure call standard, including Apple's variant.
    Aapcs64,
}

const SYSV_INT_REGS: usize = 6;
const SYSV_SSE_REGS: usize = 8;
const AAPCS_GP_REGS: usize = 8;
const AAPCS_SIMD_REGS: usize = 8;

/// Machine type of one register-sized piece of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl PieceKind {
    pub fn is_float(self) -> bool {
        matches!(self, PieceKind::F32 | PieceKind::F64)
    }

    fn int_of_size(size: u64) -> Option<PieceKind> {
        match size {
            1 => Some(PieceKind::I8),
            2 => Some(PieceKind::I16),
            4 => Some(PieceKind::I32),
            8 => Some(PieceKind::I64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    None,
    Sign,
    Zero,
}

/// A piece loaded from (or stored to) `offset` bytes into a value buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceKind,
    pub offset: u32,
    pub extension: Extension,
}

impl Piece {
    fn at(kind: PieceKind, offset: u64) -> Self {
        Piece { kind, offset: offset as u32, extension: Extension::None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgPassing {
    /// Passed as individual register-sized values. `padding` dummy integer
    /// arguments are inserted first to push the pieces onto the stack.
    Pieces { pieces: Vec<Piece>, padding: u8 },
    /// Copied by value onto the stack.
    Memory { size: u32 },
    /// Passed as a pointer to a caller-owned copy.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetPassing {
    Void,
    Pieces(Vec<Piece>),
    /// Written by the callee through a hidden result pointer.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallPlan {
    pub args: Vec<ArgPassing>,
    pub ret: RetPassing,
}

impl CallPlan {
    pub fn is_indirect(&self) -> bool {
        self.ret == RetPassing::Indirect
    }
}

impl Abi {
    /// The calling convention of the machine this process runs on.
    pub fn host() -> Result<Abi, NativeError> {
        if cfg!(all(target_arch = "x86_64", windows)) {
            Ok(Abi::Win64)
        } else if cfg!(target_arch = "x86_64") {
            Ok(Abi::SysV64)
        } else if cfg!(target_arch = "aarch64") {
            Ok(Abi::Aapcs64)
        } else {
            Err(NativeError::UnsupportedHost(std::env::consts::ARCH.to_string()))
        }
    }

    /// Classifies every parameter and the result of a signature whose
    /// layouts are already resolved. `ret` is `None` for `void`.
    pub fn plan(
        self,
        params: &[(&TypeDescriptor, &Layout)],
        ret: Option<(&TypeDescriptor, &Layout)>,
    ) -> Result<CallPlan, NativeError> {
        for (ty, layout) in params.iter().copied().chain(ret) {
            check_passable(ty, layout)?;
        }
        let plan = match self {
            Abi::SysV64 => plan_sysv(params, ret),
            Abi::Win64 => plan_win64(params, ret),
            Abi::Aapcs64 => plan_aapcs64(params, ret)?,
        };
        log::trace!("{:?} call plan: {:?}", self, plan);
        Ok(plan)
    }
}

fn unsupported(ty: &TypeDescriptor, cause: &str) -> NativeError {
    NativeError::UnsupportedType { ty: ty.to_string(), cause: cause.to_string() }
}

fn check_passable(ty: &TypeDescriptor, layout: &Layout) -> Result<(), NativeError> {
    if let LayoutShape::Array { .. } = layout.shape {
        return Err(unsupported(ty, "arrays cannot be passed or returned by value"));
    }
    if layout.size == 0 {
        return Err(unsupported(ty, "zero-sized aggregate"));
    }
    if layout.align > 8 {
        return Err(unsupported(ty, "alignment above 8 bytes"));
    }
    Ok(())
}

/// The single piece of a scalar, or `None` for aggregates.
fn scalar_piece(layout: &Layout) -> Option<Piece> {
    let (kind, extension) = match layout.shape {
        LayoutShape::Int { width: 8, signed } => (PieceKind::I8, extend(signed)),
        LayoutShape::Int { width: 16, signed } => (PieceKind::I16, extend(signed)),
        LayoutShape::Int { width: 32, .. } => (PieceKind::I32, Extension::None),
        LayoutShape::Int { .. } => (PieceKind::I64, Extension::None),
        LayoutShape::Float { width: 32 } => (PieceKind::F32, Extension::None),
        LayoutShape::Float { .. } => (PieceKind::F64, Extension::None),
        LayoutShape::Pointer => (PieceKind::I64, Extension::None),
        LayoutShape::Array { .. } | LayoutShape::Struct { .. } => return None,
    };
    Some(Piece { kind, offset: 0, extension })
}

fn extend(signed: bool) -> Extension {
    if signed {
        Extension::Sign
    } else {
        Extension::Zero
    }
}

fn eightbytes(size: u64) -> u64 {
    (size + 7) / 8
}

/// System V eightbyte classification of an aggregate of at most 16 bytes.
/// An eightbyte holding any integer or pointer is INTEGER, otherwise SSE.
fn sysv_pieces(layout: &Layout) -> Vec<Piece> {
    let count = eightbytes(layout.size) as usize;
    let mut integer = vec![false; count];
    layout.for_each_scalar(0, &mut |offset, leaf| {
        if !matches!(leaf.shape, LayoutShape::Float { .. }) {
            integer[(offset / 8) as usize] = true;
        }
    });
    integer
        .into_iter()
        .enumerate()
        .map(|(index, is_integer)| {
            let offset = index as u64 * 8;
            if is_integer {
                Piece::at(PieceKind::I64, offset)
            } else if layout.size - offset <= 4 {
                Piece::at(PieceKind::F32, offset)
            } else {
                Piece::at(PieceKind::F64, offset)
            }
        })
        .collect()
}

fn plan_sysv(params: &[(&TypeDescriptor, &Layout)], ret: Option<(&TypeDescriptor, &Layout)>) -> CallPlan {
    let ret = match ret {
        None => RetPassing::Void,
        Some((_, layout)) => match scalar_piece(layout) {
            Some(piece) => RetPassing::Pieces(vec![piece]),
            None if layout.size <= 16 => RetPassing::Pieces(sysv_pieces(layout)),
            None => RetPassing::Indirect,
        },
    };

    // The hidden result pointer occupies the first integer register.
    let mut ints = usize::from(ret == RetPassing::Indirect);
    let mut sses = 0;
    let mut args = Vec::with_capacity(params.len());
    for (_, layout) in params {
        if let Some(piece) = scalar_piece(layout) {
            if piece.kind.is_float() {
                sses = (sses + 1).min(SYSV_SSE_REGS);
            } else {
                ints = (ints + 1).min(SYSV_INT_REGS);
            }
            args.push(ArgPassing::Pieces { pieces: vec![piece], padding: 0 });
            continue;
        }
        if layout.size > 16 {
            args.push(ArgPassing::Memory { size: layout.size as u32 });
            continue;
        }
        let pieces = sysv_pieces(layout);
        let need_sse = pieces.iter().filter(|piece| piece.kind.is_float()).count();
        let need_int = pieces.len() - need_sse;
        // An aggregate goes to memory as a whole when its registers run out.
        if ints + need_int <= SYSV_INT_REGS && sses + need_sse <= SYSV_SSE_REGS {
            ints += need_int;
            sses += need_sse;
            args.push(ArgPassing::Pieces { pieces, padding: 0 });
        } else {
            args.push(ArgPassing::Memory { size: layout.size as u32 });
        }
    }
    CallPlan { args, ret }
}

fn plan_win64(params: &[(&TypeDescriptor, &Layout)], ret: Option<(&TypeDescriptor, &Layout)>) -> CallPlan {
    let ret = match ret {
        None => RetPassing::Void,
        Some((_, layout)) => match scalar_piece(layout) {
            Some(piece) => RetPassing::Pieces(vec![piece]),
            None => match PieceKind::int_of_size(layout.size) {
                Some(kind) => RetPassing::Pieces(vec![Piece::at(kind, 0)]),
                None => RetPassing::Indirect,
            },
        },
    };
    let args = params
        .iter()
        .map(|(_, layout)| match scalar_piece(layout) {
            Some(piece) => ArgPassing::Pieces { pieces: vec![piece], padding: 0 },
            None => match PieceKind::int_of_size(layout.size) {
                Some(kind) => ArgPassing::Pieces { pieces: vec![Piece::at(kind, 0)], padding: 0 },
                None => ArgPassing::Reference,
            },
        })
        .collect();
    CallPlan { args, ret }
}

/// Homogeneous floating-point aggregate: one to four floats of one width,
/// with no padding between them.
fn hfa_pieces(layout: &Layout) -> Option<Vec<Piece>> {
    let mut members = Vec::new();
    let mut homogeneous = true;
    layout.for_each_scalar(0, &mut |offset, leaf| match leaf.shape {
        LayoutShape::Float { width } => members.push((offset, width)),
        _ => homogeneous = false,
    });
    let (_, width) = *members.first()?;
    if !homogeneous
        || members.len() > 4
        || members.iter().any(|(_, w)| *w != width)
        || layout.size != members.len() as u64 * u64::from(width / 8)
    {
        return None;
    }
    let kind = if width == 32 { PieceKind::F32 } else { PieceKind::F64 };
    Some(members.into_iter().map(|(offset, _)| Piece::at(kind, offset)).collect())
}

fn aapcs_composite_pieces(layout: &Layout) -> Vec<Piece> {
    (0..eightbytes(layout.size)).map(|i| Piece::at(PieceKind::I64, i * 8)).collect()
}

fn plan_aapcs64(
    params: &[(&TypeDescriptor, &Layout)],
    ret: Option<(&TypeDescriptor, &Layout)>,
) -> Result<CallPlan, NativeError> {
    let ret = match ret {
        None => RetPassing::Void,
        Some((_, layout)) => match scalar_piece(layout) {
            Some(piece) => RetPassing::Pieces(vec![piece]),
            None => match hfa_pieces(layout) {
                Some(pieces) => RetPassing::Pieces(pieces),
                None if layout.size <= 16 => RetPassing::Pieces(aapcs_composite_pieces(layout)),
                // x8 carries the result address and is not an argument register.
                None => RetPassing::Indirect,
            },
        },
    };

    let mut ngrn = 0;
    let mut nsrn = 0;
    let mut args = Vec::with_capacity(params.len());
    for (ty, layout) in params {
        if let Some(piece) = scalar_piece(layout) {
            if piece.kind.is_float() {
                nsrn = (nsrn + 1).min(AAPCS_SIMD_REGS);
            } else {
                ngrn = (ngrn + 1).min(AAPCS_GP_REGS);
            }
            args.push(ArgPassing::Pieces { pieces: vec![piece], padding: 0 });
        } else if let Some(pieces) = hfa_pieces(layout) {
            if nsrn + pieces.len() > AAPCS_SIMD_REGS {
                return Err(unsupported(
                    ty,
                    "floating-point aggregate would be split between registers and stack",
                ));
            }
            nsrn += pieces.len();
            args.push(ArgPassing::Pieces { pieces, padding: 0 });
        } else if layout.size <= 16 {
            let pieces = aapcs_composite_pieces(layout);
            let mut padding = 0;
            if ngrn + pieces.len() > AAPCS_GP_REGS {
                // Never split: burn the remaining registers so the whole
                // composite lands on the stack.
                padding = (AAPCS_GP_REGS - ngrn) as u8;
                ngrn = AAPCS_GP_REGS;
            } else {
                ngrn += pieces.len();
            }
            args.push(ArgPassing::Pieces { pieces, padding });
        } else {
            ngrn = (ngrn + 1).min(AAPCS_GP_REGS);
            args.push(ArgPassing::Reference);
        }
    }
    Ok(CallPlan { args, ret })
}
