//! fxscan is a software scan-conversion core for a 2D graphics stack.
//!
//! - [`DynArray`]: growable typed buffers that can start on caller-provided storage
//! - [`PixelFormat`] conversion graph: every format reaches one of three interchange formats,
//!   and [`conversion_chain`] / [`blend_plan`] build kernel sequences between any two formats
//! - Scan kernels: convert, quantize, copy and SrcOver/SrcOverAL blends over scanlines, run by
//!   [`ScanPipeline`] or over whole surfaces with [`convert_surface`] / [`blend_surface`]
//! - A small vector JIT: [`ProgramBuilder`] programs are register-allocated by [`compile`] and
//!   executed by [`Machine`]; [`dump_program`] and [`ProgramDump`] expose what happened
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod format;
pub(crate) mod jit;
pub(crate) mod memory;
pub(crate) mod scanop;

pub use crate::foundation::error::{ScanError, ScanResult};

pub use crate::memory::dynarray::{
    DynArray, DynArrayOpts, MAX_CAPACITY_GROWTH, MIN_CAPACITY_GROWTH,
};

pub use crate::format::graph::{
    BlendPlan, ConversionChain, PlanDump, PlanMode, StepDump, blend_format_for, blend_kernel,
    blend_plan, conversion_chain, copy_kernel, interchange_kernel, is_interchange_format,
    lookup_kernel, nearest_interchange_format,
};
pub use crate::format::palette::Palette;
pub use crate::format::pixel_format::{DerivedFormat, FormatClass, InterchangeFormat, PixelFormat};

pub use crate::scanop::kernel::{
    BlendFn, BlendKernel, BlendOp, ConvertFn, ConvertKernel, ScanKernel, ScanOpKind,
};
pub use crate::scanop::pipeline::{
    PaletteBinding, ScanPipeline, ScanThreading, SurfaceDesc, blend_surface, convert_surface,
};

pub use crate::jit::codegen::{CodegenOpts, CompileCtx, CompiledProgram, MachineInst, compile};
pub use crate::jit::dump::{ProgramDump, VarDump, code_fingerprint, dump_compiled, dump_program};
pub use crate::jit::kernels::{JitScanKernel, premultiply_program, src_over_al_program};
pub use crate::jit::liveness::{LiveRange, Liveness};
pub use crate::jit::locator::{Locator, Reg, RegClass, VarState};
pub use crate::jit::machine::{GROUP_BYTES, Machine};
pub use crate::jit::program::{
    Inst, Op, Program, ProgramBuilder, Span, SpanKind, Stream, VarId,
};
pub use crate::jit::vector::VectorType;
