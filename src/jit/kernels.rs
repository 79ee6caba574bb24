//! JIT-built scanline kernels with scalar tails.

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::codegen::{CodegenOpts, CompiledProgram, compile};
use crate::jit::machine::{GROUP_BYTES, Machine};
use crate::jit::program::{Program, ProgramBuilder, Stream};
use crate::scanop::blend::src_over_al_pbgra32_scalar;
use crate::scanop::convert::bgra32_to_pbgra32;

const PIXELS_PER_GROUP: usize = GROUP_BYTES / 4;

/// `dst = src + dst * (255 - src.a) / 255` with saturation, for `Pbgra32` over `Pbgra32`.
/// Pixel groups whose four source alphas are all zero skip the destination load entirely.
pub fn src_over_al_program() -> ScanResult<Program> {
    let mut b = ProgramBuilder::new("src_over_al_pbgra32");
    let c255 = b.splat_u16(255);
    let c128 = b.splat_u16(128);
    let alpha_mask = b.pixel_mask([0, 0, 0, 255]);

    b.begin_loop();
    let s = b.load(Stream::Src);
    let alpha = b.and(s, alpha_mask);
    b.begin_branch(alpha);
    let d = b.load(Stream::Dst);

    let s_lo = b.unpack_lo(s);
    let a_lo = b.broadcast_alpha(s_lo);
    let inv_lo = b.sub(c255, a_lo);
    let d_lo = b.unpack_lo(d);
    let q_lo = b.mul_div255(d_lo, inv_lo, c128);

    let s_hi = b.unpack_hi(s);
    let a_hi = b.broadcast_alpha(s_hi);
    let inv_hi = b.sub(c255, a_hi);
    let d_hi = b.unpack_hi(d);
    let q_hi = b.mul_div255(d_hi, inv_hi, c128);

    let scaled = b.pack_us(q_lo, q_hi);
    let out = b.add_sat(s, scaled);
    b.store_masked(Stream::Dst, out, alpha);
    b.end_span();
    b.end_span();
    b.finish()
}

/// `Bgra32` to `Pbgra32`: color channels scaled by alpha, alpha passed through.
pub fn premultiply_program() -> ScanResult<Program> {
    let mut b = ProgramBuilder::new("premultiply_bgra32");
    let c128 = b.splat_u16(128);
    let color_mask = b.pixel_mask([255, 255, 255, 0]);
    let alpha_mask = b.pixel_mask([0, 0, 0, 255]);

    b.begin_loop();
    let s = b.load(Stream::Src);
    let lo = b.unpack_lo(s);
    let a_lo = b.broadcast_alpha(lo);
    let p_lo = b.mul_div255(lo, a_lo, c128);
    let hi = b.unpack_hi(s);
    let a_hi = b.broadcast_alpha(hi);
    let p_hi = b.mul_div255(hi, a_hi, c128);
    let packed = b.pack_us(p_lo, p_hi);
    let color = b.and(packed, color_mask);
    let alpha = b.and(s, alpha_mask);
    let out = b.or(color, alpha);
    b.store(Stream::Dst, out);
    b.end_span();
    b.finish()
}

type TailFn = fn(&mut [u8], &[u8], usize);

fn premultiply_tail(dst: &mut [u8], src: &[u8], count: usize) {
    bgra32_to_pbgra32(dst, src, count, None);
}

/// A compiled program plus the scalar kernel that finishes the last partial group.
pub struct JitScanKernel {
    compiled: CompiledProgram,
    machine: Machine,
    tail: TailFn,
}

impl JitScanKernel {
    pub fn src_over_al(opts: &CodegenOpts) -> ScanResult<Self> {
        Self::build(&src_over_al_program()?, opts, src_over_al_pbgra32_scalar)
    }

    pub fn premultiply(opts: &CodegenOpts) -> ScanResult<Self> {
        Self::build(&premultiply_program()?, opts, premultiply_tail)
    }

    fn build(program: &Program, opts: &CodegenOpts, tail: TailFn) -> ScanResult<Self> {
        let compiled = compile(program, opts)?;
        let machine = Machine::new(&compiled)?;
        Ok(Self {
            compiled,
            machine,
            tail,
        })
    }

    pub fn compiled(&self) -> &CompiledProgram {
        &self.compiled
    }

    /// Processes `count` 4-byte pixels. `dst` is read as well as written for blends.
    pub fn run(&mut self, dst: &mut [u8], src: &[u8], count: usize) -> ScanResult<()> {
        let bytes = count
            .checked_mul(4)
            .ok_or_else(|| ScanError::allocation_size(format!("{count} pixels overflow")))?;
        if dst.len() < bytes || src.len() < bytes {
            return Err(ScanError::validation(format!(
                "{count} pixels need {bytes} bytes, got {} source and {} destination",
                src.len(),
                dst.len()
            )));
        }
        let groups = count / PIXELS_PER_GROUP;
        self.machine.run(&self.compiled, dst, src, groups)?;
        let done = groups * GROUP_BYTES;
        (self.tail)(
            &mut dst[done..bytes],
            &src[done..bytes],
            count - groups * PIXELS_PER_GROUP,
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/kernels.rs"]
mod tests;
