//! Interpreter for [`CompiledProgram`] on a virtual 16-byte vector machine.

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::codegen::{CompiledProgram, MachineInst};
use crate::jit::locator::{Reg, RegClass};
use crate::jit::program::{Op, Stream};
use crate::jit::vector::VectorType;

type Word = [u8; 16];

/// Bytes consumed from each stream per loop iteration.
pub const GROUP_BYTES: usize = VectorType::REGISTER_BYTES;

/// Register file and spill frame for running one compiled program.
pub struct Machine {
    gp: Vec<Word>,
    vector: Vec<Word>,
    frame: Vec<Word>,
    // Index of the matching end marker for each begin marker.
    matching: Vec<usize>,
}

impl Machine {
    pub fn new(compiled: &CompiledProgram) -> ScanResult<Self> {
        let mut matching = vec![usize::MAX; compiled.code().len()];
        let mut stack = Vec::new();
        for (i, inst) in compiled.code().iter().enumerate() {
            match inst {
                MachineInst::LoopBegin | MachineInst::BranchBegin { .. } => stack.push(i),
                MachineInst::LoopEnd | MachineInst::BranchEnd => {
                    let begin = stack.pop().ok_or_else(|| {
                        ScanError::validation(format!("unbalanced span end at {i}"))
                    })?;
                    matching[begin] = i;
                }
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(ScanError::validation("unbalanced span begin"));
        }
        Ok(Self {
            gp: vec![[0; 16]; usize::from(compiled.register_count(RegClass::Gp))],
            vector: vec![[0; 16]; usize::from(compiled.register_count(RegClass::Vector))],
            frame: vec![[0; 16]; compiled.frame_slots() as usize],
            matching,
        })
    }

    fn reg(&self, r: Reg) -> &Word {
        match r.class {
            RegClass::Gp => &self.gp[usize::from(r.index)],
            RegClass::Vector => &self.vector[usize::from(r.index)],
        }
    }

    fn reg_mut(&mut self, r: Reg) -> &mut Word {
        match r.class {
            RegClass::Gp => &mut self.gp[usize::from(r.index)],
            RegClass::Vector => &mut self.vector[usize::from(r.index)],
        }
    }

    /// Runs the prologue once, the loop body for each of `groups` 16-byte groups, then the rest.
    pub fn run(
        &mut self,
        compiled: &CompiledProgram,
        dst: &mut [u8],
        src: &[u8],
        groups: usize,
    ) -> ScanResult<()> {
        let bytes = groups.checked_mul(GROUP_BYTES).ok_or_else(|| {
            ScanError::allocation_size(format!("{groups} pixel groups overflow"))
        })?;
        if dst.len() < bytes || src.len() < bytes {
            return Err(ScanError::validation(format!(
                "{groups} groups need {bytes} bytes per stream, got {} source and {} destination",
                src.len(),
                dst.len()
            )));
        }

        let code = compiled.code();
        let mut pc = 0;
        while pc < code.len() {
            if matches!(code[pc], MachineInst::LoopBegin) {
                let end = self.matching[pc];
                for g in 0..groups {
                    let off = g * GROUP_BYTES;
                    self.exec_range(
                        code,
                        pc + 1,
                        end,
                        &mut dst[off..off + GROUP_BYTES],
                        &src[off..off + GROUP_BYTES],
                    );
                }
                pc = end + 1;
            } else {
                // Outside the loop no instruction touches a stream.
                self.exec_range(code, pc, pc + 1, &mut [], &[]);
                pc += 1;
            }
        }
        Ok(())
    }

    fn exec_range(
        &mut self,
        code: &[MachineInst],
        start: usize,
        end: usize,
        dst: &mut [u8],
        src: &[u8],
    ) {
        let mut pc = start;
        while pc < end {
            match &code[pc] {
                MachineInst::BranchBegin { cond } => {
                    if self.reg(*cond).iter().all(|&b| b == 0) {
                        pc = self.matching[pc];
                    }
                }
                MachineInst::LoopBegin
                | MachineInst::LoopEnd
                | MachineInst::BranchEnd => {}
                MachineInst::Spill { reg, slot } => {
                    self.frame[*slot as usize] = *self.reg(*reg);
                }
                MachineInst::Reload { slot, reg } => {
                    *self.reg_mut(*reg) = self.frame[*slot as usize];
                }
                MachineInst::Move { dst: d, src: s } => {
                    *self.reg_mut(*d) = *self.reg(*s);
                }
                MachineInst::Op {
                    op,
                    ty,
                    dst: out,
                    srcs,
                } => {
                    let a = srcs.first().map_or([0; 16], |r| *self.reg(*r));
                    let b = srcs.get(1).map_or([0; 16], |r| *self.reg(*r));
                    match *op {
                        Op::StoreOutput { stream } => {
                            debug_assert_eq!(stream, Stream::Dst);
                            dst[..GROUP_BYTES].copy_from_slice(&a);
                        }
                        Op::StoreMasked { stream } => {
                            debug_assert_eq!(stream, Stream::Dst);
                            for (px, (d, m)) in dst[..GROUP_BYTES]
                                .chunks_exact_mut(4)
                                .zip(b.chunks_exact(4))
                                .enumerate()
                            {
                                if m.iter().any(|&x| x != 0) {
                                    d.copy_from_slice(&a[px * 4..px * 4 + 4]);
                                }
                            }
                        }
                        Op::LoadInput { stream } => {
                            let mut w = [0u8; 16];
                            match stream {
                                Stream::Src => w.copy_from_slice(&src[..GROUP_BYTES]),
                                Stream::Dst => w.copy_from_slice(&dst[..GROUP_BYTES]),
                            }
                            if let Some(r) = out {
                                *self.reg_mut(*r) = w;
                            }
                        }
                        other => {
                            let value = eval(other, *ty, &a, &b);
                            if let Some(r) = out {
                                *self.reg_mut(*r) = value;
                            }
                        }
                    }
                }
            }
            pc += 1;
        }
    }
}

#[inline]
fn lane(w: &Word, ty: VectorType, k: usize) -> u32 {
    let o = ty.scale_index(k);
    match ty.lane_bytes() {
        1 => u32::from(w[o]),
        2 => u32::from(u16::from_le_bytes([w[o], w[o + 1]])),
        _ => u32::from_le_bytes([w[o], w[o + 1], w[o + 2], w[o + 3]]),
    }
}

#[inline]
fn set_lane(w: &mut Word, ty: VectorType, k: usize, v: u32) {
    let o = ty.scale_index(k);
    match ty.lane_bytes() {
        1 => w[o] = v as u8,
        2 => w[o..o + 2].copy_from_slice(&(v as u16).to_le_bytes()),
        _ => w[o..o + 4].copy_from_slice(&v.to_le_bytes()),
    }
}

fn lanewise(ty: VectorType, a: &Word, b: &Word, f: impl Fn(u32, u32) -> u32) -> Word {
    let mut out = [0u8; 16];
    for k in 0..ty.lane_count() {
        set_lane(&mut out, ty, k, f(lane(a, ty, k), lane(b, ty, k)));
    }
    out
}

fn lanewise_f32(a: &Word, b: &Word, f: impl Fn(f32, f32) -> f32) -> Word {
    let ty = VectorType::F32x4;
    let mut out = [0u8; 16];
    for k in 0..4 {
        let r = f(
            f32::from_bits(lane(a, ty, k)),
            f32::from_bits(lane(b, ty, k)),
        );
        set_lane(&mut out, ty, k, r.to_bits());
    }
    out
}

fn bytewise(a: &Word, b: &Word, f: impl Fn(u8, u8) -> u8) -> Word {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = f(a[i], b[i]);
    }
    out
}

fn eval(op: Op, ty: VectorType, a: &Word, b: &Word) -> Word {
    let max = ty.lane_max();
    let mask = |v: u64| (v & u64::from(max)) as u32;
    match op {
        Op::Const { bytes } => bytes,
        Op::And => bytewise(a, b, |x, y| x & y),
        Op::Or => bytewise(a, b, |x, y| x | y),
        Op::Xor => bytewise(a, b, |x, y| x ^ y),
        Op::Add | Op::AddSat if ty.is_float() => lanewise_f32(a, b, |x, y| x + y),
        Op::Sub if ty.is_float() => lanewise_f32(a, b, |x, y| x - y),
        Op::Mul if ty.is_float() => lanewise_f32(a, b, |x, y| x * y),
        Op::Min if ty.is_float() => lanewise_f32(a, b, f32::min),
        Op::Max if ty.is_float() => lanewise_f32(a, b, f32::max),
        Op::Add => lanewise(ty, a, b, |x, y| mask(u64::from(x) + u64::from(y))),
        Op::Sub => lanewise(ty, a, b, |x, y| {
            mask(u64::from(x).wrapping_sub(u64::from(y)))
        }),
        Op::Mul => lanewise(ty, a, b, |x, y| mask(u64::from(x) * u64::from(y))),
        Op::AddSat => lanewise(ty, a, b, |x, y| {
            (u64::from(x) + u64::from(y)).min(u64::from(max)) as u32
        }),
        Op::Min => lanewise(ty, a, b, u32::min),
        Op::Max => lanewise(ty, a, b, u32::max),
        Op::ShrImm(n) => lanewise(ty, a, a, |x, _| x >> n),
        Op::ShlImm(n) => lanewise(ty, a, a, |x, _| mask(u64::from(x) << n)),
        Op::UnpackLo | Op::UnpackHi => {
            let base = if op == Op::UnpackLo { 0 } else { 8 };
            let mut out = [0u8; 16];
            for k in 0..8 {
                set_lane(&mut out, VectorType::U16x8, k, u32::from(a[base + k]));
            }
            out
        }
        Op::PackUs => {
            let mut out = [0u8; 16];
            for k in 0..8 {
                out[k] = lane(a, VectorType::U16x8, k).min(255) as u8;
                out[k + 8] = lane(b, VectorType::U16x8, k).min(255) as u8;
            }
            out
        }
        Op::BroadcastAlpha => {
            let mut out = [0u8; 16];
            for k in 0..8 {
                let alpha = lane(a, VectorType::U16x8, (k & !3) + 3);
                set_lane(&mut out, VectorType::U16x8, k, alpha);
            }
            out
        }
        Op::LoadInput { .. } | Op::StoreOutput { .. } | Op::StoreMasked { .. } => {
            unreachable!("stream ops are executed by the machine loop")
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/machine.rs"]
mod tests;
