//! Textual and JSON views of programs and their lowered code.

use std::fmt::Write as _;

use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::codegen::{CompiledProgram, MachineInst};
use crate::jit::liveness::Liveness;
use crate::jit::program::{Inst, Op, Program, Span, SpanKind};
use crate::jit::vector::VectorType;

const XXH3_SEED: u64 = 0x5ca1_ab1e_f00d_d00d;

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_inst(out: &mut String, inst: &Inst) {
    if let Some(d) = inst.dst {
        let _ = write!(out, "{d} = ");
    }
    let _ = write!(out, "{}.{}", inst.op.mnemonic(), inst.ty);
    match inst.op {
        Op::Const { bytes } => {
            let _ = write!(out, " 0x");
            for b in bytes.iter().rev() {
                let _ = write!(out, "{b:02x}");
            }
        }
        Op::LoadInput { stream } | Op::StoreOutput { stream } | Op::StoreMasked { stream } => {
            let _ = write!(out, " {stream:?}");
        }
        Op::ShrImm(n) | Op::ShlImm(n) => {
            let _ = write!(out, " #{n}");
        }
        _ => {}
    }
    for (k, s) in inst.srcs.iter().enumerate() {
        let sep = if k == 0 && !inst.op.touches_stream() {
            " "
        } else {
            ", "
        };
        let _ = write!(out, "{sep}{s}");
    }
}

fn span_header(span: &Span) -> String {
    match span.kind {
        SpanKind::Loop => "loop {".to_string(),
        SpanKind::Branch { cond } => format!("if any({cond}) {{"),
    }
}

/// Instruction listing with span markers. Each defining instruction shows its variable's live
/// range when the program passes liveness analysis.
pub fn dump_program(program: &Program) -> String {
    let liveness = Liveness::compute(program).ok();
    let spans = program.spans();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "program {} ({} vars, {} insts)",
        program.name(),
        program.var_count(),
        program.insts().len()
    );
    let mut depth: usize = 0;
    for (i, inst) in program.insts().iter().enumerate() {
        for span in spans.iter().filter(|s| s.start == i) {
            indent(&mut out, depth);
            out.push_str(&span_header(span));
            out.push('\n');
            depth += 1;
        }
        indent(&mut out, depth);
        let _ = write!(out, "{i:3}: ");
        write_inst(&mut out, inst);
        if let (Some(d), Some(l)) = (inst.dst, liveness.as_ref()) {
            let r = l.range(d);
            let _ = write!(out, "  ; live {}..{}", r.def, r.last_use);
        }
        out.push('\n');
        for _ in spans.iter().filter(|s| s.end == i + 1) {
            depth = depth.saturating_sub(1);
            indent(&mut out, depth);
            out.push_str("}\n");
        }
    }
    out
}

/// Lowered listing with physical registers and spill slots.
pub fn dump_compiled(compiled: &CompiledProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "compiled {} (gp {}, vector {}, frame {} slots, {} spills, {} reloads)",
        compiled.name(),
        compiled.gp_registers,
        compiled.vector_registers,
        compiled.frame_slots(),
        compiled.spill_count(),
        compiled.reload_count()
    );
    let mut depth: usize = 0;
    for (pc, inst) in compiled.code().iter().enumerate() {
        if matches!(inst, MachineInst::LoopEnd | MachineInst::BranchEnd) {
            depth = depth.saturating_sub(1);
        }
        indent(&mut out, depth);
        let _ = write!(out, "{pc:3}: ");
        match inst {
            MachineInst::Op { op, ty, dst, srcs } => {
                if let Some(d) = dst {
                    let _ = write!(out, "{d} = ");
                }
                let _ = write!(out, "{}.{ty}", op.mnemonic());
                if let Op::ShrImm(n) | Op::ShlImm(n) = op {
                    let _ = write!(out, " #{n}");
                }
                let regs: Vec<String> = srcs.iter().map(ToString::to_string).collect();
                if !regs.is_empty() {
                    let _ = write!(out, " {}", regs.join(", "));
                }
            }
            MachineInst::Spill { reg, slot } => {
                let _ = write!(out, "spill {reg} -> [{slot}]");
            }
            MachineInst::Reload { slot, reg } => {
                let _ = write!(out, "reload [{slot}] -> {reg}");
            }
            MachineInst::Move { dst, src } => {
                let _ = write!(out, "mov {dst} <- {src}");
            }
            MachineInst::LoopBegin => out.push_str("loop {"),
            MachineInst::BranchBegin { cond } => {
                let _ = write!(out, "if any({cond}) {{");
            }
            MachineInst::LoopEnd | MachineInst::BranchEnd => out.push('}'),
        }
        out.push('\n');
        if matches!(
            inst,
            MachineInst::LoopBegin | MachineInst::BranchBegin { .. }
        ) {
            depth += 1;
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VarDump {
    pub var: String,
    pub ty: VectorType,
    pub def: usize,
    pub last_use: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
}

/// Machine-readable summary of a program and its compilation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgramDump {
    pub name: String,
    pub insts: usize,
    pub spans: Vec<Span>,
    pub vars: Vec<VarDump>,
    pub machine_insts: usize,
    pub frame_slots: u32,
    pub spills: usize,
    pub reloads: usize,
    /// xxh3 of the lowered code, hex.
    pub fingerprint: String,
}

impl ProgramDump {
    pub fn new(program: &Program, compiled: &CompiledProgram) -> ScanResult<Self> {
        let vars = program
            .vars()
            .zip(compiled.ranges.iter())
            .map(|(v, r)| VarDump {
                var: v.to_string(),
                ty: program.var_type(v),
                def: r.def,
                last_use: r.last_use,
                slot: compiled.slot_of(v),
            })
            .collect();
        Ok(Self {
            name: program.name().to_string(),
            insts: program.insts().len(),
            spans: program.spans().to_vec(),
            vars,
            machine_insts: compiled.code().len(),
            frame_slots: compiled.frame_slots(),
            spills: compiled.spill_count(),
            reloads: compiled.reload_count(),
            fingerprint: format!("{:016x}", code_fingerprint(compiled)?),
        })
    }
}

/// Stable hash of the lowered instruction stream.
pub fn code_fingerprint(compiled: &CompiledProgram) -> ScanResult<u64> {
    let mut h = Xxh3::with_seed(XXH3_SEED);
    for inst in compiled.code() {
        let bytes = serde_json::to_vec(inst).map_err(|e| ScanError::Other(e.into()))?;
        h.update(&bytes);
        h.update(b"\n");
    }
    Ok(h.digest())
}

#[cfg(test)]
#[path = "../../tests/unit/jit/dump.rs"]
mod tests;
