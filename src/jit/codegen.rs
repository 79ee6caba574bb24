//! Lowers a [`Program`] to register-allocated [`MachineInst`]s, driving the [`Locator`].
//!
//! Registers are assigned greedily in program order. When a file is full the variable whose next
//! read is furthest away is evicted, saved first if it has no memory copy. On span exit every
//! value live past the span is put back in the register it occupied at entry, and a memory copy
//! made inside the span is forgotten, so the skipped-branch path and the loop back edge agree
//! with the taken path.

use serde::Serialize;
use smallvec::SmallVec;

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::liveness::{LiveRange, Liveness};
use crate::jit::locator::{Locator, Reg, RegClass};
use crate::jit::program::{Op, Program, Span, SpanKind, VarId};
use crate::jit::vector::VectorType;

/// Register file sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodegenOpts {
    pub gp_registers: u8,
    pub vector_registers: u8,
}

impl Default for CodegenOpts {
    fn default() -> Self {
        Self {
            gp_registers: 8,
            vector_registers: 8,
        }
    }
}

impl CodegenOpts {
    pub const MAX_REGISTERS: u8 = 32;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MachineInst {
    Op {
        op: Op,
        ty: VectorType,
        dst: Option<Reg>,
        srcs: SmallVec<[Reg; 2]>,
    },
    Spill {
        reg: Reg,
        slot: u32,
    },
    Reload {
        slot: u32,
        reg: Reg,
    },
    Move {
        dst: Reg,
        src: Reg,
    },
    LoopBegin,
    LoopEnd,
    BranchBegin {
        cond: Reg,
    },
    BranchEnd,
}

/// Output of [`compile`].
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub(crate) name: String,
    pub(crate) code: Vec<MachineInst>,
    pub(crate) frame_slots: u32,
    pub(crate) gp_registers: u8,
    pub(crate) vector_registers: u8,
    pub(crate) ranges: Vec<LiveRange>,
    pub(crate) var_slots: Vec<Option<u32>>,
    pub(crate) spills: usize,
    pub(crate) reloads: usize,
}

impl CompiledProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[MachineInst] {
        &self.code
    }

    /// Spill slots reserved in the frame, one per variable that was ever saved.
    pub fn frame_slots(&self) -> u32 {
        self.frame_slots
    }

    pub fn slot_of(&self, var: VarId) -> Option<u32> {
        self.var_slots.get(var.index()).copied().flatten()
    }

    pub fn spill_count(&self) -> usize {
        self.spills
    }

    pub fn reload_count(&self) -> usize {
        self.reloads
    }

    pub fn register_count(&self, class: RegClass) -> u8 {
        match class {
            RegClass::Gp => self.gp_registers,
            RegClass::Vector => self.vector_registers,
        }
    }
}

// Live register contents at span entry, with whether each value had a memory copy.
type Snapshot = SmallVec<[(VarId, Reg, bool); 8]>;

/// State of one compilation. Owned by the caller of [`compile`]; nothing is shared between
/// compilations.
pub struct CompileCtx<'p> {
    program: &'p Program,
    liveness: Liveness,
    locator: Locator,
    code: Vec<MachineInst>,
    var_slots: Vec<Option<u32>>,
    next_slot: u32,
    spills: usize,
    reloads: usize,
    open: Vec<(Span, Snapshot)>,
}

#[tracing::instrument(skip_all, fields(program = program.name()))]
pub fn compile(program: &Program, opts: &CodegenOpts) -> ScanResult<CompiledProgram> {
    for (class, n) in [
        (RegClass::Gp, opts.gp_registers),
        (RegClass::Vector, opts.vector_registers),
    ] {
        if n > CodegenOpts::MAX_REGISTERS {
            return Err(ScanError::validation(format!(
                "{class:?} register file of {n} exceeds {}",
                CodegenOpts::MAX_REGISTERS
            )));
        }
    }
    let mut ctx = CompileCtx::new(program, opts)?;
    ctx.run()?;
    let compiled = ctx.finish(opts);
    tracing::debug!(
        insts = compiled.code.len(),
        frame_slots = compiled.frame_slots,
        spills = compiled.spills,
        reloads = compiled.reloads,
        "compiled"
    );
    Ok(compiled)
}

impl<'p> CompileCtx<'p> {
    pub fn new(program: &'p Program, opts: &CodegenOpts) -> ScanResult<Self> {
        Ok(Self {
            program,
            liveness: Liveness::compute(program)?,
            locator: Locator::new(program.var_count(), opts.gp_registers, opts.vector_registers)?,
            code: Vec::new(),
            var_slots: vec![None; program.var_count()],
            next_slot: 0,
            spills: 0,
            reloads: 0,
            open: Vec::new(),
        })
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    fn class_of(&self, var: VarId) -> RegClass {
        RegClass::of(self.program.var_type(var))
    }

    fn slot(&mut self, var: VarId) -> u32 {
        if let Some(s) = self.var_slots[var.index()] {
            return s;
        }
        let s = self.next_slot;
        self.next_slot += 1;
        self.var_slots[var.index()] = Some(s);
        s
    }

    fn run(&mut self) -> ScanResult<()> {
        let program = self.program;
        let spans = program.spans();
        for i in 0..program.insts().len() {
            for span in spans.iter().filter(|s| s.start == i) {
                self.enter_span(*span, i)?;
            }
            self.emit_inst(i)?;
            while let Some((span, _)) = self.open.last()
                && span.end == i + 1
            {
                self.exit_span()?;
            }
        }
        Ok(())
    }

    fn spill(&mut self, var: VarId, reg: Reg) {
        let slot = self.slot(var);
        self.code.push(MachineInst::Spill { reg, slot });
        self.locator.save_to_spill(var);
        self.spills += 1;
        tracing::trace!(%var, %reg, slot, "spill");
    }

    fn reload(&mut self, var: VarId, reg: Reg) {
        let slot = self.slot(var);
        self.code.push(MachineInst::Reload { slot, reg });
        self.locator.load_from_memory(var, reg);
        self.reloads += 1;
    }

    /// A free register of `class`, evicting the resident value read furthest in the future.
    fn acquire(&mut self, class: RegClass, protected: &[Reg], pos: usize) -> ScanResult<Reg> {
        if let Some(r) = self.locator.first_free(class) {
            return Ok(r);
        }
        let victim = self
            .locator
            .occupied()
            .filter(|(r, _)| r.class == class && !protected.contains(r))
            .max_by_key(|&(r, v)| (self.liveness.next_use(v, pos), std::cmp::Reverse(r.index)));
        let Some((reg, var)) = victim else {
            return Err(ScanError::unsupported(format!(
                "program '{}': {} {class:?} registers cannot hold the operands of instruction {pos}",
                self.program.name(),
                self.locator.register_count(class)
            )));
        };
        if !self.locator.is_in_memory(var) {
            self.spill(var, reg);
        }
        self.locator.free_register(reg);
        Ok(reg)
    }

    /// Register holding `var`, reloading it if needed.
    fn ensure_in_register(&mut self, var: VarId, protected: &[Reg], pos: usize) -> ScanResult<Reg> {
        if let Some(r) = self.locator.which_register_holds(var) {
            return Ok(r);
        }
        let r = self.acquire(self.class_of(var), protected, pos)?;
        self.reload(var, r);
        Ok(r)
    }

    fn emit_inst(&mut self, i: usize) -> ScanResult<()> {
        let program = self.program;
        let inst = &program.insts()[i];
        let mut protected: SmallVec<[Reg; 4]> = inst
            .srcs
            .iter()
            .filter_map(|&v| self.locator.which_register_holds(v))
            .collect();
        let mut srcs: SmallVec<[Reg; 2]> = SmallVec::new();
        for &v in &inst.srcs {
            let r = self.ensure_in_register(v, &protected, i)?;
            protected.push(r);
            srcs.push(r);
        }

        let dst = match inst.dst {
            Some(d) => {
                let class = self.class_of(d);
                let dying = inst
                    .srcs
                    .iter()
                    .copied()
                    .find(|&s| self.class_of(s) == class && self.liveness.last_use(s) == i);
                let r = match dying {
                    Some(s) => {
                        let r = self
                            .locator
                            .which_register_holds(s)
                            .unwrap_or_else(|| unreachable!("{s} was just loaded"));
                        self.locator.mark_out_of_scope(s);
                        r
                    }
                    None => self.acquire(class, &srcs, i)?,
                };
                self.locator.set_value(d, r);
                Some(r)
            }
            None => None,
        };

        self.code.push(MachineInst::Op {
            op: inst.op,
            ty: inst.ty,
            dst,
            srcs,
        });
        let liveness = &self.liveness;
        self.locator.scope_filter(|v| liveness.is_live_after(v, i));
        debug_assert!(self.locator.is_consistent());
        Ok(())
    }

    fn enter_span(&mut self, span: Span, pos: usize) -> ScanResult<()> {
        if let SpanKind::Branch { cond } = span.kind {
            let reg = self.ensure_in_register(cond, &[], pos)?;
            self.code.push(MachineInst::BranchBegin { cond: reg });
        } else {
            self.code.push(MachineInst::LoopBegin);
        }
        let snapshot: Snapshot = self
            .locator
            .occupied()
            .map(|(reg, var)| (var, reg, self.locator.is_in_memory(var)))
            .collect();
        self.open.push((span, snapshot));
        Ok(())
    }

    fn exit_span(&mut self) -> ScanResult<()> {
        let Some((span, snapshot)) = self.open.pop() else {
            return Ok(());
        };
        let last = span.end - 1;
        let wanted: Snapshot = snapshot
            .into_iter()
            .filter(|&(v, _, _)| self.liveness.is_live_after(v, last))
            .collect();

        let resident: SmallVec<[(Reg, VarId); 8]> = self.locator.occupied().collect();
        for (reg, var) in resident {
            if wanted.iter().any(|&(v, _, _)| v == var) {
                continue;
            }
            if self.liveness.is_live_after(var, last) {
                // Live past the span but not resident at entry: it was reloaded from memory.
                self.locator.free_register(reg);
            } else {
                self.locator.mark_out_of_scope(var);
            }
        }

        // Put values back where they were at entry: moves into free registers first, then
        // break any remaining cycles through memory.
        let mut pending: SmallVec<[(VarId, Reg); 8]> = wanted
            .iter()
            .filter(|&&(v, r, _)| self.locator.which_register_holds(v) != Some(r))
            .map(|&(v, r, _)| (v, r))
            .collect();
        loop {
            let before = pending.len();
            pending.retain(|&mut (var, reg)| {
                if self.locator.which_variable_occupies(reg).is_some() {
                    return true;
                }
                match self.locator.which_register_holds(var) {
                    Some(from) => {
                        self.code.push(MachineInst::Move { dst: reg, src: from });
                        self.locator.move_reg_to_reg(reg, from);
                    }
                    None => self.reload(var, reg),
                }
                false
            });
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for &(var, _) in &pending {
            if let Some(from) = self.locator.which_register_holds(var) {
                // Left its entry register by eviction, so memory holds it.
                self.locator.free_register(from);
            }
        }
        for &(var, reg) in &pending {
            self.reload(var, reg);
        }

        for &(var, reg, had_memory_copy) in &wanted {
            if !had_memory_copy && self.locator.is_in_memory(var) {
                // The store only happened on this path.
                self.locator.set_value(var, reg);
            }
        }

        self.code.push(match span.kind {
            SpanKind::Loop => MachineInst::LoopEnd,
            SpanKind::Branch { .. } => MachineInst::BranchEnd,
        });
        debug_assert!(self.locator.is_consistent());
        Ok(())
    }

    fn finish(self, opts: &CodegenOpts) -> CompiledProgram {
        let frame_slots = self.next_slot;
        debug_assert_eq!(
            frame_slots as usize,
            self.program
                .vars()
                .filter(|&v| self.locator.was_ever_in_memory(v))
                .count()
        );
        CompiledProgram {
            name: self.program.name().to_string(),
            code: self.code,
            frame_slots,
            gp_registers: opts.gp_registers,
            vector_registers: opts.vector_registers,
            ranges: self.liveness.ranges().to_vec(),
            var_slots: self.var_slots,
            spills: self.spills,
            reloads: self.reloads,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/codegen.rs"]
mod tests;
