//! Per-pixel programs for the JIT, built through an explicit [`ProgramBuilder`].
//!
//! A program is a straight-line instruction list with nested spans. At most one [`SpanKind::Loop`]
//! exists; its body runs once per 16-byte pixel group and is the only place streams may be
//! touched. Instructions before the loop form the prologue.

use std::num::NonZeroU32;

use serde::Serialize;
use smallvec::{SmallVec, smallvec};

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::vector::VectorType;

/// Abstract program variable. Ids start at 1 so that 0 can mean "free register".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(NonZeroU32);

impl VarId {
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).map_or(u32::MAX, |i| i.saturating_add(1));
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MAX))
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    /// Source scanline, read-only.
    Src,
    /// Destination scanline, read and written.
    Dst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Const { bytes: [u8; 16] },
    LoadInput { stream: Stream },
    StoreOutput { stream: Stream },
    /// Stores `srcs[0]` pixel by pixel where the matching 4 bytes of `srcs[1]` are nonzero.
    StoreMasked { stream: Stream },
    Add,
    Sub,
    Mul,
    AddSat,
    And,
    Or,
    Xor,
    Min,
    Max,
    ShrImm(u8),
    ShlImm(u8),
    /// Zero-extends the low eight bytes of a `u8x16` into a `u16x8`.
    UnpackLo,
    /// Zero-extends the high eight bytes of a `u8x16` into a `u16x8`.
    UnpackHi,
    /// Packs two `u16x8` into one `u8x16` with unsigned saturation.
    PackUs,
    /// Copies lane 3 of each 4-lane pixel of a `u16x8` to all four lanes.
    BroadcastAlpha,
}

impl Op {
    pub fn arity(self) -> usize {
        match self {
            Op::Const { .. } | Op::LoadInput { .. } => 0,
            Op::StoreOutput { .. }
            | Op::ShrImm(_)
            | Op::ShlImm(_)
            | Op::UnpackLo
            | Op::UnpackHi
            | Op::BroadcastAlpha => 1,
            _ => 2,
        }
    }

    pub fn has_result(self) -> bool {
        !matches!(self, Op::StoreOutput { .. } | Op::StoreMasked { .. })
    }

    pub fn touches_stream(self) -> bool {
        matches!(
            self,
            Op::LoadInput { .. } | Op::StoreOutput { .. } | Op::StoreMasked { .. }
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Const { .. } => "const",
            Op::LoadInput { .. } => "load",
            Op::StoreOutput { .. } => "store",
            Op::StoreMasked { .. } => "store.masked",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::AddSat => "add.sat",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Min => "min",
            Op::Max => "max",
            Op::ShrImm(_) => "shr",
            Op::ShlImm(_) => "shl",
            Op::UnpackLo => "unpack.lo",
            Op::UnpackHi => "unpack.hi",
            Op::PackUs => "pack.us",
            Op::BroadcastAlpha => "bcast.alpha",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Inst {
    pub op: Op,
    pub ty: VectorType,
    pub dst: Option<VarId>,
    pub srcs: SmallVec<[VarId; 2]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Loop,
    /// Skipped for a pixel group when every byte of `cond` is zero.
    Branch { cond: VarId },
}

/// Instruction range `[start, end)` covered by a loop or branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, pos: usize) -> bool {
        (self.start..self.end).contains(&pos)
    }
}

#[derive(Clone, Debug)]
pub struct Program {
    name: String,
    insts: Vec<Inst>,
    // Sorted by start; an enclosing span precedes the spans it contains.
    spans: Vec<Span>,
    var_types: Vec<VectorType>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn var_count(&self) -> usize {
        self.var_types.len()
    }

    pub fn var_type(&self, var: VarId) -> VectorType {
        self.var_types[var.index()]
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.var_types.len()).map(VarId::from_index)
    }

    pub fn loop_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == SpanKind::Loop)
    }
}

/// Incremental program construction. Each method that produces a value defines a fresh
/// variable, so every variable has exactly one definition.
pub struct ProgramBuilder {
    name: String,
    insts: Vec<Inst>,
    spans: Vec<Span>,
    open: Vec<(SpanKind, usize)>,
    // Position of the first `end_span` with nothing open.
    stray_end: Option<usize>,
    var_types: Vec<VectorType>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            insts: Vec::new(),
            spans: Vec::new(),
            open: Vec::new(),
            stray_end: None,
            var_types: Vec::new(),
        }
    }

    fn new_var(&mut self, ty: VectorType) -> VarId {
        self.var_types.push(ty);
        VarId::from_index(self.var_types.len() - 1)
    }

    fn ty(&self, var: VarId) -> VectorType {
        self.var_types[var.index()]
    }

    fn push(&mut self, op: Op, ty: VectorType, srcs: SmallVec<[VarId; 2]>) -> Option<VarId> {
        let dst = op.has_result().then(|| self.new_var(ty));
        self.insts.push(Inst { op, ty, dst, srcs });
        dst
    }

    fn push_value(&mut self, op: Op, ty: VectorType, srcs: SmallVec<[VarId; 2]>) -> VarId {
        let dst = self.new_var(ty);
        self.insts.push(Inst {
            op,
            ty,
            dst: Some(dst),
            srcs,
        });
        dst
    }

    pub fn constant(&mut self, ty: VectorType, bytes: [u8; 16]) -> VarId {
        self.push_value(Op::Const { bytes }, ty, SmallVec::new())
    }

    pub fn splat_u16(&mut self, v: u16) -> VarId {
        let mut bytes = [0u8; 16];
        for lane in bytes.chunks_exact_mut(2) {
            lane.copy_from_slice(&v.to_le_bytes());
        }
        self.constant(VectorType::U16x8, bytes)
    }

    /// `u8x16` constant with `pattern` repeated for each of the four pixels.
    pub fn pixel_mask(&mut self, pattern: [u8; 4]) -> VarId {
        let mut bytes = [0u8; 16];
        for px in bytes.chunks_exact_mut(4) {
            px.copy_from_slice(&pattern);
        }
        self.constant(VectorType::U8x16, bytes)
    }

    pub fn load(&mut self, stream: Stream) -> VarId {
        self.push_value(Op::LoadInput { stream }, VectorType::U8x16, SmallVec::new())
    }

    pub fn store(&mut self, stream: Stream, value: VarId) {
        let ty = self.ty(value);
        self.push(Op::StoreOutput { stream }, ty, smallvec![value]);
    }

    pub fn store_masked(&mut self, stream: Stream, value: VarId, mask: VarId) {
        let ty = self.ty(value);
        self.push(Op::StoreMasked { stream }, ty, smallvec![value, mask]);
    }

    /// Lane-wise binary op; the result has the type of `a`.
    pub fn binary(&mut self, op: Op, a: VarId, b: VarId) -> VarId {
        let ty = self.ty(a);
        self.push_value(op, ty, smallvec![a, b])
    }

    pub fn add(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::Add, a, b)
    }

    pub fn sub(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::Sub, a, b)
    }

    pub fn mul(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::Mul, a, b)
    }

    pub fn add_sat(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::AddSat, a, b)
    }

    pub fn and(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::And, a, b)
    }

    pub fn or(&mut self, a: VarId, b: VarId) -> VarId {
        self.binary(Op::Or, a, b)
    }

    pub fn shr(&mut self, a: VarId, n: u8) -> VarId {
        let ty = self.ty(a);
        self.push_value(Op::ShrImm(n), ty, smallvec![a])
    }

    pub fn shl(&mut self, a: VarId, n: u8) -> VarId {
        let ty = self.ty(a);
        self.push_value(Op::ShlImm(n), ty, smallvec![a])
    }

    pub fn unpack_lo(&mut self, a: VarId) -> VarId {
        self.push_value(Op::UnpackLo, VectorType::U16x8, smallvec![a])
    }

    pub fn unpack_hi(&mut self, a: VarId) -> VarId {
        self.push_value(Op::UnpackHi, VectorType::U16x8, smallvec![a])
    }

    pub fn pack_us(&mut self, lo: VarId, hi: VarId) -> VarId {
        self.push_value(Op::PackUs, VectorType::U8x16, smallvec![lo, hi])
    }

    pub fn broadcast_alpha(&mut self, a: VarId) -> VarId {
        self.push_value(Op::BroadcastAlpha, VectorType::U16x8, smallvec![a])
    }

    /// `round(x * a / 255)` on `u16x8` lanes holding 8-bit values.
    pub fn mul_div255(&mut self, x: VarId, a: VarId, half: VarId) -> VarId {
        let p = self.mul(x, a);
        let t = self.add(p, half);
        let t8 = self.shr(t, 8);
        let s = self.add(t, t8);
        self.shr(s, 8)
    }

    pub fn begin_loop(&mut self) {
        self.open.push((SpanKind::Loop, self.insts.len()));
    }

    pub fn begin_branch(&mut self, cond: VarId) {
        self.open.push((SpanKind::Branch { cond }, self.insts.len()));
    }

    /// Closes the innermost open span. A call with no open span fails `finish`.
    pub fn end_span(&mut self) {
        match self.open.pop() {
            Some((kind, start)) => self.spans.push(Span {
                kind,
                start,
                end: self.insts.len(),
            }),
            None => {
                self.stray_end.get_or_insert(self.insts.len());
            }
        }
    }

    /// Validates structure and operand types.
    pub fn finish(mut self) -> ScanResult<Program> {
        if let Some((kind, start)) = self.open.last() {
            return Err(ScanError::validation(format!(
                "program '{}': {kind:?} opened at {start} is never closed",
                self.name
            )));
        }
        if let Some(pos) = self.stray_end {
            return Err(self.invalid(format!("span closed at {pos} was never opened")));
        }
        // Outer spans close after inner ones; order by start, longest first.
        self.spans
            .sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        self.validate_spans()?;
        for (i, inst) in self.insts.iter().enumerate() {
            self.validate_inst(i, inst)?;
        }
        Ok(Program {
            name: self.name,
            insts: self.insts,
            spans: self.spans,
            var_types: self.var_types,
        })
    }

    fn invalid(&self, msg: impl std::fmt::Display) -> ScanError {
        ScanError::validation(format!("program '{}': {msg}", self.name))
    }

    fn validate_spans(&self) -> ScanResult<()> {
        let loops: Vec<&Span> = self
            .spans
            .iter()
            .filter(|s| s.kind == SpanKind::Loop)
            .collect();
        if loops.len() > 1 {
            return Err(self.invalid("only one loop is supported"));
        }
        for (i, a) in self.spans.iter().enumerate() {
            for b in &self.spans[i + 1..] {
                let disjoint = a.end <= b.start || b.end <= a.start;
                let nested = (a.start <= b.start && b.end <= a.end)
                    || (b.start <= a.start && a.end <= b.end);
                if !disjoint && !nested {
                    return Err(self.invalid(format!(
                        "spans {}..{} and {}..{} overlap",
                        a.start, a.end, b.start, b.end
                    )));
                }
            }
        }
        for s in &self.spans {
            if s.start == s.end {
                return Err(self.invalid(format!("empty {:?} at {}", s.kind, s.start)));
            }
            if let SpanKind::Branch { cond } = s.kind {
                if !self.insts[..s.start].iter().any(|p| p.dst == Some(cond)) {
                    return Err(self.invalid(format!(
                        "branch condition {cond} is not defined before the branch"
                    )));
                }
                if let Some(l) = loops.first()
                    && !(l.start <= s.start && s.end <= l.end)
                {
                    return Err(self.invalid("branches must sit inside the loop"));
                }
            }
        }
        Ok(())
    }

    fn validate_inst(&self, i: usize, inst: &Inst) -> ScanResult<()> {
        use VectorType as T;
        if inst.srcs.len() != inst.op.arity() {
            return Err(self.invalid(format!(
                "{i}: {} takes {} operands, got {}",
                inst.op.mnemonic(),
                inst.op.arity(),
                inst.srcs.len()
            )));
        }
        if inst.op.touches_stream() {
            let in_loop = self
                .spans
                .iter()
                .any(|s| s.kind == SpanKind::Loop && s.contains(i));
            if !in_loop {
                return Err(self.invalid(format!("{i}: stream access outside the loop")));
            }
        }
        let src_tys: SmallVec<[VectorType; 2]> = inst.srcs.iter().map(|&v| self.ty(v)).collect();
        let ok = match inst.op {
            Op::Const { .. } => true,
            Op::LoadInput { .. } => inst.ty == T::U8x16,
            Op::StoreOutput { stream } => stream == Stream::Dst && src_tys[0] == T::U8x16,
            Op::StoreMasked { stream } => {
                stream == Stream::Dst && src_tys[0] == T::U8x16 && src_tys[1] == T::U8x16
            }
            Op::ShrImm(n) | Op::ShlImm(n) => {
                !inst.ty.is_float()
                    && src_tys[0] == inst.ty
                    && u32::from(n) < 8 * inst.ty.lane_bytes() as u32
            }
            Op::UnpackLo | Op::UnpackHi => src_tys[0] == T::U8x16,
            Op::PackUs => src_tys[0] == T::U16x8 && src_tys[1] == T::U16x8,
            Op::BroadcastAlpha => src_tys[0] == T::U16x8,
            Op::And | Op::Or | Op::Xor => {
                src_tys[0].byte_size() == src_tys[1].byte_size() && src_tys[0] == inst.ty
            }
            _ => src_tys[0] == inst.ty && src_tys[1] == inst.ty,
        };
        if !ok {
            return Err(self.invalid(format!(
                "{i}: bad operand types for {} {}: {:?}",
                inst.op.mnemonic(),
                inst.ty,
                src_tys
            )));
        }
        for &v in &inst.srcs {
            let defined_before = self.insts[..i].iter().any(|p| p.dst == Some(v));
            if !defined_before {
                return Err(self.invalid(format!("{i}: {v} used before its definition")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/program.rs"]
mod tests;
