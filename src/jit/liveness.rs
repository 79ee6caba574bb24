use serde::Serialize;
use smallvec::SmallVec;

use crate::foundation::error::{ScanError, ScanResult};
use crate::jit::program::{Program, SpanKind, VarId};

/// Definition point and last read of one variable, as instruction indices.
///
/// A variable defined before a loop and read inside it stays live through the back edge:
/// its `last_use` is at least the loop's `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LiveRange {
    pub def: usize,
    pub last_use: usize,
}

#[derive(Clone, Debug)]
pub struct Liveness {
    ranges: Vec<LiveRange>,
    uses: Vec<SmallVec<[usize; 4]>>,
}

impl Liveness {
    pub fn compute(program: &Program) -> ScanResult<Self> {
        let n = program.var_count();
        let mut def = vec![None; n];
        let mut uses: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); n];

        for (i, inst) in program.insts().iter().enumerate() {
            for &v in &inst.srcs {
                uses[v.index()].push(i);
            }
            if let Some(d) = inst.dst {
                def[d.index()] = Some(i);
            }
        }
        for span in program.spans() {
            if let SpanKind::Branch { cond } = span.kind {
                let u = &mut uses[cond.index()];
                let at = u.partition_point(|&p| p < span.start);
                u.insert(at, span.start);
            }
        }

        let mut ranges = Vec::with_capacity(n);
        for (idx, d) in def.iter().enumerate() {
            let Some(d) = *d else {
                return Err(ScanError::validation(format!(
                    "program '{}': {} is never defined",
                    program.name(),
                    VarId::from_index(idx)
                )));
            };
            let last = uses[idx].last().copied().unwrap_or(d).max(d);
            ranges.push(LiveRange {
                def: d,
                last_use: last,
            });
        }

        for span in program.spans() {
            for (idx, r) in ranges.iter_mut().enumerate() {
                let used_inside = uses[idx].iter().any(|&u| span.contains(u));
                if span.kind == SpanKind::Loop && r.def < span.start && used_inside {
                    r.last_use = r.last_use.max(span.end);
                }
                if span.contains(r.def) && r.last_use >= span.end {
                    return Err(ScanError::unsupported(format!(
                        "program '{}': {} is defined inside a {} and read after it",
                        program.name(),
                        VarId::from_index(idx),
                        match span.kind {
                            SpanKind::Loop => "loop",
                            SpanKind::Branch { .. } => "branch",
                        }
                    )));
                }
            }
        }

        Ok(Self { ranges, uses })
    }

    pub fn range(&self, var: VarId) -> LiveRange {
        self.ranges[var.index()]
    }

    pub fn ranges(&self) -> &[LiveRange] {
        &self.ranges
    }

    pub fn last_use(&self, var: VarId) -> usize {
        self.ranges[var.index()].last_use
    }

    /// Still needed by some instruction after `pos`.
    pub fn is_live_after(&self, var: VarId, pos: usize) -> bool {
        self.ranges[var.index()].last_use > pos
    }

    /// First read strictly after `pos`; a variable kept alive only by a loop back edge reports
    /// its extended end.
    pub fn next_use(&self, var: VarId, pos: usize) -> usize {
        let u = &self.uses[var.index()];
        let at = u.partition_point(|&p| p <= pos);
        u.get(at)
            .copied()
            .unwrap_or_else(|| self.last_use(var))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/liveness.rs"]
mod tests;
