//! Where each JIT variable's current value lives: a register, its spill slot, or both.
//!
//! The locator is driven by the code generator, which must call the transitions in a
//! store-before-evict, load-before-use order. A call that would lose the only copy of a live
//! value is a code generator bug and panics.

use serde::Serialize;

use crate::foundation::error::ScanResult;
use crate::jit::program::VarId;
use crate::jit::vector::VectorType;
use crate::memory::dynarray::{DynArray, DynArrayOpts};

/// Register file a value is allocated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegClass {
    /// Scalar values.
    Gp,
    /// 16-byte vector values.
    Vector,
}

impl RegClass {
    pub fn of(ty: VectorType) -> Self {
        if ty.is_vector() {
            RegClass::Vector
        } else {
            RegClass::Gp
        }
    }

    fn slot(self) -> usize {
        match self {
            RegClass::Gp => 0,
            RegClass::Vector => 1,
        }
    }
}

/// Physical register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Reg {
    pub class: RegClass,
    pub index: u8,
}

impl Reg {
    pub const fn gp(index: u8) -> Self {
        Self {
            class: RegClass::Gp,
            index,
        }
    }

    pub const fn vector(index: u8) -> Self {
        Self {
            class: RegClass::Vector,
            index,
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.class {
            RegClass::Gp => write!(f, "g{}", self.index),
            RegClass::Vector => write!(f, "x{}", self.index),
        }
    }
}

/// Per-variable location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VarState {
    reg: Option<Reg>,
    in_memory: bool,
    ever_in_memory: bool,
}

impl VarState {
    pub fn reg(&self) -> Option<Reg> {
        self.reg
    }

    pub fn in_memory(&self) -> bool {
        self.in_memory
    }

    pub fn ever_in_memory(&self) -> bool {
        self.ever_in_memory
    }
}

pub struct Locator {
    vars: Vec<VarState>,
    // Raw `VarId` per register, 0 when free. Indexed by `RegClass::slot`.
    regs: [DynArray<'static, u32>; 2],
}

impl Locator {
    pub fn new(var_count: usize, gp_registers: u8, vector_registers: u8) -> ScanResult<Self> {
        let zeroed = DynArrayOpts { zero_fill: true };
        let mut regs = [DynArray::new(zeroed), DynArray::new(zeroed)];
        regs[RegClass::Gp.slot()].add_multiple(usize::from(gp_registers))?;
        regs[RegClass::Vector.slot()].add_multiple(usize::from(vector_registers))?;
        Ok(Self {
            vars: vec![VarState::default(); var_count],
            regs,
        })
    }

    pub fn register_count(&self, class: RegClass) -> u8 {
        self.regs[class.slot()].count() as u8
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn state(&self, var: VarId) -> VarState {
        self.vars[var.index()]
    }

    fn occupant_raw(&self, reg: Reg) -> u32 {
        let file = self.regs[reg.class.slot()].as_slice();
        assert!(
            usize::from(reg.index) < file.len(),
            "register {reg} is outside a file of {}",
            file.len()
        );
        file[usize::from(reg.index)]
    }

    fn set_occupant(&mut self, reg: Reg, var: Option<VarId>) {
        self.regs[reg.class.slot()].as_mut_slice()[usize::from(reg.index)] =
            var.map_or(0, VarId::raw);
    }

    /// A new value of `var` is produced in `reg`. Any other occupant must already be saved.
    pub fn set_value(&mut self, var: VarId, reg: Reg) {
        if let Some(old) = self.which_variable_occupies(reg)
            && old != var
        {
            assert!(
                self.vars[old.index()].in_memory,
                "set_value({var}, {reg}): {reg} holds {old}, which has no memory copy"
            );
            self.vars[old.index()].reg = None;
        }
        if let Some(prev) = self.vars[var.index()].reg
            && prev != reg
        {
            self.set_occupant(prev, None);
        }
        self.set_occupant(reg, Some(var));
        let st = &mut self.vars[var.index()];
        st.reg = Some(reg);
        st.in_memory = false;
    }

    /// Reloads a spilled `var` into the free register `reg`.
    pub fn load_from_memory(&mut self, var: VarId, reg: Reg) {
        let st = self.vars[var.index()];
        assert!(st.in_memory, "load_from_memory({var}, {reg}): {var} is not in memory");
        assert!(
            st.reg.is_none(),
            "load_from_memory({var}, {reg}): {var} is already in {}",
            st.reg.map_or_else(String::new, |r| r.to_string())
        );
        assert!(
            self.which_variable_occupies(reg).is_none(),
            "load_from_memory({var}, {reg}): {reg} is not free"
        );
        self.set_occupant(reg, Some(var));
        self.vars[var.index()].reg = Some(reg);
    }

    /// Stores a register-only `var` to its spill slot.
    pub fn save_to_spill(&mut self, var: VarId) {
        let st = &mut self.vars[var.index()];
        assert!(
            st.reg.is_some() && !st.in_memory,
            "save_to_spill({var}): {var} is not held in a register only"
        );
        st.in_memory = true;
        st.ever_in_memory = true;
    }

    /// Releases `reg`; its occupant must have a memory copy.
    pub fn free_register(&mut self, reg: Reg) {
        let Some(var) = self.which_variable_occupies(reg) else {
            panic!("free_register({reg}): register is already free");
        };
        assert!(
            self.vars[var.index()].in_memory,
            "free_register({reg}): {var} has no memory copy"
        );
        self.vars[var.index()].reg = None;
        self.set_occupant(reg, None);
    }

    /// Moves the value in `src` to `dest`, evicting a saved occupant of `dest`.
    pub fn move_reg_to_reg(&mut self, dest: Reg, src: Reg) {
        let Some(var) = self.which_variable_occupies(src) else {
            panic!("move_reg_to_reg({dest}, {src}): {src} holds no value");
        };
        assert_eq!(
            dest.class, src.class,
            "move_reg_to_reg({dest}, {src}): register classes differ"
        );
        if dest == src {
            return;
        }
        if let Some(other) = self.which_variable_occupies(dest) {
            assert!(
                self.vars[other.index()].in_memory,
                "move_reg_to_reg({dest}, {src}): {dest} holds {other}, which has no memory copy"
            );
            self.vars[other.index()].reg = None;
        }
        self.set_occupant(src, None);
        self.set_occupant(dest, Some(var));
        self.vars[var.index()].reg = Some(dest);
    }

    /// `var` is dead: drop its register and memory copy. `ever_in_memory` is kept for frame
    /// layout.
    pub fn mark_out_of_scope(&mut self, var: VarId) {
        if let Some(reg) = self.vars[var.index()].reg.take() {
            self.set_occupant(reg, None);
        }
        self.vars[var.index()].in_memory = false;
    }

    /// Evicts every register-resident variable for which `is_live` is false.
    pub fn scope_filter(&mut self, is_live: impl Fn(VarId) -> bool) {
        let resident: Vec<VarId> = self.occupied().map(|(_, v)| v).collect();
        for var in resident {
            if !is_live(var) {
                self.mark_out_of_scope(var);
            }
        }
    }

    pub fn which_variable_occupies(&self, reg: Reg) -> Option<VarId> {
        VarId::from_raw(self.occupant_raw(reg))
    }

    pub fn which_register_holds(&self, var: VarId) -> Option<Reg> {
        self.vars[var.index()].reg
    }

    pub fn is_in_memory(&self, var: VarId) -> bool {
        self.vars[var.index()].in_memory
    }

    pub fn is_in_register(&self, var: VarId) -> bool {
        self.vars[var.index()].reg.is_some()
    }

    pub fn was_ever_in_memory(&self, var: VarId) -> bool {
        self.vars[var.index()].ever_in_memory
    }

    /// Occupied registers of both classes with their variables.
    pub fn occupied(&self) -> impl Iterator<Item = (Reg, VarId)> + '_ {
        [RegClass::Gp, RegClass::Vector]
            .into_iter()
            .flat_map(move |class| {
                self.regs[class.slot()]
                    .as_slice()
                    .iter()
                    .enumerate()
                    .filter_map(move |(i, &raw)| {
                        VarId::from_raw(raw).map(|v| {
                            (
                                Reg {
                                    class,
                                    index: i as u8,
                                },
                                v,
                            )
                        })
                    })
            })
    }

    pub fn first_free(&self, class: RegClass) -> Option<Reg> {
        self.regs[class.slot()]
            .as_slice()
            .iter()
            .position(|&raw| raw == 0)
            .map(|i| Reg {
                class,
                index: i as u8,
            })
    }

    /// True when the register files and variable states agree in both directions.
    pub fn is_consistent(&self) -> bool {
        let forward = self.occupied().all(|(reg, var)| {
            self.vars
                .get(var.index())
                .is_some_and(|st| st.reg == Some(reg))
        });
        let backward = self.vars.iter().enumerate().all(|(i, st)| match st.reg {
            Some(reg) => self.occupant_raw(reg) == VarId::from_index(i).raw(),
            None => true,
        });
        let spilled_marked = self
            .vars
            .iter()
            .all(|st| !st.in_memory || st.ever_in_memory);
        forward && backward && spilled_marked
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/locator.rs"]
mod tests;
