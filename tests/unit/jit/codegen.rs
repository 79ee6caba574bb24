use super::*;

use crate::jit::kernels::{premultiply_program, src_over_al_program};
use crate::jit::program::{ProgramBuilder, Stream};

fn vector_opts(n: u8) -> CodegenOpts {
    CodegenOpts {
        vector_registers: n,
        ..CodegenOpts::default()
    }
}

/// Adds three loop-invariant constants to the low half of each source group.
fn bias_program() -> Program {
    let mut b = ProgramBuilder::new("bias");
    let c1 = b.splat_u16(1);
    let c2 = b.splat_u16(2);
    let c3 = b.splat_u16(3);
    b.begin_loop();
    let s = b.load(Stream::Src);
    let lo = b.unpack_lo(s);
    let x = b.add(lo, c1);
    let y = b.add(x, c2);
    let z = b.add(y, c3);
    let hi = b.unpack_hi(s);
    let w = b.pack_us(z, hi);
    b.store(Stream::Dst, w);
    b.end_span();
    b.finish().unwrap()
}

fn count(code: &[MachineInst], f: impl Fn(&MachineInst) -> bool) -> usize {
    code.iter().filter(|i| f(i)).count()
}

#[test]
fn default_registers_never_spill() {
    for program in [src_over_al_program().unwrap(), premultiply_program().unwrap()] {
        let compiled = compile(&program, &CodegenOpts::default()).unwrap();
        assert_eq!(compiled.name(), program.name());
        assert_eq!(compiled.spill_count(), 0, "{}", program.name());
        assert_eq!(compiled.reload_count(), 0);
        assert_eq!(compiled.frame_slots(), 0);
        assert_eq!(compiled.register_count(RegClass::Vector), 8);
        assert!(program.vars().all(|v| compiled.slot_of(v).is_none()));
        let code = compiled.code();
        assert_eq!(count(code, |i| matches!(i, MachineInst::LoopBegin)), 1);
        assert_eq!(count(code, |i| matches!(i, MachineInst::LoopEnd)), 1);
    }
}

#[test]
fn ops_map_one_to_one_without_pressure() {
    let program = src_over_al_program().unwrap();
    let compiled = compile(&program, &CodegenOpts::default()).unwrap();
    let ops = count(compiled.code(), |i| matches!(i, MachineInst::Op { .. }));
    assert_eq!(ops, program.insts().len());
    assert_eq!(
        count(compiled.code(), |i| matches!(i, MachineInst::BranchBegin { .. })),
        1
    );
}

#[test]
fn dying_sources_hand_their_register_to_the_result() {
    let compiled = compile(&bias_program(), &CodegenOpts::default()).unwrap();
    let adds: Vec<&MachineInst> = compiled
        .code()
        .iter()
        .filter(|i| matches!(i, MachineInst::Op { op: Op::Add, .. }))
        .collect();
    assert_eq!(adds.len(), 3);
    for add in adds {
        let MachineInst::Op { dst, srcs, .. } = add else {
            unreachable!()
        };
        assert_eq!(*dst, Some(srcs[0]));
    }
}

#[test]
fn pressure_spills_and_reserves_one_slot_per_saved_variable() {
    let program = bias_program();
    let compiled = compile(&program, &vector_opts(2)).unwrap();
    assert!(compiled.spill_count() > 0);
    assert!(compiled.reload_count() > 0);

    let slotted: Vec<u32> = program.vars().filter_map(|v| compiled.slot_of(v)).collect();
    assert_eq!(slotted.len(), compiled.frame_slots() as usize);
    let mut sorted = slotted.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..compiled.frame_slots()).collect::<Vec<_>>());

    for inst in compiled.code() {
        match *inst {
            MachineInst::Spill { reg, slot } | MachineInst::Reload { slot, reg } => {
                assert!(slot < compiled.frame_slots());
                assert!(reg.index < 2);
            }
            MachineInst::Op { dst, ref srcs, .. } => {
                assert!(dst.iter().chain(srcs.iter()).all(|r| r.index < 2));
            }
            _ => {}
        }
    }
}

#[test]
fn blend_compiles_with_three_registers() {
    let program = src_over_al_program().unwrap();
    let compiled = compile(&program, &vector_opts(3)).unwrap();
    assert!(compiled.spill_count() > 0);
    assert!(compiled.frame_slots() > 0);
}

#[test]
fn too_few_registers_is_unsupported() {
    let err = compile(&src_over_al_program().unwrap(), &vector_opts(2)).unwrap_err();
    assert!(matches!(err, ScanError::Unsupported(_)), "{err}");
    let err = compile(&bias_program(), &vector_opts(0)).unwrap_err();
    assert!(matches!(err, ScanError::Unsupported(_)), "{err}");
}

#[test]
fn oversized_register_files_are_rejected() {
    let err = compile(&bias_program(), &vector_opts(33)).unwrap_err();
    assert!(matches!(err, ScanError::Validation(_)), "{err}");
    assert!(compile(&bias_program(), &vector_opts(CodegenOpts::MAX_REGISTERS)).is_ok());
}

#[test]
fn liveness_failures_propagate() {
    let mut b = ProgramBuilder::new("escape");
    b.begin_loop();
    let s = b.load(Stream::Src);
    b.begin_branch(s);
    let t = b.add(s, s);
    b.end_span();
    b.store(Stream::Dst, t);
    b.end_span();
    let program = b.finish().unwrap();
    assert!(matches!(
        compile(&program, &CodegenOpts::default()),
        Err(ScanError::Unsupported(_))
    ));
    assert!(CompileCtx::new(&program, &CodegenOpts::default()).is_err());
}

#[test]
fn context_starts_with_empty_registers() {
    let program = bias_program();
    let ctx = CompileCtx::new(&program, &CodegenOpts::default()).unwrap();
    assert_eq!(ctx.locator().occupied().count(), 0);
    assert_eq!(ctx.locator().var_count(), program.var_count());
}
