use super::*;

use crate::jit::codegen::{CodegenOpts, compile};
use crate::jit::kernels::src_over_al_program;
use crate::jit::program::{ProgramBuilder, Stream};

fn copy_program() -> Program {
    let mut b = ProgramBuilder::new("copy");
    b.begin_loop();
    let s = b.load(Stream::Src);
    b.store(Stream::Dst, s);
    b.end_span();
    b.finish().unwrap()
}

#[test]
fn program_listing_shows_spans_and_live_ranges() {
    let text = dump_program(&copy_program());
    assert_eq!(
        text,
        "program copy (1 vars, 2 insts)\n\
         loop {\n\
         \x20\x20\x20\x200: v1 = load.u8x16 Src  ; live 0..1\n\
         \x20\x20\x20\x201: store.u8x16 Dst, v1\n\
         }\n"
    );
}

#[test]
fn constants_and_branches_are_printed() {
    let text = dump_program(&src_over_al_program().unwrap());
    assert!(text.starts_with("program src_over_al_pbgra32 ("));
    assert!(text.contains("v1 = const.u16x8 0x00ff00ff00ff00ff00ff00ff00ff00ff"));
    assert!(text.contains("  if any(v5) {\n"));
    assert!(text.contains("shr.u16x8 #8"));
    assert!(text.contains("store.masked.u8x16 Dst, "));
}

#[test]
fn listing_without_valid_liveness_omits_ranges() {
    let mut b = ProgramBuilder::new("escape");
    b.begin_loop();
    let s = b.load(Stream::Src);
    b.begin_branch(s);
    let t = b.add(s, s);
    b.end_span();
    b.store(Stream::Dst, t);
    b.end_span();
    let text = dump_program(&b.finish().unwrap());
    assert!(!text.contains("; live"));
    assert!(text.contains("v2 = add.u8x16 v1, v1"));
}

#[test]
fn compiled_listing_uses_physical_registers() {
    let compiled = compile(&copy_program(), &CodegenOpts::default()).unwrap();
    assert_eq!(
        dump_compiled(&compiled),
        "compiled copy (gp 8, vector 8, frame 0 slots, 0 spills, 0 reloads)\n  \
         0: loop {\n    \
         1: x0 = load.u8x16\n    \
         2: store.u8x16 x0\n  \
         3: }\n"
    );

    let tight = CodegenOpts {
        vector_registers: 3,
        ..CodegenOpts::default()
    };
    let text = dump_compiled(&compile(&src_over_al_program().unwrap(), &tight).unwrap());
    assert!(text.contains("spill x"));
    assert!(text.contains("reload ["));
}

#[test]
fn program_dump_serializes_with_a_stable_fingerprint() {
    let program = src_over_al_program().unwrap();
    let compiled = compile(&program, &CodegenOpts::default()).unwrap();
    let dump = ProgramDump::new(&program, &compiled).unwrap();
    assert_eq!(dump.name, "src_over_al_pbgra32");
    assert_eq!(dump.vars.len(), program.var_count());
    assert_eq!(dump.spills, 0);
    assert_eq!(dump.fingerprint.len(), 16);

    let again = compile(&program, &CodegenOpts::default()).unwrap();
    assert_eq!(code_fingerprint(&again).unwrap(), code_fingerprint(&compiled).unwrap());

    let tight = CodegenOpts {
        vector_registers: 3,
        ..CodegenOpts::default()
    };
    let spilled = compile(&program, &tight).unwrap();
    assert_ne!(code_fingerprint(&spilled).unwrap(), code_fingerprint(&compiled).unwrap());

    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["spans"][0]["kind"], "loop");
    assert!(json["vars"][0].get("slot").is_none());
    assert_eq!(json["vars"][0]["ty"], "u16x8");

    let spilled_dump = ProgramDump::new(&program, &spilled).unwrap();
    assert!(spilled_dump.vars.iter().any(|v| v.slot.is_some()));
}

#[test]
fn instruction_operands_serialize_as_arrays() {
    let program = copy_program();
    let insts = serde_json::to_value(program.insts()).unwrap();
    assert_eq!(insts[1]["srcs"], serde_json::json!([1]));
    assert_eq!(insts[0]["srcs"], serde_json::json!([]));

    let compiled = compile(&program, &CodegenOpts::default()).unwrap();
    let code = serde_json::to_value(compiled.code()).unwrap();
    assert_eq!(code[0]["kind"], "loop_begin");
    assert_eq!(code[2]["kind"], "op");
    assert_eq!(code[2]["srcs"][0]["class"], "vector");
    assert_eq!(code[2]["srcs"][0]["index"], 0);
}
