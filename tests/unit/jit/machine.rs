use super::*;

use crate::jit::codegen::{CodegenOpts, compile};
use crate::jit::program::{Program, ProgramBuilder};

fn word(f: impl Fn(usize) -> u8) -> Word {
    std::array::from_fn(f)
}

fn u16s(values: [u16; 8]) -> Word {
    let mut w = [0u8; 16];
    for (k, v) in values.iter().enumerate() {
        w[2 * k..2 * k + 2].copy_from_slice(&v.to_le_bytes());
    }
    w
}

fn run_program(program: &Program, vector_registers: u8, dst: &mut [u8], src: &[u8]) {
    let opts = CodegenOpts {
        vector_registers,
        ..CodegenOpts::default()
    };
    let compiled = compile(program, &opts).unwrap();
    let mut machine = Machine::new(&compiled).unwrap();
    machine
        .run(&compiled, dst, src, src.len() / GROUP_BYTES)
        .unwrap();
}

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

#[test]
fn integer_lanes_wrap_and_saturate() {
    let a = word(|i| 250 + (i % 6) as u8);
    let b = word(|_| 10);
    let sat = eval(Op::AddSat, VectorType::U8x16, &a, &b);
    assert!(sat.iter().all(|&v| v == 255));
    let wrapped = eval(Op::Add, VectorType::U8x16, &a, &b);
    assert_eq!(wrapped[0], 4);

    let x = u16s([0, 1, 2, 3, 65535, 300, 7, 8]);
    let y = u16s([1; 8]);
    assert_eq!(
        eval(Op::Sub, VectorType::U16x8, &x, &y),
        u16s([65535, 0, 1, 2, 65534, 299, 6, 7])
    );
    assert_eq!(
        eval(Op::Mul, VectorType::U16x8, &x, &u16s([2; 8])),
        u16s([0, 2, 4, 6, 65534, 600, 14, 16])
    );
    assert_eq!(
        eval(Op::ShlImm(8), VectorType::U16x8, &x, &x),
        u16s([0, 256, 512, 768, 65280, 11264, 1792, 2048])
    );
    assert_eq!(
        eval(Op::ShrImm(8), VectorType::U16x8, &x, &x),
        u16s([0, 0, 0, 0, 255, 1, 0, 0])
    );
    assert_eq!(
        eval(Op::Min, VectorType::U16x8, &x, &u16s([5; 8])),
        u16s([0, 1, 2, 3, 5, 5, 5, 5])
    );
}

#[test]
fn unpack_pack_and_broadcast() {
    let a = word(|i| i as u8 * 16);
    let lo = eval(Op::UnpackLo, VectorType::U16x8, &a, &a);
    let hi = eval(Op::UnpackHi, VectorType::U16x8, &a, &a);
    assert_eq!(lo, u16s([0, 16, 32, 48, 64, 80, 96, 112]));
    assert_eq!(hi, u16s([128, 144, 160, 176, 192, 208, 224, 240]));
    assert_eq!(eval(Op::PackUs, VectorType::U8x16, &lo, &hi), a);

    let big = u16s([256, 255, 1000, 0, 0, 0, 0, 65535]);
    let packed = eval(Op::PackUs, VectorType::U8x16, &big, &big);
    assert_eq!(&packed[..8], &[255, 255, 255, 0, 0, 0, 0, 255]);

    let alpha = eval(Op::BroadcastAlpha, VectorType::U16x8, &lo, &lo);
    assert_eq!(alpha, u16s([48, 48, 48, 48, 112, 112, 112, 112]));
}

#[test]
fn float_lanes_use_ieee_arithmetic() {
    let f = |v: [f32; 4]| -> Word {
        let mut w = [0u8; 16];
        for (k, x) in v.iter().enumerate() {
            w[4 * k..4 * k + 4].copy_from_slice(&x.to_le_bytes());
        }
        w
    };
    let a = f([0.5, 1.0, -2.0, 0.25]);
    let b = f([0.25, 0.5, 4.0, 0.75]);
    assert_eq!(eval(Op::Add, VectorType::F32x4, &a, &b), f([0.75, 1.5, 2.0, 1.0]));
    assert_eq!(eval(Op::Mul, VectorType::F32x4, &a, &b), f([0.125, 0.5, -8.0, 0.1875]));
    assert_eq!(eval(Op::Max, VectorType::F32x4, &a, &b), f([0.5, 1.0, 4.0, 0.75]));
}

#[test]
fn loop_body_runs_once_per_group() {
    let src: Vec<u8> = (0..48u32).map(|i| (i * 5 + 200) as u8).collect();
    let mut dst = vec![0u8; 48];
    run_program(&bias_program(), 8, &mut dst, &src);
    for (g, (d, s)) in dst.chunks_exact(16).zip(src.chunks_exact(16)).enumerate() {
        for k in 0..8 {
            assert_eq!(d[k], s[k].saturating_add(6), "group {g} byte {k}");
        }
        assert_eq!(&d[8..], &s[8..]);
    }
}

#[test]
fn spilled_code_computes_the_same_result() {
    let src: Vec<u8> = (0..64u32).map(|i| (i * 37 % 256) as u8).collect();
    let mut roomy = vec![0u8; 64];
    let mut tight = vec![0u8; 64];
    run_program(&bias_program(), 8, &mut roomy, &src);
    run_program(&bias_program(), 2, &mut tight, &src);
    assert_eq!(roomy, tight);
}

#[test]
fn branches_skip_all_zero_conditions() {
    let mut b = ProgramBuilder::new("masked_copy");
    let alpha_mask = b.pixel_mask([0, 0, 0, 255]);
    b.begin_loop();
    let s = b.load(Stream::Src);
    let a = b.and(s, alpha_mask);
    b.begin_branch(a);
    b.store(Stream::Dst, s);
    b.end_span();
    b.end_span();
    let program = b.finish().unwrap();

    let mut src = vec![7u8; 48];
    // Group 1 is fully transparent; group 2 has one visible pixel.
    for px in src[16..48].chunks_exact_mut(4) {
        px[3] = 0;
    }
    src[47] = 1;
    let mut dst = vec![0xAAu8; 48];
    run_program(&program, 8, &mut dst, &src);
    assert_eq!(&dst[..16], &src[..16]);
    assert!(dst[16..32].iter().all(|&b| b == 0xAA));
    assert_eq!(&dst[32..], &src[32..]);
}

#[test]
fn masked_stores_write_selected_pixels() {
    let mut b = ProgramBuilder::new("masked_store");
    let alpha_mask = b.pixel_mask([0, 0, 0, 255]);
    b.begin_loop();
    let s = b.load(Stream::Src);
    let a = b.and(s, alpha_mask);
    b.store_masked(Stream::Dst, s, a);
    b.end_span();
    let program = b.finish().unwrap();

    let src = [1u8, 2, 3, 0, 4, 5, 6, 9, 7, 8, 9, 0, 1, 1, 1, 255];
    let mut dst = [0xEEu8; 16];
    run_program(&program, 8, &mut dst, &src);
    assert_eq!(&dst[..4], &[0xEE; 4]);
    assert_eq!(&dst[4..8], &src[4..8]);
    assert_eq!(&dst[8..12], &[0xEE; 4]);
    assert_eq!(&dst[12..], &src[12..]);
}

#[test]
fn short_streams_and_unbalanced_code_are_rejected() {
    let program = bias_program();
    let mut compiled = compile(&program, &CodegenOpts::default()).unwrap();
    let mut machine = Machine::new(&compiled).unwrap();
    let err = machine
        .run(&compiled, &mut [0u8; 16], &[0u8; 31], 2)
        .unwrap_err();
    assert!(matches!(err, ScanError::Validation(_)));
    machine.run(&compiled, &mut [], &[], 0).unwrap();

    compiled.code.push(MachineInst::LoopEnd);
    assert!(matches!(
        Machine::new(&compiled),
        Err(ScanError::Validation(_))
    ));
    compiled.code.pop();
    compiled.code.push(MachineInst::LoopBegin);
    assert!(Machine::new(&compiled).is_err());
}
