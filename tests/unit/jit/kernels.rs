use super::*;

struct XorShift(u64);

impl XorShift {
    fn byte(&mut self) -> u8 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 32) as u8
    }
}

fn premultiplied_pixels(rng: &mut XorShift, count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 4);
    for i in 0..count {
        let a = match i % 7 {
            0 => 255,
            1 => 0,
            _ => rng.byte(),
        };
        for _ in 0..3 {
            out.push(rng.byte().min(a));
        }
        out.push(a);
    }
    out
}

fn registers(n: u8) -> CodegenOpts {
    CodegenOpts {
        vector_registers: n,
        ..CodegenOpts::default()
    }
}

#[test]
fn blend_matches_the_scalar_kernel() {
    let mut rng = XorShift(0x1234_5678_9ABC_DEF1);
    for n in [8, 4, 3] {
        let mut kernel = JitScanKernel::src_over_al(&registers(n)).unwrap();
        for count in [0usize, 1, 3, 4, 5, 16, 33] {
            let src = premultiplied_pixels(&mut rng, count);
            let dst = premultiplied_pixels(&mut rng, count);
            let mut jit = dst.clone();
            let mut scalar = dst;
            kernel.run(&mut jit, &src, count).unwrap();
            src_over_al_pbgra32_scalar(&mut scalar, &src, count);
            assert_eq!(jit, scalar, "registers={n} count={count}");
        }
    }
}

#[test]
fn transparent_groups_leave_the_destination_alone() {
    let mut kernel = JitScanKernel::src_over_al(&CodegenOpts::default()).unwrap();
    let src = vec![0u8; 32];
    let mut dst: Vec<u8> = (0..32).collect();
    kernel.run(&mut dst, &src, 8).unwrap();
    assert_eq!(dst, (0..32).collect::<Vec<u8>>());
}

#[test]
fn premultiply_matches_the_scalar_kernel() {
    let mut rng = XorShift(77);
    for n in [8, 3] {
        let mut kernel = JitScanKernel::premultiply(&registers(n)).unwrap();
        for count in [2usize, 4, 9, 64] {
            let src: Vec<u8> = (0..count * 4).map(|_| rng.byte()).collect();
            let mut jit = vec![0u8; count * 4];
            let mut scalar = vec![0u8; count * 4];
            kernel.run(&mut jit, &src, count).unwrap();
            bgra32_to_pbgra32(&mut scalar, &src, count, None);
            assert_eq!(jit, scalar, "registers={n} count={count}");
        }
    }
}

#[test]
fn short_buffers_are_rejected() {
    let mut kernel = JitScanKernel::premultiply(&CodegenOpts::default()).unwrap();
    let err = kernel.run(&mut [0u8; 15], &[0u8; 16], 4).unwrap_err();
    assert!(matches!(err, ScanError::Validation(_)));
    assert_eq!(kernel.compiled().name(), "premultiply_bgra32");
}

#[test]
fn blend_needs_three_vector_registers() {
    let err = JitScanKernel::src_over_al(&registers(2)).err().unwrap();
    assert!(matches!(err, ScanError::Unsupported(_)), "{err}");
}
