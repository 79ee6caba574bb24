//! Source-over blend kernels.
//!
//! Every kernel leaves a destination pixel untouched when the source alpha is zero and copies the
//! source when alpha is at its maximum. `dst` is both the second input and the output.

use crate::format::pixel_format::PixelFormat;
use crate::foundation::math::{
    add_sat_u8, expand_5_to_8, expand_6_to_8, mul_div255_u8, mul_div65535_u16,
};
use crate::scanop::convert::{pack_555, pack_565, read_u16, write_u16};
use crate::scanop::convert_wide::{read_rgba_f32, write_rgba_f32};
use crate::scanop::kernel::{BlendKernel, BlendOp};

const LANE_MASK: u64 = 0x00FF_00FF_00FF_00FF;
const LANE_HALF: u64 = 0x0080_0080_0080_0080;
const LOW_PIXEL: u64 = 0x0000_0000_FFFF_FFFF;

/// `s + d * (255 - a) / 255` per channel with saturation, on gamma-encoded premultiplied BGRA.
#[inline(always)]
pub(crate) fn src_over_al_px(d: [u8; 4], s: [u8; 4]) -> [u8; 4] {
    let inv = 255 - u16::from(s[3]);
    [
        add_sat_u8(s[0], mul_div255_u8(u16::from(d[0]), inv)),
        add_sat_u8(s[1], mul_div255_u8(u16::from(d[1]), inv)),
        add_sat_u8(s[2], mul_div255_u8(u16::from(d[2]), inv)),
        add_sat_u8(s[3], mul_div255_u8(u16::from(d[3]), inv)),
    ]
}

/// Per-pixel reference for the packed kernel below.
pub(crate) fn src_over_al_pbgra32_scalar(dst: &mut [u8], src: &[u8], count: usize) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)).take(count) {
        match s[3] {
            0 => {}
            255 => d.copy_from_slice(s),
            _ => d.copy_from_slice(&src_over_al_px(
                [d[0], d[1], d[2], d[3]],
                [s[0], s[1], s[2], s[3]],
            )),
        }
    }
}

/// `round(lane * inv / 255)` for four 16-bit lanes, the low two belonging to the first pixel.
#[inline(always)]
fn scale_lanes(lanes: u64, inv_lo: u64, inv_hi: u64) -> u64 {
    let t = (lanes & LOW_PIXEL) * inv_lo + (lanes & !LOW_PIXEL) * inv_hi + LANE_HALF;
    ((t + ((t >> 8) & LANE_MASK)) >> 8) & LANE_MASK
}

/// Adds `scaled` to `src` bytewise, then saturates each byte that wrapped and takes back the
/// carry it pushed into the byte above.
#[inline(always)]
fn add_packed_saturating(src: u64, scaled: u64) -> u64 {
    let mut sum = src.wrapping_add(scaled);
    for k in 0..8 {
        let shift = 8 * k;
        if ((sum >> shift) & 0xFF) < ((src >> shift) & 0xFF) {
            if k < 7 {
                sum = sum.wrapping_sub(1u64 << (shift + 8));
            }
            sum |= 0xFFu64 << shift;
        }
    }
    sum
}

#[inline(always)]
fn load_u64(bytes: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(b)
}

/// Pbgra32 over Pbgra32, two pixels per `u64`.
fn src_over_al_pbgra32(dst: &mut [u8], src: &[u8], count: usize) {
    let pairs = count / 2;
    for (d, s) in dst.chunks_exact_mut(8).zip(src.chunks_exact(8)).take(pairs) {
        let (a0, a1) = (s[3], s[7]);
        if a0 == 0 && a1 == 0 {
            continue;
        }
        let sw = load_u64(s);
        let dw = load_u64(d);
        let inv_lo = u64::from(255 - a0);
        let inv_hi = u64::from(255 - a1);
        let even = scale_lanes(dw & LANE_MASK, inv_lo, inv_hi);
        let odd = scale_lanes((dw >> 8) & LANE_MASK, inv_lo, inv_hi);
        let out = add_packed_saturating(sw, even | (odd << 8)).to_le_bytes();
        if a0 != 0 {
            d[..4].copy_from_slice(&out[..4]);
        }
        if a1 != 0 {
            d[4..].copy_from_slice(&out[4..]);
        }
    }
    if count % 2 == 1 {
        let off = pairs * 8;
        src_over_al_pbgra32_scalar(&mut dst[off..], &src[off..], 1);
    }
}

/// Shared loop for opaque destinations: `read` yields the destination as opaque BGRA, `write`
/// stores a BGRA result back.
#[inline(always)]
fn src_over_al_opaque(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    read: impl Fn(&[u8], usize) -> [u8; 4],
    write: impl Fn(&mut [u8], usize, [u8; 4]),
) {
    for (i, s) in src.chunks_exact(4).take(count).enumerate() {
        let s = [s[0], s[1], s[2], s[3]];
        match s[3] {
            0 => {}
            255 => write(&mut *dst, i, s),
            _ => {
                let out = src_over_al_px(read(&*dst, i), s);
                write(&mut *dst, i, out);
            }
        }
    }
}

fn src_over_al_pbgra32_bgr32(dst: &mut [u8], src: &[u8], count: usize) {
    src_over_al_opaque(
        dst,
        src,
        count,
        |d, i| [d[4 * i], d[4 * i + 1], d[4 * i + 2], 255],
        |d, i, px| d[4 * i..4 * i + 4].copy_from_slice(&[px[0], px[1], px[2], 255]),
    );
}

fn src_over_al_pbgra32_bgr24(dst: &mut [u8], src: &[u8], count: usize) {
    src_over_al_opaque(
        dst,
        src,
        count,
        |d, i| [d[3 * i], d[3 * i + 1], d[3 * i + 2], 255],
        |d, i, px| d[3 * i..3 * i + 3].copy_from_slice(&px[..3]),
    );
}

fn src_over_al_pbgra32_rgb24(dst: &mut [u8], src: &[u8], count: usize) {
    src_over_al_opaque(
        dst,
        src,
        count,
        |d, i| [d[3 * i + 2], d[3 * i + 1], d[3 * i], 255],
        |d, i, px| d[3 * i..3 * i + 3].copy_from_slice(&[px[2], px[1], px[0]]),
    );
}

fn src_over_al_pbgra32_bgr555(dst: &mut [u8], src: &[u8], count: usize) {
    src_over_al_opaque(
        dst,
        src,
        count,
        |d, i| {
            let v = read_u16(d, i);
            [
                expand_5_to_8(v),
                expand_5_to_8(v >> 5),
                expand_5_to_8(v >> 10),
                255,
            ]
        },
        |d, i, px| write_u16(d, i, pack_555(px[0], px[1], px[2])),
    );
}

fn src_over_al_pbgra32_bgr565(dst: &mut [u8], src: &[u8], count: usize) {
    src_over_al_opaque(
        dst,
        src,
        count,
        |d, i| {
            let v = read_u16(d, i);
            [
                expand_5_to_8(v),
                expand_6_to_8(v >> 5),
                expand_5_to_8(v >> 11),
                255,
            ]
        },
        |d, i, px| write_u16(d, i, pack_565(px[0], px[1], px[2])),
    );
}

/// 16-bit premultiplied RGBA over itself.
fn src_over_prgba64(dst: &mut [u8], src: &[u8], count: usize) {
    for i in 0..count {
        let a = read_u16(src, 4 * i + 3);
        match a {
            0 => {}
            u16::MAX => dst[8 * i..8 * i + 8].copy_from_slice(&src[8 * i..8 * i + 8]),
            _ => {
                let inv = u16::MAX - a;
                for c in 0..4 {
                    let s = read_u16(src, 4 * i + c);
                    let d = read_u16(dst, 4 * i + c);
                    write_u16(dst, 4 * i + c, s.saturating_add(mul_div65535_u16(d, inv)));
                }
            }
        }
    }
}

/// Linear premultiplied float over itself. Alpha participates like the color channels.
fn src_over_prgba128f(dst: &mut [u8], src: &[u8], count: usize) {
    for i in 0..count {
        let s = read_rgba_f32(src, i);
        let a = s[3];
        if a == 0.0 {
            continue;
        }
        if a >= 1.0 {
            write_rgba_f32(dst, i, s);
            continue;
        }
        let d = read_rgba_f32(dst, i);
        let inv = 1.0 - a;
        write_rgba_f32(
            dst,
            i,
            [
                s[0] + inv * d[0],
                s[1] + inv * d[1],
                s[2] + inv * d[2],
                s[3] + inv * d[3],
            ],
        );
    }
}

/// Single-step kernel for `src` over `dst`, if one is tabulated.
pub(crate) fn fused_blend_kernel(src: PixelFormat, dst: PixelFormat) -> Option<BlendKernel> {
    use BlendOp::{SrcOver, SrcOverAL};
    use PixelFormat as F;
    let (name, op, func): (&'static str, BlendOp, crate::scanop::kernel::BlendFn) =
        match (src, dst) {
            (F::Pbgra32, F::Pbgra32) => ("src_over_al_pbgra32", SrcOverAL, src_over_al_pbgra32),
            (F::Pbgra32, F::Bgr32) => (
                "src_over_al_pbgra32_bgr32",
                SrcOverAL,
                src_over_al_pbgra32_bgr32,
            ),
            (F::Pbgra32, F::Bgr24) => (
                "src_over_al_pbgra32_bgr24",
                SrcOverAL,
                src_over_al_pbgra32_bgr24,
            ),
            (F::Pbgra32, F::Rgb24) => (
                "src_over_al_pbgra32_rgb24",
                SrcOverAL,
                src_over_al_pbgra32_rgb24,
            ),
            (F::Pbgra32, F::Bgr555) => (
                "src_over_al_pbgra32_bgr555",
                SrcOverAL,
                src_over_al_pbgra32_bgr555,
            ),
            (F::Pbgra32, F::Bgr565) => (
                "src_over_al_pbgra32_bgr565",
                SrcOverAL,
                src_over_al_pbgra32_bgr565,
            ),
            (F::Prgba128Float, F::Prgba128Float) => {
                ("src_over_prgba128f", SrcOver, src_over_prgba128f)
            }
            _ => return None,
        };
    Some(BlendKernel::new(name, op, src, dst, func))
}

/// Blend kernel at the precision of a premultiplied blend format, used by decomposed plans.
pub(crate) fn interchange_blend_kernel(blend_format: PixelFormat) -> Option<BlendKernel> {
    match blend_format {
        PixelFormat::Pbgra32 | PixelFormat::Prgba128Float => {
            fused_blend_kernel(blend_format, blend_format)
        }
        PixelFormat::Prgba64 => Some(BlendKernel::new(
            "src_over_prgba64",
            BlendOp::SrcOver,
            blend_format,
            blend_format,
            src_over_prgba64,
        )),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scanop/blend.rs"]
mod tests;
