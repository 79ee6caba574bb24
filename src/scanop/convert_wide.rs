//! 16-bit and float family conversions, and the hops between the three interchange formats.
//!
//! `Rgba64` is straight-alpha sRGB, `Prgba128Float` is premultiplied linear light.

use crate::format::palette::Palette;
use crate::format::pixel_format::PixelFormat;
use crate::foundation::math::{
    expand_8_to_16, expand_10_to_16, linear_to_srgb_u8, linear_to_srgb_u16, luma_linear,
    luma_u16, mul_div65535_u16, narrow_16_to_8, srgb_u8_to_linear, srgb_u16_to_linear,
    unit_to_u8, unit_to_u16,
};
use crate::scanop::convert::{read_u16, write_u16};
use crate::scanop::kernel::{ConvertKernel, ScanOpKind};

#[inline(always)]
pub(crate) fn read_f32(src: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([src[4 * i], src[4 * i + 1], src[4 * i + 2], src[4 * i + 3]])
}

#[inline(always)]
pub(crate) fn write_f32(dst: &mut [u8], i: usize, v: f32) {
    dst[4 * i..4 * i + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline(always)]
fn read_rgba64(src: &[u8], px: usize) -> [u16; 4] {
    let i = px * 4;
    [
        read_u16(src, i),
        read_u16(src, i + 1),
        read_u16(src, i + 2),
        read_u16(src, i + 3),
    ]
}

#[inline(always)]
fn write_rgba64(dst: &mut [u8], px: usize, v: [u16; 4]) {
    for (c, &ch) in v.iter().enumerate() {
        write_u16(dst, px * 4 + c, ch);
    }
}

#[inline(always)]
pub(crate) fn read_rgba_f32(src: &[u8], px: usize) -> [f32; 4] {
    let i = px * 4;
    [
        read_f32(src, i),
        read_f32(src, i + 1),
        read_f32(src, i + 2),
        read_f32(src, i + 3),
    ]
}

#[inline(always)]
pub(crate) fn write_rgba_f32(dst: &mut [u8], px: usize, v: [f32; 4]) {
    for (c, &ch) in v.iter().enumerate() {
        write_f32(dst, px * 4 + c, ch);
    }
}

#[inline(always)]
fn premultiply_u16(px: [u16; 4]) -> [u16; 4] {
    let a = px[3];
    match a {
        0 => [0; 4],
        u16::MAX => px,
        _ => [
            mul_div65535_u16(px[0], a),
            mul_div65535_u16(px[1], a),
            mul_div65535_u16(px[2], a),
            a,
        ],
    }
}

#[inline(always)]
fn unpremultiply_u16(px: [u16; 4]) -> [u16; 4] {
    let a = px[3];
    match a {
        0 => [0; 4],
        u16::MAX => px,
        _ => {
            let a64 = u64::from(a);
            let un = |c: u16| ((u64::from(c.min(a)) * 65535 + a64 / 2) / a64) as u16;
            [un(px[0]), un(px[1]), un(px[2]), a]
        }
    }
}

/// Straight color of a premultiplied float pixel; fully transparent pixels become zero.
#[inline(always)]
pub(crate) fn unpremultiply_f32(px: [f32; 4]) -> [f32; 4] {
    let a = px[3];
    if a <= 0.0 {
        return [0.0; 4];
    }
    if a >= 1.0 {
        return px;
    }
    let un = |c: f32| c.min(a) / a;
    [un(px[0]), un(px[1]), un(px[2]), a]
}

fn gray16_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let v = read_u16(src, i);
        write_rgba64(dst, i, [v, v, v, u16::MAX]);
    }
}

fn rgba64_to_gray16(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, _] = read_rgba64(src, i);
        write_u16(dst, i, luma_u16(r, g, b));
    }
}

fn rgb48_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let r = read_u16(src, 3 * i);
        let g = read_u16(src, 3 * i + 1);
        let b = read_u16(src, 3 * i + 2);
        write_rgba64(dst, i, [r, g, b, u16::MAX]);
    }
}

fn rgba64_to_rgb48(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, _] = read_rgba64(src, i);
        write_u16(dst, 3 * i, r);
        write_u16(dst, 3 * i + 1, g);
        write_u16(dst, 3 * i + 2, b);
    }
}

fn prgba64_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        write_rgba64(dst, i, unpremultiply_u16(read_rgba64(src, i)));
    }
}

pub(crate) fn rgba64_to_prgba64(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    _palette: Option<&Palette>,
) {
    for i in 0..count {
        write_rgba64(dst, i, premultiply_u16(read_rgba64(src, i)));
    }
}

fn bgr101010_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, s) in src.chunks_exact(4).take(count).enumerate() {
        let v = u32::from_le_bytes([s[0], s[1], s[2], s[3]]);
        let b = expand_10_to_16(v);
        let g = expand_10_to_16(v >> 10);
        let r = expand_10_to_16(v >> 20);
        write_rgba64(dst, i, [r, g, b, u16::MAX]);
    }
}

fn rgba64_to_bgr101010(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, d) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let [r, g, b, _] = read_rgba64(src, i);
        let v = (u32::from(r >> 6) << 20) | (u32::from(g >> 6) << 10) | u32::from(b >> 6);
        d.copy_from_slice(&v.to_le_bytes());
    }
}

fn gray32f_to_prgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let v = read_f32(src, i);
        write_rgba_f32(dst, i, [v, v, v, 1.0]);
    }
}

fn prgba128f_to_gray32f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, _] = unpremultiply_f32(read_rgba_f32(src, i));
        let l = if r == g && g == b {
            r
        } else {
            luma_linear(r, g, b)
        };
        write_f32(dst, i, l);
    }
}

fn rgb128f_to_prgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, _] = read_rgba_f32(src, i);
        write_rgba_f32(dst, i, [r, g, b, 1.0]);
    }
}

fn prgba128f_to_rgb128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, _] = unpremultiply_f32(read_rgba_f32(src, i));
        write_rgba_f32(dst, i, [r, g, b, 1.0]);
    }
}

fn rgba128f_to_prgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, a] = read_rgba_f32(src, i);
        write_rgba_f32(dst, i, [r * a, g * a, b * a, a]);
    }
}

fn prgba128f_to_rgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        write_rgba_f32(dst, i, unpremultiply_f32(read_rgba_f32(src, i)));
    }
}

fn bgra32_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, s) in src.chunks_exact(4).take(count).enumerate() {
        write_rgba64(
            dst,
            i,
            [
                expand_8_to_16(s[2]),
                expand_8_to_16(s[1]),
                expand_8_to_16(s[0]),
                expand_8_to_16(s[3]),
            ],
        );
    }
}

fn rgba64_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, d) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let [r, g, b, a] = read_rgba64(src, i);
        d.copy_from_slice(&[
            narrow_16_to_8(b),
            narrow_16_to_8(g),
            narrow_16_to_8(r),
            narrow_16_to_8(a),
        ]);
    }
}

fn bgra32_to_prgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, s) in src.chunks_exact(4).take(count).enumerate() {
        let a = f32::from(s[3]) / 255.0;
        write_rgba_f32(
            dst,
            i,
            [
                srgb_u8_to_linear(s[2]) * a,
                srgb_u8_to_linear(s[1]) * a,
                srgb_u8_to_linear(s[0]) * a,
                a,
            ],
        );
    }
}

fn prgba128f_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, d) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let [r, g, b, a] = unpremultiply_f32(read_rgba_f32(src, i));
        d.copy_from_slice(&[
            linear_to_srgb_u8(b),
            linear_to_srgb_u8(g),
            linear_to_srgb_u8(r),
            unit_to_u8(a),
        ]);
    }
}

fn rgba64_to_prgba128f(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, a] = read_rgba64(src, i);
        let a = f32::from(a) / 65535.0;
        write_rgba_f32(
            dst,
            i,
            [
                srgb_u16_to_linear(r) * a,
                srgb_u16_to_linear(g) * a,
                srgb_u16_to_linear(b) * a,
                a,
            ],
        );
    }
}

fn prgba128f_to_rgba64(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for i in 0..count {
        let [r, g, b, a] = unpremultiply_f32(read_rgba_f32(src, i));
        write_rgba64(
            dst,
            i,
            [
                linear_to_srgb_u16(r),
                linear_to_srgb_u16(g),
                linear_to_srgb_u16(b),
                unit_to_u16(a),
            ],
        );
    }
}

fn kernel(
    name: &'static str,
    kind: ScanOpKind,
    src: PixelFormat,
    dst: PixelFormat,
    func: crate::scanop::kernel::ConvertFn,
) -> ConvertKernel {
    ConvertKernel::new(name, kind, src, dst, func)
}

/// `fmt -> interchange` for the 16-bit and float families.
pub(crate) fn to_wide_interchange_kernel(fmt: PixelFormat) -> Option<ConvertKernel> {
    use PixelFormat as F;
    use ScanOpKind::Convert;
    Some(match fmt {
        F::Gray16 => kernel("gray16_to_rgba64", Convert, fmt, F::Rgba64, gray16_to_rgba64),
        F::Rgb48 => kernel("rgb48_to_rgba64", Convert, fmt, F::Rgba64, rgb48_to_rgba64),
        F::Prgba64 => kernel("prgba64_to_rgba64", Convert, fmt, F::Rgba64, prgba64_to_rgba64),
        F::Bgr101010 => kernel(
            "bgr101010_to_rgba64",
            Convert,
            fmt,
            F::Rgba64,
            bgr101010_to_rgba64,
        ),
        F::Gray32Float => kernel(
            "gray32f_to_prgba128f",
            Convert,
            fmt,
            F::Prgba128Float,
            gray32f_to_prgba128f,
        ),
        F::Rgb128Float => kernel(
            "rgb128f_to_prgba128f",
            Convert,
            fmt,
            F::Prgba128Float,
            rgb128f_to_prgba128f,
        ),
        F::Rgba128Float => kernel(
            "rgba128f_to_prgba128f",
            Convert,
            fmt,
            F::Prgba128Float,
            rgba128f_to_prgba128f,
        ),
        _ => return None,
    })
}

/// `interchange -> fmt` for the 16-bit and float families.
pub(crate) fn from_wide_interchange_kernel(fmt: PixelFormat) -> Option<ConvertKernel> {
    use PixelFormat as F;
    use ScanOpKind::Quantize;
    Some(match fmt {
        F::Gray16 => kernel("rgba64_to_gray16", Quantize, F::Rgba64, fmt, rgba64_to_gray16),
        F::Rgb48 => kernel("rgba64_to_rgb48", Quantize, F::Rgba64, fmt, rgba64_to_rgb48),
        F::Prgba64 => kernel("rgba64_to_prgba64", Quantize, F::Rgba64, fmt, rgba64_to_prgba64),
        F::Bgr101010 => kernel(
            "rgba64_to_bgr101010",
            Quantize,
            F::Rgba64,
            fmt,
            rgba64_to_bgr101010,
        ),
        F::Gray32Float => kernel(
            "prgba128f_to_gray32f",
            Quantize,
            F::Prgba128Float,
            fmt,
            prgba128f_to_gray32f,
        ),
        F::Rgb128Float => kernel(
            "prgba128f_to_rgb128f",
            Quantize,
            F::Prgba128Float,
            fmt,
            prgba128f_to_rgb128f,
        ),
        F::Rgba128Float => kernel(
            "prgba128f_to_rgba128f",
            Quantize,
            F::Prgba128Float,
            fmt,
            prgba128f_to_rgba128f,
        ),
        _ => return None,
    })
}

/// Kernel between two distinct interchange formats. Widening hops are `Convert`, narrowing
/// hops `Quantize`.
pub(crate) fn interchange_hop(from: PixelFormat, to: PixelFormat) -> Option<ConvertKernel> {
    use PixelFormat as F;
    use ScanOpKind::{Convert, Quantize};
    Some(match (from, to) {
        (F::Bgra32, F::Rgba64) => kernel("bgra32_to_rgba64", Convert, from, to, bgra32_to_rgba64),
        (F::Rgba64, F::Bgra32) => {
            kernel("rgba64_to_bgra32", Quantize, from, to, rgba64_to_bgra32)
        }
        (F::Bgra32, F::Prgba128Float) => kernel(
            "bgra32_to_prgba128f",
            Convert,
            from,
            to,
            bgra32_to_prgba128f,
        ),
        (F::Prgba128Float, F::Bgra32) => kernel(
            "prgba128f_to_bgra32",
            Quantize,
            from,
            to,
            prgba128f_to_bgra32,
        ),
        (F::Rgba64, F::Prgba128Float) => kernel(
            "rgba64_to_prgba128f",
            Convert,
            from,
            to,
            rgba64_to_prgba128f,
        ),
        (F::Prgba128Float, F::Rgba64) => kernel(
            "prgba128f_to_rgba64",
            Quantize,
            from,
            to,
            prgba128f_to_rgba64,
        ),
        _ => return None,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/scanop/convert_wide.rs"]
mod tests;
