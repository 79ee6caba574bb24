//! Conversions between the 8-bit family and the 32bpp interchange format ([`PixelFormat::Bgra32`]),
//! plus same-format copies.

use crate::format::palette::Palette;
use crate::format::pixel_format::PixelFormat;
use crate::foundation::math::{expand_5_to_8, expand_6_to_8, luma_u8, mul_div255_u8};
use crate::scanop::kernel::{ConvertKernel, ScanOpKind};

#[inline(always)]
pub(crate) fn read_packed(src: &[u8], i: usize, bits: u32) -> u8 {
    let bit = i * bits as usize;
    let shift = 8 - bits - (bit % 8) as u32;
    let mask = ((1u16 << bits) - 1) as u8;
    (src[bit / 8] >> shift) & mask
}

#[inline(always)]
pub(crate) fn write_packed(dst: &mut [u8], i: usize, bits: u32, v: u8) {
    let bit = i * bits as usize;
    let shift = 8 - bits - (bit % 8) as u32;
    let mask = ((1u16 << bits) - 1) as u8;
    let b = &mut dst[bit / 8];
    *b = (*b & !(mask << shift)) | ((v & mask) << shift);
}

#[inline(always)]
pub(crate) fn read_u16(src: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([src[2 * i], src[2 * i + 1]])
}

#[inline(always)]
pub(crate) fn write_u16(dst: &mut [u8], i: usize, v: u16) {
    dst[2 * i..2 * i + 2].copy_from_slice(&v.to_le_bytes());
}

fn palette_color(palette: Option<&Palette>, index: u8) -> [u8; 4] {
    debug_assert!(palette.is_some(), "indexed conversion without a palette");
    palette.map_or([0, 0, 0, 0], |p| p.color(index))
}

fn indexed_to_bgra32<const BITS: u32>(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    palette: Option<&Palette>,
) {
    for (i, px) in dst.chunks_exact_mut(4).take(count).enumerate() {
        px.copy_from_slice(&palette_color(palette, read_packed(src, i, BITS)));
    }
}

fn bgra32_to_indexed<const BITS: u32>(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    palette: Option<&Palette>,
) {
    debug_assert!(palette.is_some(), "indexed conversion without a palette");
    let limit = 1usize << BITS;
    for (i, px) in src.chunks_exact(4).take(count).enumerate() {
        let idx = palette.map_or(0, |p| p.nearest([px[0], px[1], px[2], px[3]], limit));
        write_packed(dst, i, BITS, idx);
    }
}

fn gray_to_bgra32<const BITS: u32>(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    _palette: Option<&Palette>,
) {
    let max = (1u32 << BITS) - 1;
    for (i, px) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let v = (u32::from(read_packed(src, i, BITS)) * 255 / max) as u8;
        px.copy_from_slice(&[v, v, v, 255]);
    }
}

fn bgra32_to_gray<const BITS: u32>(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    _palette: Option<&Palette>,
) {
    let max = (1u32 << BITS) - 1;
    for (i, px) in src.chunks_exact(4).take(count).enumerate() {
        let l = u32::from(luma_u8(px[2], px[1], px[0]));
        write_packed(dst, i, BITS, ((l * max + 127) / 255) as u8);
    }
}

fn bgr555_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, px) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let v = read_u16(src, i);
        px.copy_from_slice(&[
            expand_5_to_8(v),
            expand_5_to_8(v >> 5),
            expand_5_to_8(v >> 10),
            255,
        ]);
    }
}

fn bgra32_to_bgr555(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, px) in src.chunks_exact(4).take(count).enumerate() {
        write_u16(dst, i, pack_555(px[0], px[1], px[2]));
    }
}

fn bgr565_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, px) in dst.chunks_exact_mut(4).take(count).enumerate() {
        let v = read_u16(src, i);
        px.copy_from_slice(&[
            expand_5_to_8(v),
            expand_6_to_8(v >> 5),
            expand_5_to_8(v >> 11),
            255,
        ]);
    }
}

fn bgra32_to_bgr565(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (i, px) in src.chunks_exact(4).take(count).enumerate() {
        write_u16(dst, i, pack_565(px[0], px[1], px[2]));
    }
}

#[inline(always)]
pub(crate) fn pack_555(b: u8, g: u8, r: u8) -> u16 {
    (u16::from(r >> 3) << 10) | (u16::from(g >> 3) << 5) | u16::from(b >> 3)
}

#[inline(always)]
pub(crate) fn pack_565(b: u8, g: u8, r: u8) -> u16 {
    (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3)
}

fn bgr24_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)).take(count) {
        d.copy_from_slice(&[s[0], s[1], s[2], 255]);
    }
}

fn bgra32_to_bgr24(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)).take(count) {
        d.copy_from_slice(&s[..3]);
    }
}

fn rgb24_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)).take(count) {
        d.copy_from_slice(&[s[2], s[1], s[0], 255]);
    }
}

fn bgra32_to_rgb24(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)).take(count) {
        d.copy_from_slice(&[s[2], s[1], s[0]]);
    }
}

fn bgr32_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)).take(count) {
        d.copy_from_slice(&[s[0], s[1], s[2], 255]);
    }
}

fn bgra32_to_bgr32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    bgr32_to_bgra32(dst, src, count, None);
}

#[inline(always)]
pub(crate) fn premultiply_px(px: [u8; 4]) -> [u8; 4] {
    let a = px[3];
    match a {
        0 => [0, 0, 0, 0],
        255 => px,
        _ => {
            let a16 = u16::from(a);
            [
                mul_div255_u8(u16::from(px[0]), a16),
                mul_div255_u8(u16::from(px[1]), a16),
                mul_div255_u8(u16::from(px[2]), a16),
                a,
            ]
        }
    }
}

/// Inverse of [`premultiply_px`]. Superluminous channels are clamped to alpha first.
#[inline(always)]
pub(crate) fn unpremultiply_px(px: [u8; 4]) -> [u8; 4] {
    let a = px[3];
    match a {
        0 => [0, 0, 0, 0],
        255 => px,
        _ => {
            let a32 = u32::from(a);
            let un = |c: u8| ((u32::from(c.min(a)) * 255 + a32 / 2) / a32) as u8;
            [un(px[0]), un(px[1]), un(px[2]), a]
        }
    }
}

fn pbgra32_to_bgra32(dst: &mut [u8], src: &[u8], count: usize, _palette: Option<&Palette>) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)).take(count) {
        d.copy_from_slice(&unpremultiply_px([s[0], s[1], s[2], s[3]]));
    }
}

pub(crate) fn bgra32_to_pbgra32(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    _palette: Option<&Palette>,
) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)).take(count) {
        d.copy_from_slice(&premultiply_px([s[0], s[1], s[2], s[3]]));
    }
}

fn copy_pixels<const BITS: u32>(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    _palette: Option<&Palette>,
) {
    let total_bits = count * BITS as usize;
    let whole = total_bits / 8;
    dst[..whole].copy_from_slice(&src[..whole]);
    if total_bits % 8 != 0 {
        // Only sub-byte formats reach here; finish the shared last byte pixel by pixel.
        let first = whole * 8 / BITS as usize;
        for i in first..count {
            write_packed(dst, i, BITS, read_packed(src, i, BITS));
        }
    }
}

macro_rules! convert_kernel {
    ($name:literal, $kind:ident, $src:ident, $dst:ident, $func:expr) => {
        ConvertKernel::new(
            $name,
            ScanOpKind::$kind,
            PixelFormat::$src,
            PixelFormat::$dst,
            $func,
        )
    };
}

/// `fmt -> Bgra32` for formats whose nearest interchange is [`PixelFormat::Bgra32`].
pub(crate) fn to_bgra32_kernel(fmt: PixelFormat) -> Option<ConvertKernel> {
    Some(match fmt {
        PixelFormat::Indexed1 => convert_kernel!(
            "indexed1_to_bgra32",
            Convert,
            Indexed1,
            Bgra32,
            indexed_to_bgra32::<1>
        ),
        PixelFormat::Indexed2 => convert_kernel!(
            "indexed2_to_bgra32",
            Convert,
            Indexed2,
            Bgra32,
            indexed_to_bgra32::<2>
        ),
        PixelFormat::Indexed4 => convert_kernel!(
            "indexed4_to_bgra32",
            Convert,
            Indexed4,
            Bgra32,
            indexed_to_bgra32::<4>
        ),
        PixelFormat::Indexed8 => convert_kernel!(
            "indexed8_to_bgra32",
            Convert,
            Indexed8,
            Bgra32,
            indexed_to_bgra32::<8>
        ),
        PixelFormat::BlackWhite => convert_kernel!(
            "black_white_to_bgra32",
            Convert,
            BlackWhite,
            Bgra32,
            gray_to_bgra32::<1>
        ),
        PixelFormat::Gray2 => {
            convert_kernel!("gray2_to_bgra32", Convert, Gray2, Bgra32, gray_to_bgra32::<2>)
        }
        PixelFormat::Gray4 => {
            convert_kernel!("gray4_to_bgra32", Convert, Gray4, Bgra32, gray_to_bgra32::<4>)
        }
        PixelFormat::Gray8 => {
            convert_kernel!("gray8_to_bgra32", Convert, Gray8, Bgra32, gray_to_bgra32::<8>)
        }
        PixelFormat::Bgr555 => {
            convert_kernel!("bgr555_to_bgra32", Convert, Bgr555, Bgra32, bgr555_to_bgra32)
        }
        PixelFormat::Bgr565 => {
            convert_kernel!("bgr565_to_bgra32", Convert, Bgr565, Bgra32, bgr565_to_bgra32)
        }
        PixelFormat::Bgr24 => {
            convert_kernel!("bgr24_to_bgra32", Convert, Bgr24, Bgra32, bgr24_to_bgra32)
        }
        PixelFormat::Rgb24 => {
            convert_kernel!("rgb24_to_bgra32", Convert, Rgb24, Bgra32, rgb24_to_bgra32)
        }
        PixelFormat::Bgr32 => {
            convert_kernel!("bgr32_to_bgra32", Convert, Bgr32, Bgra32, bgr32_to_bgra32)
        }
        PixelFormat::Pbgra32 => {
            convert_kernel!("pbgra32_to_bgra32", Convert, Pbgra32, Bgra32, pbgra32_to_bgra32)
        }
        _ => return None,
    })
}

/// `Bgra32 -> fmt` for formats whose nearest interchange is [`PixelFormat::Bgra32`].
pub(crate) fn from_bgra32_kernel(fmt: PixelFormat) -> Option<ConvertKernel> {
    Some(match fmt {
        PixelFormat::Indexed1 => convert_kernel!(
            "bgra32_to_indexed1",
            Quantize,
            Bgra32,
            Indexed1,
            bgra32_to_indexed::<1>
        ),
        PixelFormat::Indexed2 => convert_kernel!(
            "bgra32_to_indexed2",
            Quantize,
            Bgra32,
            Indexed2,
            bgra32_to_indexed::<2>
        ),
        PixelFormat::Indexed4 => convert_kernel!(
            "bgra32_to_indexed4",
            Quantize,
            Bgra32,
            Indexed4,
            bgra32_to_indexed::<4>
        ),
        PixelFormat::Indexed8 => convert_kernel!(
            "bgra32_to_indexed8",
            Quantize,
            Bgra32,
            Indexed8,
            bgra32_to_indexed::<8>
        ),
        PixelFormat::BlackWhite => convert_kernel!(
            "bgra32_to_black_white",
            Quantize,
            Bgra32,
            BlackWhite,
            bgra32_to_gray::<1>
        ),
        PixelFormat::Gray2 => {
            convert_kernel!("bgra32_to_gray2", Quantize, Bgra32, Gray2, bgra32_to_gray::<2>)
        }
        PixelFormat::Gray4 => {
            convert_kernel!("bgra32_to_gray4", Quantize, Bgra32, Gray4, bgra32_to_gray::<4>)
        }
        PixelFormat::Gray8 => {
            convert_kernel!("bgra32_to_gray8", Quantize, Bgra32, Gray8, bgra32_to_gray::<8>)
        }
        PixelFormat::Bgr555 => {
            convert_kernel!("bgra32_to_bgr555", Quantize, Bgra32, Bgr555, bgra32_to_bgr555)
        }
        PixelFormat::Bgr565 => {
            convert_kernel!("bgra32_to_bgr565", Quantize, Bgra32, Bgr565, bgra32_to_bgr565)
        }
        PixelFormat::Bgr24 => {
            convert_kernel!("bgra32_to_bgr24", Quantize, Bgra32, Bgr24, bgra32_to_bgr24)
        }
        PixelFormat::Rgb24 => {
            convert_kernel!("bgra32_to_rgb24", Quantize, Bgra32, Rgb24, bgra32_to_rgb24)
        }
        PixelFormat::Bgr32 => {
            convert_kernel!("bgra32_to_bgr32", Quantize, Bgra32, Bgr32, bgra32_to_bgr32)
        }
        PixelFormat::Pbgra32 => {
            convert_kernel!("bgra32_to_pbgra32", Quantize, Bgra32, Pbgra32, bgra32_to_pbgra32)
        }
        _ => return None,
    })
}

/// Same-format bulk copy. Indexed formats copy indices only.
pub(crate) fn copy_kernel(fmt: PixelFormat) -> ConvertKernel {
    let func = match fmt.bits_per_pixel() {
        1 => copy_pixels::<1>,
        2 => copy_pixels::<2>,
        4 => copy_pixels::<4>,
        8 => copy_pixels::<8>,
        16 => copy_pixels::<16>,
        24 => copy_pixels::<24>,
        32 => copy_pixels::<32>,
        48 => copy_pixels::<48>,
        64 => copy_pixels::<64>,
        _ => copy_pixels::<128>,
    };
    ConvertKernel::new("copy", ScanOpKind::Copy, fmt, fmt, func)
}

#[cfg(test)]
#[path = "../../tests/unit/scanop/convert.rs"]
mod tests;
