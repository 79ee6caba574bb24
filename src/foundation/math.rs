use std::sync::LazyLock;

/// `round(x * a / 255)` using the two-round accumulate-and-shift approximation.
///
/// Exact for every `x, a <= 255`, in particular at `a == 0` and `a == 255`.
#[inline(always)]
pub(crate) fn mul_div255_u8(x: u16, a: u16) -> u8 {
    let t = u32::from(x) * u32::from(a) + 128;
    ((t + (t >> 8)) >> 8) as u8
}

/// 16-bit analogue of [`mul_div255_u8`]: `round(x * a / 65535)`.
#[inline(always)]
pub(crate) fn mul_div65535_u16(x: u16, a: u16) -> u16 {
    let t = u64::from(x) * u64::from(a) + 32768;
    ((t + (t >> 16)) >> 16) as u16
}

#[inline(always)]
pub(crate) fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[inline(always)]
pub(crate) fn expand_5_to_8(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

#[inline(always)]
pub(crate) fn expand_6_to_8(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

#[inline(always)]
pub(crate) fn expand_10_to_16(v: u32) -> u16 {
    let v = (v & 0x3FF) as u16;
    (v << 6) | (v >> 4)
}

#[inline(always)]
pub(crate) fn expand_8_to_16(v: u8) -> u16 {
    u16::from(v) * 257
}

#[inline(always)]
pub(crate) fn narrow_16_to_8(v: u16) -> u8 {
    ((u32::from(v) * 255 + 32767) / 65535) as u8
}

/// Integer luma on gamma-encoded channels. Equal channels map to themselves.
#[inline(always)]
pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 77 + u32::from(g) * 150 + u32::from(b) * 29 + 128) >> 8) as u8
}

#[inline(always)]
pub(crate) fn luma_u16(r: u16, g: u16, b: u16) -> u16 {
    ((u64::from(r) * 19595 + u64::from(g) * 38470 + u64::from(b) * 7471 + 32768) >> 16) as u16
}

/// Linear-light luma used by the float gray format.
#[inline(always)]
pub(crate) fn luma_linear(r: f32, g: f32, b: f32) -> f32 {
    0.2125 * r + 0.7154 * g + 0.0721 * b
}

pub(crate) fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

pub(crate) fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

static SRGB_U8_TO_LINEAR: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut lut = [0.0f32; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = srgb_to_linear(i as f32 / 255.0);
    }
    lut
});

#[inline(always)]
pub(crate) fn srgb_u8_to_linear(v: u8) -> f32 {
    SRGB_U8_TO_LINEAR[v as usize]
}

#[inline(always)]
pub(crate) fn linear_to_srgb_u8(v: f32) -> u8 {
    (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0).round() as u8
}

#[inline(always)]
pub(crate) fn srgb_u16_to_linear(v: u16) -> f32 {
    srgb_to_linear(f32::from(v) / 65535.0)
}

#[inline(always)]
pub(crate) fn linear_to_srgb_u16(v: f32) -> u16 {
    (linear_to_srgb(v.clamp(0.0, 1.0)) * 65535.0).round() as u16
}

#[inline(always)]
pub(crate) fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline(always)]
pub(crate) fn unit_to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
