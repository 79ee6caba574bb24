use serde::{Deserialize, Serialize};

use crate::foundation::error::{ScanError, ScanResult};

/// Closed set of scanline pixel formats.
///
/// Byte layouts are little-endian; sub-byte formats pack the first pixel into the most
/// significant bits of the first byte. 8- and 16-bit integer formats carry sRGB-encoded
/// channels, float formats carry linear (scRGB) channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Indexed1,
    Indexed2,
    Indexed4,
    Indexed8,
    BlackWhite,
    Gray2,
    Gray4,
    Gray8,
    /// `u16`: B in bits 0-4, G in 5-9, R in 10-14.
    Bgr555,
    /// `u16`: B in bits 0-4, G in 5-10, R in 11-15.
    Bgr565,
    Bgr24,
    Rgb24,
    /// B, G, R, unused.
    Bgr32,
    /// B, G, R, A straight alpha. The 32-bit interchange format.
    Bgra32,
    /// B, G, R, A premultiplied.
    Pbgra32,
    Gray16,
    Rgb48,
    /// R, G, B, A as `u16`, straight alpha. The 64-bit interchange format.
    Rgba64,
    Prgba64,
    /// `u32`: B in bits 0-9, G in 10-19, R in 20-29.
    Bgr101010,
    Gray32Float,
    /// R, G, B, unused as `f32`.
    Rgb128Float,
    Rgba128Float,
    /// R, G, B, A as `f32`, premultiplied. The float interchange format.
    Prgba128Float,
}

impl PixelFormat {
    /// Every format, in declaration order.
    pub const ALL: [PixelFormat; 24] = [
        PixelFormat::Indexed1,
        PixelFormat::Indexed2,
        PixelFormat::Indexed4,
        PixelFormat::Indexed8,
        PixelFormat::BlackWhite,
        PixelFormat::Gray2,
        PixelFormat::Gray4,
        PixelFormat::Gray8,
        PixelFormat::Bgr555,
        PixelFormat::Bgr565,
        PixelFormat::Bgr24,
        PixelFormat::Rgb24,
        PixelFormat::Bgr32,
        PixelFormat::Bgra32,
        PixelFormat::Pbgra32,
        PixelFormat::Gray16,
        PixelFormat::Rgb48,
        PixelFormat::Rgba64,
        PixelFormat::Prgba64,
        PixelFormat::Bgr101010,
        PixelFormat::Gray32Float,
        PixelFormat::Rgb128Float,
        PixelFormat::Rgba128Float,
        PixelFormat::Prgba128Float,
    ];

    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Indexed1 | PixelFormat::BlackWhite => 1,
            PixelFormat::Indexed2 | PixelFormat::Gray2 => 2,
            PixelFormat::Indexed4 | PixelFormat::Gray4 => 4,
            PixelFormat::Indexed8 | PixelFormat::Gray8 => 8,
            PixelFormat::Bgr555 | PixelFormat::Bgr565 | PixelFormat::Gray16 => 16,
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 24,
            PixelFormat::Bgr32
            | PixelFormat::Bgra32
            | PixelFormat::Pbgra32
            | PixelFormat::Bgr101010
            | PixelFormat::Gray32Float => 32,
            PixelFormat::Rgb48 => 48,
            PixelFormat::Rgba64 | PixelFormat::Prgba64 => 64,
            PixelFormat::Rgb128Float | PixelFormat::Rgba128Float | PixelFormat::Prgba128Float => {
                128
            }
        }
    }

    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            PixelFormat::Indexed1
                | PixelFormat::Indexed2
                | PixelFormat::Indexed4
                | PixelFormat::Indexed8
        )
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Bgra32
                | PixelFormat::Pbgra32
                | PixelFormat::Rgba64
                | PixelFormat::Prgba64
                | PixelFormat::Rgba128Float
                | PixelFormat::Prgba128Float
        )
    }

    pub fn is_premultiplied(self) -> bool {
        matches!(
            self,
            PixelFormat::Pbgra32 | PixelFormat::Prgba64 | PixelFormat::Prgba128Float
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            PixelFormat::Gray32Float
                | PixelFormat::Rgb128Float
                | PixelFormat::Rgba128Float
                | PixelFormat::Prgba128Float
        )
    }

    /// Byte size of a run of `count` pixels, rounding partial bytes up.
    pub fn byte_len(self, count: usize) -> ScanResult<usize> {
        let bits = count
            .checked_mul(self.bits_per_pixel() as usize)
            .ok_or_else(|| {
                ScanError::allocation_size(format!("{count} pixels of {self} overflow"))
            })?;
        Ok(bits.div_ceil(8))
    }

    /// Byte size of `count` pixels; callers guarantee it does not overflow.
    pub(crate) fn byte_len_unchecked(self, count: usize) -> usize {
        (count * self.bits_per_pixel() as usize).div_ceil(8)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Indexed1 => "indexed1",
            PixelFormat::Indexed2 => "indexed2",
            PixelFormat::Indexed4 => "indexed4",
            PixelFormat::Indexed8 => "indexed8",
            PixelFormat::BlackWhite => "black_white",
            PixelFormat::Gray2 => "gray2",
            PixelFormat::Gray4 => "gray4",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Bgr555 => "bgr555",
            PixelFormat::Bgr565 => "bgr565",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr32 => "bgr32",
            PixelFormat::Bgra32 => "bgra32",
            PixelFormat::Pbgra32 => "pbgra32",
            PixelFormat::Gray16 => "gray16",
            PixelFormat::Rgb48 => "rgb48",
            PixelFormat::Rgba64 => "rgba64",
            PixelFormat::Prgba64 => "prgba64",
            PixelFormat::Bgr101010 => "bgr101010",
            PixelFormat::Gray32Float => "gray32_float",
            PixelFormat::Rgb128Float => "rgb128_float",
            PixelFormat::Rgba128Float => "rgba128_float",
            PixelFormat::Prgba128Float => "prgba128_float",
        }
    }

    pub fn classify(self) -> FormatClass {
        match self {
            PixelFormat::Bgra32 => FormatClass::Interchange(InterchangeFormat::Argb32),
            PixelFormat::Rgba64 => FormatClass::Interchange(InterchangeFormat::Argb64),
            PixelFormat::Prgba128Float => {
                FormatClass::Interchange(InterchangeFormat::Abgr128Float)
            }
            other => FormatClass::Derived(DerivedFormat(other)),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        PixelFormat::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| ScanError::validation(format!("unknown pixel format '{s}'")))
    }
}

/// The three canonical intermediate formats every other format converts through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterchangeFormat {
    /// 32bpp ARGB: [`PixelFormat::Bgra32`].
    Argb32,
    /// 64bpp ARGB: [`PixelFormat::Rgba64`].
    Argb64,
    /// 128bpp float ABGR: [`PixelFormat::Prgba128Float`].
    Abgr128Float,
}

impl InterchangeFormat {
    pub const ALL: [InterchangeFormat; 3] = [
        InterchangeFormat::Argb32,
        InterchangeFormat::Argb64,
        InterchangeFormat::Abgr128Float,
    ];

    pub fn pixel_format(self) -> PixelFormat {
        match self {
            InterchangeFormat::Argb32 => PixelFormat::Bgra32,
            InterchangeFormat::Argb64 => PixelFormat::Rgba64,
            InterchangeFormat::Abgr128Float => PixelFormat::Prgba128Float,
        }
    }

    /// Premultiplied format blends are computed in at this precision.
    pub fn blend_format(self) -> PixelFormat {
        match self {
            InterchangeFormat::Argb32 => PixelFormat::Pbgra32,
            InterchangeFormat::Argb64 => PixelFormat::Prgba64,
            InterchangeFormat::Abgr128Float => PixelFormat::Prgba128Float,
        }
    }
}

/// Result of [`PixelFormat::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatClass {
    Interchange(InterchangeFormat),
    Derived(DerivedFormat),
}

/// A format that is not itself an interchange format.
///
/// Only obtainable from [`PixelFormat::classify`], so to/from-interchange kernels can never be
/// requested for an interchange format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DerivedFormat(PixelFormat);

impl DerivedFormat {
    pub fn format(self) -> PixelFormat {
        self.0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/format/pixel_format.rs"]
mod tests;
