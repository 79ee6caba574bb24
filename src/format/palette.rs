use smallvec::SmallVec;

use crate::foundation::error::{ScanError, ScanResult};

/// Color table for indexed formats: up to 256 straight-alpha BGRA entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: SmallVec<[[u8; 4]; 16]>,
}

impl Palette {
    pub const MAX_COLORS: usize = 256;

    pub fn new(colors: &[[u8; 4]]) -> ScanResult<Self> {
        if colors.is_empty() || colors.len() > Self::MAX_COLORS {
            return Err(ScanError::validation(format!(
                "palette must hold 1..={} colors, got {}",
                Self::MAX_COLORS,
                colors.len()
            )));
        }
        Ok(Self {
            colors: SmallVec::from_slice(colors),
        })
    }

    /// Evenly spaced opaque grays for a `bits`-deep index.
    pub fn grayscale(bits: u32) -> ScanResult<Self> {
        if !matches!(bits, 1 | 2 | 4 | 8) {
            return Err(ScanError::validation(format!(
                "grayscale palette depth must be 1, 2, 4 or 8 bits, got {bits}"
            )));
        }
        let levels = 1u32 << bits;
        let colors: SmallVec<[[u8; 4]; 16]> = (0..levels)
            .map(|i| {
                let v = (i * 255 / (levels - 1)) as u8;
                [v, v, v, 255]
            })
            .collect();
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    /// Entry for `index`; indices past the end read as transparent black.
    #[inline]
    pub fn color(&self, index: u8) -> [u8; 4] {
        self.colors
            .get(index as usize)
            .copied()
            .unwrap_or([0, 0, 0, 0])
    }

    /// Index of the entry closest to `bgra` (squared distance over all four channels), limited
    /// to the first `limit` entries. Ties go to the lower index.
    pub fn nearest(&self, bgra: [u8; 4], limit: usize) -> u8 {
        let mut best = 0usize;
        let mut best_dist = u32::MAX;
        for (i, c) in self.colors.iter().take(limit).enumerate() {
            let dist: u32 = c
                .iter()
                .zip(bgra.iter())
                .map(|(&a, &b)| {
                    let d = i32::from(a) - i32::from(b);
                    (d * d) as u32
                })
                .sum();
            if dist < best_dist {
                best = i;
                best_dist = dist;
                if dist == 0 {
                    break;
                }
            }
        }
        best as u8
    }
}

#[cfg(test)]
#[path = "../../tests/unit/format/palette.rs"]
mod tests;
