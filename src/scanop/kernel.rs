use serde::Serialize;

use crate::format::palette::Palette;
use crate::format::pixel_format::PixelFormat;

/// Signature of a convert, quantize or copy kernel: writes `count` pixels of the destination
/// format from `count` pixels of the source format.
pub type ConvertFn = fn(dst: &mut [u8], src: &[u8], count: usize, palette: Option<&Palette>);

/// Signature of a blend kernel: composites `count` source pixels onto `dst` in place.
pub type BlendFn = fn(dst: &mut [u8], src: &[u8], count: usize);

/// Blend operator family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendOp {
    /// Source-over on linear or wide channels.
    SrcOver,
    /// Source-over computed directly on gamma-encoded 8-bit channels ("assume linear").
    SrcOverAL,
}

/// What a kernel does, used as part of the lookup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOpKind {
    /// Widening (or lossless) conversion.
    Convert,
    /// Narrowing conversion that drops precision or quantizes to a palette.
    Quantize,
    /// Same-format bulk copy.
    Copy,
    Blend(BlendOp),
}

/// A stateless convert/quantize/copy scan operation.
#[derive(Clone, Copy)]
pub struct ConvertKernel {
    pub name: &'static str,
    pub kind: ScanOpKind,
    pub src: PixelFormat,
    pub dst: PixelFormat,
    func: ConvertFn,
}

impl ConvertKernel {
    pub(crate) const fn new(
        name: &'static str,
        kind: ScanOpKind,
        src: PixelFormat,
        dst: PixelFormat,
        func: ConvertFn,
    ) -> Self {
        Self {
            name,
            kind,
            src,
            dst,
            func,
        }
    }

    /// Run over `count` pixels. Buffer sizes are the caller's responsibility.
    #[inline]
    pub fn run(&self, dst: &mut [u8], src: &[u8], count: usize, palette: Option<&Palette>) {
        debug_assert!(src.len() >= self.src.byte_len_unchecked(count));
        debug_assert!(dst.len() >= self.dst.byte_len_unchecked(count));
        (self.func)(dst, src, count, palette)
    }

    /// True when this kernel reads or writes palette indices.
    pub fn needs_palette(&self) -> bool {
        self.kind != ScanOpKind::Copy && (self.src.is_indexed() || self.dst.is_indexed())
    }
}

impl std::fmt::Debug for ConvertKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertKernel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .finish()
    }
}

/// A stateless blend scan operation.
#[derive(Clone, Copy)]
pub struct BlendKernel {
    pub name: &'static str,
    pub op: BlendOp,
    pub src: PixelFormat,
    pub dst: PixelFormat,
    func: BlendFn,
}

impl BlendKernel {
    pub(crate) const fn new(
        name: &'static str,
        op: BlendOp,
        src: PixelFormat,
        dst: PixelFormat,
        func: BlendFn,
    ) -> Self {
        Self {
            name,
            op,
            src,
            dst,
            func,
        }
    }

    /// Composite `count` pixels of `src` onto `dst`.
    #[inline]
    pub fn run(&self, dst: &mut [u8], src: &[u8], count: usize) {
        debug_assert!(src.len() >= self.src.byte_len_unchecked(count));
        debug_assert!(dst.len() >= self.dst.byte_len_unchecked(count));
        (self.func)(dst, src, count)
    }
}

impl std::fmt::Debug for BlendKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlendKernel")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .finish()
    }
}

/// Either kind of kernel, as returned by [`crate::lookup_kernel`].
#[derive(Clone, Copy, Debug)]
pub enum ScanKernel {
    Convert(ConvertKernel),
    Blend(BlendKernel),
}

impl ScanKernel {
    pub fn name(&self) -> &'static str {
        match self {
            ScanKernel::Convert(k) => k.name,
            ScanKernel::Blend(k) => k.name,
        }
    }
}
