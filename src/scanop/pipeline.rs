//! Executes conversion chains and blend plans over scanlines and whole surfaces.

use rayon::prelude::*;

use crate::format::graph::{BlendPlan, ConversionChain, blend_plan, conversion_chain};
use crate::format::palette::Palette;
use crate::format::pixel_format::PixelFormat;
use crate::foundation::error::{ScanError, ScanResult};
use crate::memory::dynarray::{DynArray, DynArrayOpts};
use crate::scanop::convert::{read_packed, read_u16, write_packed};
use crate::scanop::convert_wide::read_f32;

/// Palettes for indexed source and destination formats.
#[derive(Clone, Debug, Default)]
pub struct PaletteBinding {
    pub src: Option<Palette>,
    pub dst: Option<Palette>,
}

impl PaletteBinding {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn src(palette: Palette) -> Self {
        Self {
            src: Some(palette),
            dst: None,
        }
    }

    pub fn dst(palette: Palette) -> Self {
        Self {
            src: None,
            dst: Some(palette),
        }
    }
}

/// Threading for surface-level operations.
#[derive(Clone, Debug)]
pub struct ScanThreading {
    pub parallel: bool,
    /// Lower bound on rows handed to one rayon task.
    pub min_rows_per_task: usize,
    pub threads: Option<usize>,
}

impl Default for ScanThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            min_rows_per_task: 16,
            threads: None,
        }
    }
}

#[derive(Clone, Debug)]
enum PipelineOp {
    Convert(ConversionChain),
    Blend(BlendPlan),
}

/// One resolved scan operation plus the scratch scanlines it needs.
///
/// Scratch buffers grow to the longest run seen and are reused across calls.
pub struct ScanPipeline {
    src: PixelFormat,
    dst: PixelFormat,
    op: PipelineOp,
    palettes: PaletteBinding,
    scratch: [DynArray<'static, u8>; 2],
    blend_src: DynArray<'static, u8>,
    blend_dst: DynArray<'static, u8>,
    blend_back: DynArray<'static, u8>,
}

impl ScanPipeline {
    /// Pipeline converting `src` scanlines to `dst`.
    #[tracing::instrument(skip(palettes))]
    pub fn convert(
        src: PixelFormat,
        dst: PixelFormat,
        palettes: PaletteBinding,
    ) -> ScanResult<Self> {
        let chain = conversion_chain(src, dst);
        if chain.needs_src_palette() && palettes.src.is_none() {
            return Err(missing_palette("source", src));
        }
        if chain.needs_dst_palette() && palettes.dst.is_none() {
            return Err(missing_palette("destination", dst));
        }
        tracing::debug!(steps = chain.len(), "conversion pipeline ready");
        Ok(Self::with_op(src, dst, PipelineOp::Convert(chain), palettes))
    }

    /// Pipeline compositing `src` scanlines over `dst` scanlines in place.
    #[tracing::instrument(skip(palettes))]
    pub fn blend(src: PixelFormat, dst: PixelFormat, palettes: PaletteBinding) -> ScanResult<Self> {
        let plan = blend_plan(src, dst);
        if src.is_indexed() && palettes.src.is_none() {
            return Err(missing_palette("source", src));
        }
        if dst.is_indexed() && palettes.dst.is_none() {
            return Err(missing_palette("destination", dst));
        }
        tracing::debug!(fused = plan.is_fused(), "blend pipeline ready");
        Ok(Self::with_op(src, dst, PipelineOp::Blend(plan), palettes))
    }

    fn with_op(src: PixelFormat, dst: PixelFormat, op: PipelineOp, palettes: PaletteBinding) -> Self {
        Self {
            src,
            dst,
            op,
            palettes,
            scratch: [scratch_array(), scratch_array()],
            blend_src: scratch_array(),
            blend_dst: scratch_array(),
            blend_back: scratch_array(),
        }
    }

    /// Same operation with fresh scratch buffers, for another worker.
    pub fn fork(&self) -> Self {
        Self::with_op(self.src, self.dst, self.op.clone(), self.palettes.clone())
    }

    pub fn src_format(&self) -> PixelFormat {
        self.src
    }

    pub fn dst_format(&self) -> PixelFormat {
        self.dst
    }

    pub fn conversion_chain(&self) -> Option<&ConversionChain> {
        match &self.op {
            PipelineOp::Convert(c) => Some(c),
            PipelineOp::Blend(_) => None,
        }
    }

    pub fn blend_plan(&self) -> Option<&BlendPlan> {
        match &self.op {
            PipelineOp::Blend(p) => Some(p),
            PipelineOp::Convert(_) => None,
        }
    }

    /// Run over one scanline of `count` pixels.
    pub fn run(&mut self, dst: &mut [u8], src: &[u8], count: usize) -> ScanResult<()> {
        let need_src = self.src.byte_len(count)?;
        let need_dst = self.dst.byte_len(count)?;
        if src.len() < need_src || dst.len() < need_dst {
            return Err(ScanError::validation(format!(
                "scanline of {count} pixels needs {need_src} source and {need_dst} destination \
                 bytes, got {} and {}",
                src.len(),
                dst.len()
            )));
        }
        if count == 0 {
            return Ok(());
        }

        let Self {
            op,
            palettes,
            scratch,
            blend_src,
            blend_dst,
            blend_back,
            dst: dst_format,
            ..
        } = self;
        let src_pal = palettes.src.as_ref();
        let dst_pal = palettes.dst.as_ref();
        match op {
            PipelineOp::Convert(chain) => {
                run_chain(chain, dst, src, count, scratch, src_pal, dst_pal)
            }
            PipelineOp::Blend(BlendPlan::Fused(kernel)) => {
                kernel.run(dst, src, count);
                Ok(())
            }
            PipelineOp::Blend(BlendPlan::Decomposed {
                blend_format,
                src_chain,
                dst_chain,
                blend,
                back_chain,
            }) => {
                let bytes = blend_format.byte_len(count)?;
                let s: &[u8] = match src_chain {
                    Some(chain) => {
                        ensure_len(blend_src, bytes)?;
                        let buf = &mut blend_src.as_mut_slice()[..bytes];
                        run_chain(chain, buf, src, count, scratch, src_pal, None)?;
                        &blend_src.as_slice()[..bytes]
                    }
                    None => src,
                };
                match (dst_chain, back_chain) {
                    (Some(to_blend), Some(back)) => {
                        ensure_len(blend_dst, bytes)?;
                        let d = &mut blend_dst.as_mut_slice()[..bytes];
                        run_chain(to_blend, d, dst, count, scratch, dst_pal, None)?;
                        blend.run(d, s, count);
                        let out_bytes = dst_format.byte_len(count)?;
                        ensure_len(blend_back, out_bytes)?;
                        let out = &mut blend_back.as_mut_slice()[..out_bytes];
                        run_chain(back, out, d, count, scratch, None, dst_pal)?;
                        copy_covered_pixels(*dst_format, dst, out, *blend_format, s, count);
                        Ok(())
                    }
                    _ => {
                        blend.run(dst, s, count);
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Whether pixel `i` of a premultiplied blend-format scanline has nonzero alpha.
fn covers(blend_format: PixelFormat, src: &[u8], i: usize) -> bool {
    match blend_format {
        PixelFormat::Prgba64 => read_u16(src, 4 * i + 3) != 0,
        PixelFormat::Prgba128Float => read_f32(src, 4 * i + 3) != 0.0,
        _ => src[4 * i + 3] != 0,
    }
}

/// Copies back only the pixels a nonzero source alpha touched. Destination pixels under a
/// fully transparent source keep their original bits instead of a lossy round trip.
fn copy_covered_pixels(
    fmt: PixelFormat,
    dst: &mut [u8],
    blended: &[u8],
    blend_format: PixelFormat,
    src: &[u8],
    count: usize,
) {
    let bits = fmt.bits_per_pixel();
    let bytes = bits as usize / 8;
    for i in (0..count).filter(|&i| covers(blend_format, src, i)) {
        if bits < 8 {
            write_packed(dst, i, bits, read_packed(blended, i, bits));
        } else {
            dst[i * bytes..(i + 1) * bytes].copy_from_slice(&blended[i * bytes..(i + 1) * bytes]);
        }
    }
}

fn scratch_array() -> DynArray<'static, u8> {
    DynArray::new(DynArrayOpts::default())
}

fn missing_palette(side: &str, fmt: PixelFormat) -> ScanError {
    ScanError::validation(format!("{side} format {fmt} is indexed but no palette was bound"))
}

fn ensure_len(buf: &mut DynArray<'static, u8>, len: usize) -> ScanResult<()> {
    if buf.count() < len {
        buf.add_multiple(len - buf.count())?;
    }
    Ok(())
}

/// Runs every step of `chain`, ping-ponging intermediates through `scratch`. `in_pal` belongs
/// to the chain's source format, `out_pal` to its destination format.
fn run_chain(
    chain: &ConversionChain,
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    scratch: &mut [DynArray<'static, u8>; 2],
    in_pal: Option<&Palette>,
    out_pal: Option<&Palette>,
) -> ScanResult<()> {
    let Some((last, init)) = chain.steps().split_last() else {
        return Ok(());
    };
    let palette_for = |k: &crate::scanop::kernel::ConvertKernel| {
        if !k.needs_palette() {
            None
        } else if k.src.is_indexed() {
            in_pal
        } else {
            out_pal
        }
    };
    let Some((first, middle)) = init.split_first() else {
        last.run(dst, src, count, palette_for(last));
        return Ok(());
    };

    let bytes = chain.scratch_bytes(count)?;
    let [a, b] = scratch;
    ensure_len(a, bytes)?;
    ensure_len(b, bytes)?;
    let mut cur = &mut a.as_mut_slice()[..bytes];
    let mut next = &mut b.as_mut_slice()[..bytes];
    first.run(cur, src, count, palette_for(first));
    for step in middle {
        step.run(next, &cur[..], count, palette_for(step));
        std::mem::swap(&mut cur, &mut next);
    }
    last.run(dst, &cur[..], count, palette_for(last));
    Ok(())
}

/// Geometry of a strided surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub format: PixelFormat,
    pub width: usize,
    pub height: usize,
    /// Bytes from the start of one row to the next.
    pub stride: usize,
}

impl SurfaceDesc {
    /// Tightly packed rows.
    pub fn packed(format: PixelFormat, width: usize, height: usize) -> ScanResult<Self> {
        Ok(Self {
            format,
            width,
            height,
            stride: format.byte_len(width)?,
        })
    }

    pub fn row_bytes(&self) -> ScanResult<usize> {
        self.format.byte_len(self.width)
    }

    /// Smallest buffer holding the surface: the last row need not be padded to `stride`.
    pub fn min_len(&self) -> ScanResult<usize> {
        let row_bytes = self.row_bytes()?;
        if self.height == 0 {
            return Ok(0);
        }
        (self.height - 1)
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(row_bytes))
            .ok_or_else(|| {
                ScanError::allocation_size(format!(
                    "{} rows of stride {} overflow",
                    self.height, self.stride
                ))
            })
    }

    fn check(&self, len: usize, what: &str) -> ScanResult<()> {
        let row_bytes = self.row_bytes()?;
        if row_bytes > self.stride {
            return Err(ScanError::validation(format!(
                "{what} stride {} is smaller than its {row_bytes}-byte rows",
                self.stride
            )));
        }
        let need = self.min_len()?;
        if len < need {
            return Err(ScanError::validation(format!(
                "{what} buffer holds {len} bytes, needs {need}"
            )));
        }
        Ok(())
    }
}

/// Converts a whole surface row by row.
#[tracing::instrument(skip(dst, src, palettes, threading))]
pub fn convert_surface(
    dst: &mut [u8],
    dst_desc: &SurfaceDesc,
    src: &[u8],
    src_desc: &SurfaceDesc,
    palettes: PaletteBinding,
    threading: &ScanThreading,
) -> ScanResult<()> {
    let pipeline = ScanPipeline::convert(src_desc.format, dst_desc.format, palettes)?;
    run_surface(pipeline, dst, dst_desc, src, src_desc, threading)
}

/// Composites a whole surface over another in place, row by row.
#[tracing::instrument(skip(dst, src, palettes, threading))]
pub fn blend_surface(
    dst: &mut [u8],
    dst_desc: &SurfaceDesc,
    src: &[u8],
    src_desc: &SurfaceDesc,
    palettes: PaletteBinding,
    threading: &ScanThreading,
) -> ScanResult<()> {
    let pipeline = ScanPipeline::blend(src_desc.format, dst_desc.format, palettes)?;
    run_surface(pipeline, dst, dst_desc, src, src_desc, threading)
}

fn run_surface(
    mut pipeline: ScanPipeline,
    dst: &mut [u8],
    dst_desc: &SurfaceDesc,
    src: &[u8],
    src_desc: &SurfaceDesc,
    threading: &ScanThreading,
) -> ScanResult<()> {
    if dst_desc.width != src_desc.width || dst_desc.height != src_desc.height {
        return Err(ScanError::validation(format!(
            "surface sizes differ: {}x{} source, {}x{} destination",
            src_desc.width, src_desc.height, dst_desc.width, dst_desc.height
        )));
    }
    src_desc.check(src.len(), "source")?;
    dst_desc.check(dst.len(), "destination")?;
    let (width, height) = (src_desc.width, src_desc.height);
    if width == 0 || height == 0 {
        return Ok(());
    }

    if !threading.parallel || height == 1 {
        for (d, s) in dst
            .chunks_mut(dst_desc.stride)
            .zip(src.chunks(src_desc.stride))
            .take(height)
        {
            pipeline.run(d, s, width)?;
        }
        return Ok(());
    }

    let pool = build_thread_pool(threading.threads)?;
    let min_len = threading.min_rows_per_task.max(1);
    let template = &pipeline;
    pool.install(|| {
        dst.par_chunks_mut(dst_desc.stride)
            .zip(src.par_chunks(src_desc.stride))
            .take(height)
            .with_min_len(min_len)
            .try_for_each_init(|| template.fork(), |p, (d, s)| p.run(d, s, width))
    })
}

fn build_thread_pool(threads: Option<usize>) -> ScanResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ScanError::validation(
            "scan threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ScanError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/scanop/pipeline.rs"]
mod tests;
