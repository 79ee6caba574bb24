//! Kernel selection between any two pixel formats.
//!
//! Every derived format converts to exactly one interchange format, so a conversion is at most
//! `src -> interchange -> [other interchange ->] dst`.

use serde::Serialize;
use smallvec::SmallVec;

use crate::format::pixel_format::{DerivedFormat, FormatClass, InterchangeFormat, PixelFormat};
use crate::foundation::error::ScanResult;
use crate::scanop::blend::{fused_blend_kernel, interchange_blend_kernel};
use crate::scanop::convert::{from_bgra32_kernel, to_bgra32_kernel};
use crate::scanop::convert_wide::{
    from_wide_interchange_kernel, interchange_hop, to_wide_interchange_kernel,
};
use crate::scanop::kernel::{BlendKernel, ConvertKernel, ScanKernel, ScanOpKind};

pub fn nearest_interchange_format(fmt: PixelFormat) -> InterchangeFormat {
    use PixelFormat as F;
    match fmt {
        F::Indexed1
        | F::Indexed2
        | F::Indexed4
        | F::Indexed8
        | F::BlackWhite
        | F::Gray2
        | F::Gray4
        | F::Gray8
        | F::Bgr555
        | F::Bgr565
        | F::Bgr24
        | F::Rgb24
        | F::Bgr32
        | F::Bgra32
        | F::Pbgra32 => InterchangeFormat::Argb32,
        F::Gray16 | F::Rgb48 | F::Rgba64 | F::Prgba64 | F::Bgr101010 => InterchangeFormat::Argb64,
        F::Gray32Float | F::Rgb128Float | F::Rgba128Float | F::Prgba128Float => {
            InterchangeFormat::Abgr128Float
        }
    }
}

pub fn is_interchange_format(fmt: PixelFormat) -> bool {
    matches!(fmt.classify(), FormatClass::Interchange(_))
}

impl DerivedFormat {
    pub fn nearest_interchange(self) -> InterchangeFormat {
        nearest_interchange_format(self.format())
    }

    /// Kernel converting this format to its nearest interchange format.
    pub fn to_interchange_kernel(self) -> ConvertKernel {
        let fmt = self.format();
        to_bgra32_kernel(fmt)
            .or_else(|| to_wide_interchange_kernel(fmt))
            .unwrap_or_else(|| unreachable!("derived format {fmt} has no to-interchange kernel"))
    }

    /// Kernel converting the nearest interchange format back to this format.
    pub fn from_interchange_kernel(self) -> ConvertKernel {
        let fmt = self.format();
        from_bgra32_kernel(fmt)
            .or_else(|| from_wide_interchange_kernel(fmt))
            .unwrap_or_else(|| {
                unreachable!("derived format {fmt} has no from-interchange kernel")
            })
    }
}

/// Same-format bulk copy. Valid for every format, palette untouched.
pub fn copy_kernel(fmt: PixelFormat) -> ConvertKernel {
    crate::scanop::convert::copy_kernel(fmt)
}

/// Hop between two interchange formats; `None` when they are the same.
pub fn interchange_kernel(from: InterchangeFormat, to: InterchangeFormat) -> Option<ConvertKernel> {
    interchange_hop(from.pixel_format(), to.pixel_format())
}

/// Fused single-step blend of `src` over `dst`, if tabulated.
pub fn blend_kernel(src: PixelFormat, dst: PixelFormat) -> Option<BlendKernel> {
    fused_blend_kernel(src, dst)
}

/// Single kernel for `(src, dst, kind)`, or `None` when the pair needs more than one step.
pub fn lookup_kernel(src: PixelFormat, dst: PixelFormat, kind: ScanOpKind) -> Option<ScanKernel> {
    match kind {
        ScanOpKind::Copy => (src == dst).then(|| ScanKernel::Convert(copy_kernel(src))),
        ScanOpKind::Convert | ScanOpKind::Quantize => {
            let chain = conversion_chain(src, dst);
            match chain.steps() {
                [only] if only.kind == kind => Some(ScanKernel::Convert(*only)),
                _ => None,
            }
        }
        ScanOpKind::Blend(op) => {
            let fused = fused_blend_kernel(src, dst).or_else(|| {
                (src == dst)
                    .then(|| interchange_blend_kernel(src))
                    .flatten()
            });
            fused
                .filter(|k| k.op == op)
                .map(ScanKernel::Blend)
        }
    }
}

/// Ordered conversion kernels from `src` to `dst`, one to three steps.
#[derive(Clone, Debug)]
pub struct ConversionChain {
    src: PixelFormat,
    dst: PixelFormat,
    steps: SmallVec<[ConvertKernel; 3]>,
}

impl ConversionChain {
    pub fn src(&self) -> PixelFormat {
        self.src
    }

    pub fn dst(&self) -> PixelFormat {
        self.dst
    }

    pub fn steps(&self) -> &[ConvertKernel] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_copy(&self) -> bool {
        matches!(self.steps.as_slice(), [k] if k.kind == ScanOpKind::Copy)
    }

    /// Formats of the intermediate buffers between consecutive steps.
    pub fn intermediate_formats(&self) -> impl Iterator<Item = PixelFormat> + '_ {
        let n = self.steps.len().saturating_sub(1);
        self.steps[..n].iter().map(|k| k.dst)
    }

    /// Largest intermediate buffer, in bytes, for a run of `count` pixels.
    pub fn scratch_bytes(&self, count: usize) -> ScanResult<usize> {
        let mut max = 0;
        for f in self.intermediate_formats() {
            max = max.max(f.byte_len(count)?);
        }
        Ok(max)
    }

    pub fn needs_src_palette(&self) -> bool {
        self.steps
            .first()
            .is_some_and(|k| k.needs_palette() && k.src.is_indexed())
    }

    pub fn needs_dst_palette(&self) -> bool {
        self.steps
            .last()
            .is_some_and(|k| k.needs_palette() && k.dst.is_indexed())
    }

    pub fn dump(&self) -> PlanDump {
        PlanDump {
            src: self.src,
            dst: self.dst,
            mode: if self.is_copy() {
                PlanMode::Copy
            } else {
                PlanMode::Convert
            },
            blend_format: None,
            steps: self.steps.iter().map(StepDump::from_convert).collect(),
        }
    }
}

pub fn conversion_chain(src: PixelFormat, dst: PixelFormat) -> ConversionChain {
    let mut steps = SmallVec::new();
    if src == dst {
        steps.push(copy_kernel(src));
        return ConversionChain { src, dst, steps };
    }

    let from = match src.classify() {
        FormatClass::Interchange(i) => i,
        FormatClass::Derived(d) => {
            steps.push(d.to_interchange_kernel());
            d.nearest_interchange()
        }
    };
    let (to, last) = match dst.classify() {
        FormatClass::Interchange(i) => (i, None),
        FormatClass::Derived(d) => (d.nearest_interchange(), Some(d.from_interchange_kernel())),
    };
    if let Some(hop) = interchange_kernel(from, to) {
        steps.push(hop);
    }
    if let Some(last) = last {
        steps.push(last);
    }
    debug_assert!((1..=3).contains(&steps.len()));
    ConversionChain { src, dst, steps }
}

/// How to composite `src` over `dst`.
#[derive(Clone, Debug)]
pub enum BlendPlan {
    Fused(BlendKernel),
    /// Convert both sides to `blend_format`, blend there, convert the result back.
    /// A chain is `None` when the side is already in the blend format.
    Decomposed {
        blend_format: PixelFormat,
        src_chain: Option<ConversionChain>,
        dst_chain: Option<ConversionChain>,
        blend: BlendKernel,
        back_chain: Option<ConversionChain>,
    },
}

/// Premultiplied format of the wider of the two interchange families.
pub fn blend_format_for(src: PixelFormat, dst: PixelFormat) -> PixelFormat {
    nearest_interchange_format(src)
        .max(nearest_interchange_format(dst))
        .blend_format()
}

pub fn blend_plan(src: PixelFormat, dst: PixelFormat) -> BlendPlan {
    if let Some(k) = fused_blend_kernel(src, dst) {
        return BlendPlan::Fused(k);
    }
    let blend_format = blend_format_for(src, dst);
    tracing::debug!(%src, %dst, %blend_format, "no fused blend kernel, decomposing");
    let chain_to =
        |from: PixelFormat| (from != blend_format).then(|| conversion_chain(from, blend_format));
    let blend = interchange_blend_kernel(blend_format)
        .unwrap_or_else(|| unreachable!("{blend_format} is not a blend format"));
    BlendPlan::Decomposed {
        blend_format,
        src_chain: chain_to(src),
        dst_chain: chain_to(dst),
        blend,
        back_chain: (dst != blend_format).then(|| conversion_chain(blend_format, dst)),
    }
}

impl BlendPlan {
    pub fn is_fused(&self) -> bool {
        matches!(self, BlendPlan::Fused(_))
    }

    pub fn blend_kernel(&self) -> &BlendKernel {
        match self {
            BlendPlan::Fused(k) => k,
            BlendPlan::Decomposed { blend, .. } => blend,
        }
    }

    pub fn dump(&self, src: PixelFormat, dst: PixelFormat) -> PlanDump {
        match self {
            BlendPlan::Fused(k) => PlanDump {
                src,
                dst,
                mode: PlanMode::Fused,
                blend_format: None,
                steps: vec![StepDump::from_blend(k, "blend")],
            },
            BlendPlan::Decomposed {
                blend_format,
                src_chain,
                dst_chain,
                blend,
                back_chain,
            } => {
                let mut steps = Vec::new();
                let mut push_chain = |chain: &Option<ConversionChain>, stage: &'static str| {
                    for k in chain.iter().flat_map(|c| c.steps()) {
                        steps.push(StepDump {
                            stage,
                            ..StepDump::from_convert(k)
                        });
                    }
                };
                push_chain(src_chain, "src");
                push_chain(dst_chain, "dst");
                steps.push(StepDump::from_blend(blend, "blend"));
                for k in back_chain.iter().flat_map(|c| c.steps()) {
                    steps.push(StepDump {
                        stage: "back",
                        ..StepDump::from_convert(k)
                    });
                }
                PlanDump {
                    src,
                    dst,
                    mode: PlanMode::Decomposed,
                    blend_format: Some(*blend_format),
                    steps,
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Copy,
    Convert,
    Fused,
    Decomposed,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepDump {
    pub stage: &'static str,
    pub kernel: &'static str,
    pub kind: ScanOpKind,
    pub src: PixelFormat,
    pub dst: PixelFormat,
}

impl StepDump {
    fn from_convert(k: &ConvertKernel) -> Self {
        Self {
            stage: "convert",
            kernel: k.name,
            kind: k.kind,
            src: k.src,
            dst: k.dst,
        }
    }

    fn from_blend(k: &BlendKernel, stage: &'static str) -> Self {
        Self {
            stage,
            kernel: k.name,
            kind: ScanOpKind::Blend(k.op),
            src: k.src,
            dst: k.dst,
        }
    }
}

/// Serializable description of a conversion chain or blend plan.
#[derive(Clone, Debug, Serialize)]
pub struct PlanDump {
    pub src: PixelFormat,
    pub dst: PixelFormat,
    pub mode: PlanMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_format: Option<PixelFormat>,
    pub steps: Vec<StepDump>,
}

impl std::fmt::Display for PlanDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({:?}", self.src, self.dst, self.mode)?;
        if let Some(b) = self.blend_format {
            write!(f, " via {b}")?;
        }
        writeln!(f, ")")?;
        for (i, s) in self.steps.iter().enumerate() {
            writeln!(
                f,
                "  {i}: [{:<7}] {:<28} {} -> {}",
                s.stage, s.kernel, s.src, s.dst
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/format/graph.rs"]
mod tests;
