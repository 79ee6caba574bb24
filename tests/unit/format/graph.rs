use super::*;

use crate::scanop::kernel::BlendOp;

#[test]
fn every_format_reaches_an_interchange_format() {
    for fmt in PixelFormat::ALL {
        let near = nearest_interchange_format(fmt);
        match fmt.classify() {
            FormatClass::Interchange(i) => {
                assert_eq!(i, near);
                assert_eq!(i.pixel_format(), fmt);
                assert!(is_interchange_format(fmt));
            }
            FormatClass::Derived(d) => {
                assert!(!is_interchange_format(fmt));
                assert_eq!(d.nearest_interchange(), near);
                let to = d.to_interchange_kernel();
                let from = d.from_interchange_kernel();
                assert_eq!((to.src, to.dst), (fmt, near.pixel_format()));
                assert_eq!((from.src, from.dst), (near.pixel_format(), fmt));
            }
        }
    }
    let count = PixelFormat::ALL
        .iter()
        .filter(|&&f| is_interchange_format(f))
        .count();
    assert_eq!(count, 3);
}

#[test]
fn family_table_matches_channel_depth() {
    assert_eq!(
        nearest_interchange_format(PixelFormat::Indexed4),
        InterchangeFormat::Argb32
    );
    assert_eq!(
        nearest_interchange_format(PixelFormat::Bgr101010),
        InterchangeFormat::Argb64
    );
    assert_eq!(
        nearest_interchange_format(PixelFormat::Gray32Float),
        InterchangeFormat::Abgr128Float
    );
}

#[test]
fn chains_are_connected_and_short() {
    for src in PixelFormat::ALL {
        for dst in PixelFormat::ALL {
            let chain = conversion_chain(src, dst);
            assert!((1..=3).contains(&chain.len()), "{src} -> {dst}");
            assert_eq!(chain.steps()[0].src, src);
            assert_eq!(chain.steps()[chain.len() - 1].dst, dst);
            for pair in chain.steps().windows(2) {
                assert_eq!(pair[0].dst, pair[1].src, "{src} -> {dst}");
            }
            assert_eq!(chain.is_copy(), src == dst);
        }
    }
}

#[test]
fn chain_shapes() {
    let names = |s, d| -> Vec<&'static str> {
        conversion_chain(s, d).steps().iter().map(|k| k.name).collect()
    };
    assert_eq!(names(PixelFormat::Bgr24, PixelFormat::Bgr24), vec!["copy"]);
    assert_eq!(
        names(PixelFormat::Bgr24, PixelFormat::Bgra32),
        vec!["bgr24_to_bgra32"]
    );
    assert_eq!(
        names(PixelFormat::Bgr24, PixelFormat::Rgb24),
        vec!["bgr24_to_bgra32", "bgra32_to_rgb24"]
    );
    assert_eq!(
        names(PixelFormat::Bgr24, PixelFormat::Gray16),
        vec!["bgr24_to_bgra32", "bgra32_to_rgba64", "rgba64_to_gray16"]
    );
    assert_eq!(
        names(PixelFormat::Rgba64, PixelFormat::Prgba128Float),
        vec!["rgba64_to_prgba128f"]
    );
    assert_eq!(
        names(PixelFormat::Gray16, PixelFormat::Rgb48),
        vec!["gray16_to_rgba64", "rgba64_to_rgb48"]
    );
}

#[test]
fn scratch_covers_the_widest_intermediate() {
    let chain = conversion_chain(PixelFormat::Bgr24, PixelFormat::Gray16);
    let mids: Vec<PixelFormat> = chain.intermediate_formats().collect();
    assert_eq!(mids, vec![PixelFormat::Bgra32, PixelFormat::Rgba64]);
    assert_eq!(chain.scratch_bytes(10).unwrap(), 80);
    assert_eq!(
        conversion_chain(PixelFormat::Gray8, PixelFormat::Gray8)
            .scratch_bytes(10)
            .unwrap(),
        0
    );
}

#[test]
fn palette_needs_follow_the_ends() {
    let chain = conversion_chain(PixelFormat::Indexed8, PixelFormat::Bgr24);
    assert!(chain.needs_src_palette());
    assert!(!chain.needs_dst_palette());

    let chain = conversion_chain(PixelFormat::Rgba64, PixelFormat::Indexed4);
    assert!(!chain.needs_src_palette());
    assert!(chain.needs_dst_palette());

    // Copying indices does not look at the palette.
    let chain = conversion_chain(PixelFormat::Indexed2, PixelFormat::Indexed2);
    assert!(!chain.needs_src_palette() && !chain.needs_dst_palette());
}

#[test]
fn fused_blends_cover_the_opaque_targets() {
    for dst in [
        PixelFormat::Pbgra32,
        PixelFormat::Bgr32,
        PixelFormat::Bgr24,
        PixelFormat::Rgb24,
        PixelFormat::Bgr555,
        PixelFormat::Bgr565,
    ] {
        let k = blend_kernel(PixelFormat::Pbgra32, dst).unwrap();
        assert_eq!(k.op, BlendOp::SrcOverAL);
        assert!(blend_plan(PixelFormat::Pbgra32, dst).is_fused());
    }
    let k = blend_kernel(PixelFormat::Prgba128Float, PixelFormat::Prgba128Float).unwrap();
    assert_eq!(k.op, BlendOp::SrcOver);
    assert!(blend_kernel(PixelFormat::Pbgra32, PixelFormat::Gray8).is_none());
    assert!(blend_kernel(PixelFormat::Bgra32, PixelFormat::Bgr24).is_none());
}

#[test]
fn decomposed_blend_uses_the_wider_family() {
    assert_eq!(
        blend_format_for(PixelFormat::Bgra32, PixelFormat::Gray8),
        PixelFormat::Pbgra32
    );
    assert_eq!(
        blend_format_for(PixelFormat::Bgr24, PixelFormat::Gray16),
        PixelFormat::Prgba64
    );
    assert_eq!(
        blend_format_for(PixelFormat::Rgba128Float, PixelFormat::Rgba64),
        PixelFormat::Prgba128Float
    );

    match blend_plan(PixelFormat::Bgra32, PixelFormat::Gray16) {
        BlendPlan::Decomposed {
            blend_format,
            src_chain,
            dst_chain,
            blend,
            back_chain,
        } => {
            assert_eq!(blend_format, PixelFormat::Prgba64);
            assert_eq!(blend.name, "src_over_prgba64");
            let src_chain = src_chain.unwrap();
            assert_eq!(src_chain.dst(), PixelFormat::Prgba64);
            assert_eq!(dst_chain.unwrap().src(), PixelFormat::Gray16);
            assert_eq!(back_chain.unwrap().dst(), PixelFormat::Gray16);
        }
        BlendPlan::Fused(k) => panic!("unexpected fused kernel {}", k.name),
    }

    match blend_plan(PixelFormat::Pbgra32, PixelFormat::Gray8) {
        BlendPlan::Decomposed {
            src_chain,
            dst_chain,
            back_chain,
            ..
        } => {
            assert!(src_chain.is_none());
            assert!(dst_chain.is_some());
            assert!(back_chain.is_some());
        }
        BlendPlan::Fused(k) => panic!("unexpected fused kernel {}", k.name),
    }
}

#[test]
fn lookup_respects_the_kind() {
    let name = |k: Option<ScanKernel>| k.map(|k| k.name());
    assert_eq!(
        name(lookup_kernel(PixelFormat::Gray8, PixelFormat::Gray8, ScanOpKind::Copy)),
        Some("copy")
    );
    assert!(lookup_kernel(PixelFormat::Gray8, PixelFormat::Gray4, ScanOpKind::Copy).is_none());
    assert_eq!(
        name(lookup_kernel(PixelFormat::Bgr24, PixelFormat::Bgra32, ScanOpKind::Convert)),
        Some("bgr24_to_bgra32")
    );
    assert!(lookup_kernel(PixelFormat::Bgr24, PixelFormat::Bgra32, ScanOpKind::Quantize).is_none());
    assert_eq!(
        name(lookup_kernel(PixelFormat::Bgra32, PixelFormat::Bgr24, ScanOpKind::Quantize)),
        Some("bgra32_to_bgr24")
    );
    assert!(lookup_kernel(PixelFormat::Bgr24, PixelFormat::Rgb24, ScanOpKind::Convert).is_none());
    assert_eq!(
        name(lookup_kernel(
            PixelFormat::Pbgra32,
            PixelFormat::Bgr565,
            ScanOpKind::Blend(BlendOp::SrcOverAL)
        )),
        Some("src_over_al_pbgra32_bgr565")
    );
    assert_eq!(
        name(lookup_kernel(
            PixelFormat::Prgba64,
            PixelFormat::Prgba64,
            ScanOpKind::Blend(BlendOp::SrcOver)
        )),
        Some("src_over_prgba64")
    );
    assert!(
        lookup_kernel(
            PixelFormat::Pbgra32,
            PixelFormat::Bgr565,
            ScanOpKind::Blend(BlendOp::SrcOver)
        )
        .is_none()
    );
}

#[test]
fn plan_dump_serializes() {
    let dump = blend_plan(PixelFormat::Bgr24, PixelFormat::Gray16)
        .dump(PixelFormat::Bgr24, PixelFormat::Gray16);
    assert_eq!(dump.mode, PlanMode::Decomposed);
    assert_eq!(dump.steps.last().map(|s| s.stage), Some("back"));
    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["mode"], "decomposed");
    assert_eq!(json["blend_format"], "prgba64");
    assert_eq!(json["src"], "bgr24");

    let dump = conversion_chain(PixelFormat::Gray8, PixelFormat::Gray8).dump();
    assert_eq!(dump.mode, PlanMode::Copy);
    let json = serde_json::to_value(&dump).unwrap();
    assert!(json.get("blend_format").is_none());

    let text = conversion_chain(PixelFormat::Bgr24, PixelFormat::Rgb24)
        .dump()
        .to_string();
    assert!(text.starts_with("bgr24 -> rgb24 (Convert)"));
    assert!(text.contains("bgra32_to_rgb24"));
}
