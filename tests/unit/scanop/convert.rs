use super::*;

fn run(kernel: ConvertKernel, src: &[u8], count: usize, palette: Option<&Palette>) -> Vec<u8> {
    let mut dst = vec![0u8; kernel.dst.byte_len(count).unwrap()];
    kernel.run(&mut dst, src, count, palette);
    dst
}

#[test]
fn packed_pixels_are_msb_first() {
    let src = [0b1011_0001u8];
    assert_eq!(read_packed(&src, 0, 1), 1);
    assert_eq!(read_packed(&src, 1, 1), 0);
    assert_eq!(read_packed(&src, 7, 1), 1);
    assert_eq!(read_packed(&src, 0, 4), 0b1011);
    assert_eq!(read_packed(&src, 1, 4), 0b0001);
    assert_eq!(read_packed(&src, 1, 2), 0b11);

    let mut dst = [0u8; 1];
    write_packed(&mut dst, 2, 2, 0b10);
    assert_eq!(dst[0], 0b0000_1000);
    write_packed(&mut dst, 2, 2, 0b01);
    assert_eq!(dst[0], 0b0000_0100);
}

#[test]
fn rgb24_round_trips_through_bgra32() {
    let src: Vec<u8> = (0..30u8).map(|v| v.wrapping_mul(37)).collect();
    let up = to_bgra32_kernel(PixelFormat::Rgb24).unwrap();
    let down = from_bgra32_kernel(PixelFormat::Rgb24).unwrap();
    let wide = run(up, &src, 10, None);
    assert_eq!(&wide[..4], &[src[2], src[1], src[0], 255]);
    assert_eq!(run(down, &wide, 10, None), src);
}

#[test]
fn bgr565_expansion_is_exact_at_extremes() {
    let src = [0xFFu8, 0xFF, 0x00, 0x00, 0x1F, 0x00];
    let out = run(to_bgra32_kernel(PixelFormat::Bgr565).unwrap(), &src, 3, None);
    assert_eq!(&out[0..4], &[255, 255, 255, 255]);
    assert_eq!(&out[4..8], &[0, 0, 0, 255]);
    assert_eq!(&out[8..12], &[255, 0, 0, 255]);

    let back = run(from_bgra32_kernel(PixelFormat::Bgr565).unwrap(), &out, 3, None);
    assert_eq!(back, src);
}

#[test]
fn bgr555_drops_low_bits_only() {
    let px = [0b1010_1111u8, 0b0101_0111, 0b1111_1000, 255];
    let packed = run(from_bgra32_kernel(PixelFormat::Bgr555).unwrap(), &px, 1, None);
    let v = u16::from_le_bytes([packed[0], packed[1]]);
    assert_eq!(v, pack_555(px[0], px[1], px[2]));
    assert_eq!(v >> 15, 0);
    let out = run(to_bgra32_kernel(PixelFormat::Bgr555).unwrap(), &packed, 1, None);
    for c in 0..3 {
        assert_eq!(out[c] >> 3, px[c] >> 3);
    }
    assert_eq!(out[3], 255);
}

#[test]
fn gray_levels_span_the_full_range() {
    let src = [0b0001_1011u8];
    let out = run(to_bgra32_kernel(PixelFormat::Gray2).unwrap(), &src, 4, None);
    let levels: Vec<u8> = out.chunks_exact(4).map(|p| p[0]).collect();
    assert_eq!(levels, vec![0, 85, 170, 255]);
    assert!(out.chunks_exact(4).all(|p| p[0] == p[1] && p[1] == p[2] && p[3] == 255));

    let back = run(from_bgra32_kernel(PixelFormat::Gray2).unwrap(), &out, 4, None);
    assert_eq!(back, src);
}

#[test]
fn indexed_conversion_uses_the_palette() {
    let palette = Palette::new(&[[0, 0, 255, 255], [0, 255, 0, 255], [255, 0, 0, 255]]).unwrap();
    let src = [0b0001_1000u8];
    let out = run(
        to_bgra32_kernel(PixelFormat::Indexed2).unwrap(),
        &src,
        4,
        Some(&palette),
    );
    assert_eq!(&out[0..4], &[0, 0, 255, 255]);
    assert_eq!(&out[4..8], &[0, 255, 0, 255]);
    assert_eq!(&out[8..12], &[255, 0, 0, 255]);
    assert_eq!(&out[12..16], &[0, 0, 255, 255]);

    let back = run(
        from_bgra32_kernel(PixelFormat::Indexed2).unwrap(),
        &out,
        4,
        Some(&palette),
    );
    assert_eq!(back, src);
}

#[test]
fn quantizing_to_indexed1_only_sees_two_entries() {
    let palette = Palette::new(&[[0, 0, 0, 255], [255, 255, 255, 255], [10, 200, 30, 255]])
        .unwrap();
    let src = [10u8, 200, 30, 255];
    assert_eq!(palette.nearest(src, 256), 2);
    let out = run(
        from_bgra32_kernel(PixelFormat::Indexed1).unwrap(),
        &src,
        1,
        Some(&palette),
    );
    assert_eq!(out[0] >> 7, 0);
}

#[test]
fn premultiply_clamps_and_preserves_extremes() {
    assert_eq!(premultiply_px([200, 100, 50, 0]), [0, 0, 0, 0]);
    assert_eq!(premultiply_px([200, 100, 50, 255]), [200, 100, 50, 255]);
    let p = premultiply_px([255, 128, 0, 128]);
    assert_eq!(p, [128, 64, 0, 128]);
    assert!(p[..3].iter().all(|&c| c <= p[3]));

    // Superluminous input is clamped to alpha before dividing.
    assert_eq!(unpremultiply_px([200, 10, 0, 100]), [255, 26, 0, 100]);
    assert_eq!(unpremultiply_px([9, 9, 9, 0]), [0, 0, 0, 0]);
}

#[test]
fn pbgra32_round_trip_is_stable_for_opaque_pixels() {
    let src: Vec<u8> = (0..64u8)
        .flat_map(|i| [i.wrapping_mul(3), i.wrapping_mul(5), i.wrapping_mul(7), 255])
        .collect();
    let up = run(to_bgra32_kernel(PixelFormat::Pbgra32).unwrap(), &src, 64, None);
    assert_eq!(up, src);
    let down = run(from_bgra32_kernel(PixelFormat::Pbgra32).unwrap(), &up, 64, None);
    assert_eq!(down, src);
}

#[test]
fn bgr32_writes_opaque_alpha() {
    let src = [1u8, 2, 3, 77];
    let out = run(to_bgra32_kernel(PixelFormat::Bgr32).unwrap(), &src, 1, None);
    assert_eq!(out, vec![1, 2, 3, 255]);
}

#[test]
fn copy_handles_partial_trailing_bytes() {
    let src = [0b1010_1010u8, 0b1100_0000];
    let mut dst = [0u8, 0b0011_1111];
    copy_kernel(PixelFormat::Indexed1).run(&mut dst, &src, 10, None);
    assert_eq!(dst, [0b1010_1010, 0b1111_1111]);

    let src: Vec<u8> = (0..24).collect();
    let mut dst = vec![0u8; 24];
    copy_kernel(PixelFormat::Rgb24).run(&mut dst, &src, 8, None);
    assert_eq!(dst, src);
}

#[test]
fn every_narrow_format_has_both_directions() {
    for fmt in PixelFormat::ALL {
        let narrow = fmt.bits_per_pixel() <= 32 && !fmt.is_float() && fmt != PixelFormat::Bgr101010;
        if !narrow || fmt == PixelFormat::Bgra32 || fmt == PixelFormat::Gray16 {
            continue;
        }
        let up = to_bgra32_kernel(fmt).unwrap_or_else(|| panic!("{fmt} has no widening kernel"));
        let down = from_bgra32_kernel(fmt).unwrap_or_else(|| panic!("{fmt} has no narrowing kernel"));
        assert_eq!((up.src, up.dst), (fmt, PixelFormat::Bgra32));
        assert_eq!((down.src, down.dst), (PixelFormat::Bgra32, fmt));
        assert_eq!(up.kind, ScanOpKind::Convert);
        assert_eq!(down.kind, ScanOpKind::Quantize);
        assert_eq!(up.needs_palette(), fmt.is_indexed());
    }
    assert!(to_bgra32_kernel(PixelFormat::Rgba64).is_none());
}
