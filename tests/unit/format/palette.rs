use super::*;

#[test]
fn palette_size_is_validated() {
    assert!(Palette::new(&[]).is_err());
    assert!(Palette::new(&vec![[0u8; 4]; 257]).is_err());
    assert_eq!(Palette::new(&[[1, 2, 3, 4]]).unwrap().len(), 1);
}

#[test]
fn grayscale_palette_spans_black_to_white() {
    let p = Palette::grayscale(2).unwrap();
    assert_eq!(
        p.colors(),
        &[
            [0, 0, 0, 255],
            [85, 85, 85, 255],
            [170, 170, 170, 255],
            [255, 255, 255, 255]
        ]
    );
    assert!(Palette::grayscale(3).is_err());
}

#[test]
fn nearest_prefers_exact_then_lowest_index() {
    let p = Palette::new(&[[0, 0, 0, 255], [10, 10, 10, 255], [10, 10, 10, 255]]).unwrap();
    assert_eq!(p.nearest([10, 10, 10, 255], 256), 1);
    assert_eq!(p.nearest([3, 3, 3, 255], 256), 0);
    assert_eq!(p.nearest([10, 10, 10, 255], 1), 0);
}

#[test]
fn out_of_range_index_is_transparent() {
    let p = Palette::new(&[[1, 2, 3, 255]]).unwrap();
    assert_eq!(p.color(0), [1, 2, 3, 255]);
    assert_eq!(p.color(5), [0, 0, 0, 0]);
}
