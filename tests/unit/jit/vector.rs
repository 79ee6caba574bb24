use super::*;

#[test]
fn every_type_fits_a_register() {
    for ty in [
        VectorType::U8,
        VectorType::U16,
        VectorType::U32,
        VectorType::U8x16,
        VectorType::U16x8,
        VectorType::U32x4,
        VectorType::F32x4,
    ] {
        assert!(ty.byte_size() <= VectorType::REGISTER_BYTES, "{ty}");
        assert_eq!(ty.scale_index(ty.lane_count()), ty.byte_size());
        assert_eq!(ty.is_vector(), ty.byte_size() == VectorType::REGISTER_BYTES);
    }
}

#[test]
fn lane_scaling_follows_lane_width() {
    assert_eq!(VectorType::U8x16.scale_index(3), 3);
    assert_eq!(VectorType::U16x8.scale_index(3), 6);
    assert_eq!(VectorType::F32x4.scale_index(3), 12);
    assert_eq!(VectorType::U16x8.lane_max(), 65535);
}
