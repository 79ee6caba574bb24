use serde::Serialize;

/// Value type of a JIT variable. Every value fits a 16-byte register; scalars use the low lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorType {
    U8,
    U16,
    U32,
    U8x16,
    U16x8,
    U32x4,
    F32x4,
}

impl VectorType {
    pub const REGISTER_BYTES: usize = 16;

    pub fn lane_count(self) -> usize {
        match self {
            VectorType::U8 | VectorType::U16 | VectorType::U32 => 1,
            VectorType::U8x16 => 16,
            VectorType::U16x8 => 8,
            VectorType::U32x4 | VectorType::F32x4 => 4,
        }
    }

    pub fn lane_bytes(self) -> usize {
        match self {
            VectorType::U8 | VectorType::U8x16 => 1,
            VectorType::U16 | VectorType::U16x8 => 2,
            VectorType::U32 | VectorType::U32x4 | VectorType::F32x4 => 4,
        }
    }

    pub fn byte_size(self) -> usize {
        self.lane_count() * self.lane_bytes()
    }

    /// Byte offset of lane `index`.
    pub fn scale_index(self, index: usize) -> usize {
        index * self.lane_bytes()
    }

    pub fn is_vector(self) -> bool {
        self.lane_count() > 1
    }

    pub fn is_float(self) -> bool {
        self == VectorType::F32x4
    }

    /// Largest unsigned lane value.
    pub fn lane_max(self) -> u32 {
        match self.lane_bytes() {
            1 => u32::from(u8::MAX),
            2 => u32::from(u16::MAX),
            _ => u32::MAX,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VectorType::U8 => "u8",
            VectorType::U16 => "u16",
            VectorType::U32 => "u32",
            VectorType::U8x16 => "u8x16",
            VectorType::U16x8 => "u16x8",
            VectorType::U32x4 => "u32x4",
            VectorType::F32x4 => "f32x4",
        }
    }
}

impl std::fmt::Display for VectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jit/vector.rs"]
mod tests;
