use std::fmt;

use serde::{Deserialize, Serialize};

/// Element types understood by the bridge.
///
/// The short names (`f32`, `i64`, `b8`, ...) are the spelling used in graph
/// renderings and in generated kernel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    I32,
    I64,
    F16,
    Bf16,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 7] = [
        DType::Bool,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::Bf16,
        DType::F32,
        DType::F64,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            DType::Bool => "b8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::Bf16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        DType::ALL
            .into_iter()
            .find(|dtype| dtype.short_name() == name)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16 | DType::F32 | DType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::I32 | DType::I64)
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool => 1,
            DType::F16 | DType::Bf16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    fn rank(self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::I32 => 1,
            DType::I64 => 2,
            DType::F16 => 3,
            DType::Bf16 => 4,
            DType::F32 => 5,
            DType::F64 => 6,
        }
    }

    /// Result type of a binary operation between two tensors.
    pub fn promote(self, other: DType) -> DType {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    /// Result type when a tensor of this type meets a Python-style scalar.
    pub fn promote_scalar(self, scalar_is_float: bool) -> DType {
        if scalar_is_float && !self.is_float() {
            DType::F32
        } else if self == DType::Bool {
            DType::I64
        } else {
            self
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
