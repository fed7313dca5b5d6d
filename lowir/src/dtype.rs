use core::fmt::Display;
use half::{bf16, f16};

/// Scalar constant stored as raw bits, so that it can be compared and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constant {
    BF16(u16),
    F16(u16),
    F32(u32),
    F64(u64),
    U8(u8),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
}

impl Constant {
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Constant::BF16(_) => DType::BF16,
            Constant::F16(_) => DType::F16,
            Constant::F32(_) => DType::F32,
            Constant::F64(_) => DType::F64,
            Constant::U8(_) => DType::U8,
            Constant::I8(_) => DType::I8,
            Constant::I16(_) => DType::I16,
            Constant::I32(_) => DType::I32,
            Constant::I64(_) => DType::I64,
            Constant::Bool(_) => DType::Bool,
        }
    }
}

impl From<f32> for Constant {
    fn from(value: f32) -> Self {
        Constant::F32(value.to_bits())
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Constant::F64(value.to_bits())
    }
}

impl From<f16> for Constant {
    fn from(value: f16) -> Self {
        Constant::F16(value.to_bits())
    }
}

impl From<bf16> for Constant {
    fn from(value: bf16) -> Self {
        Constant::BF16(value.to_bits())
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Constant::I32(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::I64(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Constant::BF16(value) => f.write_fmt(format_args!("{}", bf16::from_bits(value))),
            Constant::F16(value) => f.write_fmt(format_args!("{}", f16::from_bits(value))),
            Constant::F32(value) => f.write_fmt(format_args!("{}", f32::from_bits(value))),
            Constant::F64(value) => f.write_fmt(format_args!("{}", f64::from_bits(value))),
            Constant::U8(value) => f.write_fmt(format_args!("{value}")),
            Constant::I8(value) => f.write_fmt(format_args!("{value}")),
            Constant::I16(value) => f.write_fmt(format_args!("{value}")),
            Constant::I32(value) => f.write_fmt(format_args!("{value}")),
            Constant::I64(value) => f.write_fmt(format_args!("{value}")),
            Constant::Bool(value) => f.write_fmt(format_args!("{value}")),
        }
    }
}

/// Element type of tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    BF16,
    F16,
    F32,
    F64,
    U8,
    I8,
    I16,
    I32,
    I64,
    Bool,
}

impl Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DType::BF16 => "BF16",
            DType::F16 => "F16",
            DType::F32 => "F32",
            DType::F64 => "F64",
            DType::U8 => "U8",
            DType::I8 => "I8",
            DType::I16 => "I16",
            DType::I32 => "I32",
            DType::I64 => "I64",
            DType::Bool => "Bool",
        })
    }
}

impl DType {
    #[must_use]
    pub fn zero_constant(&self) -> Constant {
        match self {
            DType::BF16 => Constant::BF16(bf16::ZERO.to_bits()),
            DType::F16 => Constant::F16(f16::ZERO.to_bits()),
            DType::F32 => Constant::F32(0f32.to_bits()),
            DType::F64 => Constant::F64(0f64.to_bits()),
            DType::U8 => Constant::U8(0),
            DType::I8 => Constant::I8(0),
            DType::I16 => Constant::I16(0),
            DType::I32 => Constant::I32(0),
            DType::I64 => Constant::I64(0),
            DType::Bool => Constant::Bool(false),
        }
    }
}

/// Type of a single node output, dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl TensorType {
    #[must_use]
    pub fn new(dtype: DType, shape: impl Into<Vec<usize>>) -> TensorType {
        TensorType { dtype, shape: shape.into() }
    }
}

impl Display for TensorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}{:?}", self.dtype, self.shape))
    }
}
