///
/// Wire Values
///
/// Every argument and scalar return crosses the boundary as one of four
/// primitive slots. Addresses, lengths, booleans, enum ordinals and all
/// integers up to 32 bits travel as `I32`; the bits are reinterpreted on
/// each side, never converted.
///

use std::fmt;

use crate::error::FfiError;

/// A 32-bit address into module memory.
pub type Address = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl WireValue {
    pub fn ptr(addr: Address) -> Self {
        WireValue::I32(addr as i32)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::I32(_) => "i32",
            WireValue::I64(_) => "i64",
            WireValue::F32(_) => "f32",
            WireValue::F64(_) => "f64",
        }
    }

    pub fn as_i32(self) -> Option<i32> {
        match self {
            WireValue::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(self) -> Option<u32> {
        self.as_i32().map(|v| v as u32)
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            WireValue::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(self) -> Option<f32> {
        match self {
            WireValue::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            WireValue::F64(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! wire_from_narrow {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for WireValue {
                fn from(v: $ty) -> Self {
                    WireValue::I32(v as i32)
                }
            }
        )*
    };
}

wire_from_narrow!(i8, u8, i16, u16, i32, u32);

impl From<bool> for WireValue {
    fn from(v: bool) -> Self {
        WireValue::I32(v as i32)
    }
}

impl From<i64> for WireValue {
    fn from(v: i64) -> Self {
        WireValue::I64(v)
    }
}

impl From<u64> for WireValue {
    fn from(v: u64) -> Self {
        WireValue::I64(v as i64)
    }
}

impl From<f32> for WireValue {
    fn from(v: f32) -> Self {
        WireValue::F32(v)
    }
}

impl From<f64> for WireValue {
    fn from(v: f64) -> Self {
        WireValue::F64(v)
    }
}

impl From<Handle> for WireValue {
    fn from(h: Handle) -> Self {
        WireValue::ptr(h.addr())
    }
}

/// Non-null address of a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub fn new(addr: Address) -> Option<Self> {
        if addr == 0 { None } else { Some(Handle(addr)) }
    }

    pub fn addr(self) -> Address {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Positional argument extraction for native export implementations.
pub trait ArgsExt {
    fn i32_at(&self, export: &str, index: usize) -> Result<i32, FfiError>;
    fn u32_at(&self, export: &str, index: usize) -> Result<u32, FfiError>;
    fn i64_at(&self, export: &str, index: usize) -> Result<i64, FfiError>;
    fn f64_at(&self, export: &str, index: usize) -> Result<f64, FfiError>;
}

fn bad_argument(export: &str, index: usize, expected: &'static str) -> FfiError {
    FfiError::BadArgument {
        export: export.to_string(),
        index,
        expected,
    }
}

impl ArgsExt for [WireValue] {
    fn i32_at(&self, export: &str, index: usize) -> Result<i32, FfiError> {
        self.get(index)
            .and_then(|v| v.as_i32())
            .ok_or_else(|| bad_argument(export, index, "i32"))
    }

    fn u32_at(&self, export: &str, index: usize) -> Result<u32, FfiError> {
        self.i32_at(export, index).map(|v| v as u32)
    }

    fn i64_at(&self, export: &str, index: usize) -> Result<i64, FfiError> {
        self.get(index)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| bad_argument(export, index, "i64"))
    }

    fn f64_at(&self, export: &str, index: usize) -> Result<f64, FfiError> {
        self.get(index)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| bad_argument(export, index, "f64"))
    }
}
