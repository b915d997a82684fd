///
/// Primitive and string slices as call arguments, and copies of
/// native-owned slices back into host vectors.
///

use tether_abi::{FfiError, FieldLayout, read_bytes};

use crate::memory::CallScope;
use crate::runtime::Runtime;
use crate::strings::ForeignSlice;

pub trait Primitive: Copy + Sized {
    const LAYOUT: FieldLayout;

    fn write_le(self, out: &mut Vec<u8>);

    /// Decode from exactly `LAYOUT.size` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! primitive {
    ($($ty:ty => $layout:expr),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const LAYOUT: FieldLayout = $layout;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    const N: usize = std::mem::size_of::<$ty>();
                    let mut buf = [0u8; N];
                    buf.copy_from_slice(&bytes[..N]);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

primitive! {
    u8 => FieldLayout::U8,
    i8 => FieldLayout::U8,
    u16 => FieldLayout::U16,
    i16 => FieldLayout::U16,
    u32 => FieldLayout::U32,
    i32 => FieldLayout::U32,
    u64 => FieldLayout::U64,
    i64 => FieldLayout::U64,
    f32 => FieldLayout::F32,
    f64 => FieldLayout::F64,
}

impl CallScope {
    pub fn slice<T: Primitive>(&mut self, items: &[T]) -> Result<ForeignSlice, FfiError> {
        let mut bytes = Vec::with_capacity(items.len() * T::LAYOUT.size as usize);
        for item in items {
            item.write_le(&mut bytes);
        }
        let len = u32::try_from(items.len()).map_err(|_| FfiError::AllocationFailure {
            size: u32::MAX,
            align: T::LAYOUT.align,
        })?;
        let addr = self.bytes(&bytes, T::LAYOUT.align)?;
        Ok(ForeignSlice { addr, len })
    }

    /// Each string is encoded on its own, then an array of
    /// `(address, length)` pairs is built over them.
    pub fn str8_slice(&mut self, items: &[&str]) -> Result<ForeignSlice, FfiError> {
        let mut pairs = Vec::with_capacity(items.len() * FieldLayout::SLICE.size as usize);
        for item in items {
            let s = self.str8(item)?;
            pairs.extend_from_slice(&s.addr.to_le_bytes());
            pairs.extend_from_slice(&s.len.to_le_bytes());
        }
        let addr = self.bytes(&pairs, FieldLayout::SLICE.align)?;
        Ok(ForeignSlice {
            addr,
            len: items.len() as u32,
        })
    }
}

/// Copy `slice.len` elements out of module memory.
pub fn read_slice<T: Primitive>(rt: &Runtime, slice: ForeignSlice) -> Result<Vec<T>, FfiError> {
    let size = T::LAYOUT.size;
    let total = slice.len.checked_mul(size).ok_or(FfiError::OutOfBounds {
        addr: slice.addr,
        len: u32::MAX,
        memory_size: 0,
    })?;
    rt.with_memory(|mem| {
        Ok(read_bytes(mem, slice.addr, total)?
            .chunks_exact(size as usize)
            .map(T::read_le)
            .collect())
    })
}
