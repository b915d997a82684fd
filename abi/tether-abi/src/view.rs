///
/// Memory View Helpers
///
/// Bounds-checked little-endian reads and writes over a module's memory.
/// Both the host runtime and native export implementations go through
/// these; neither side ever indexes the byte array directly.
///

use crate::error::FfiError;

fn range(mem_len: usize, addr: u32, len: u32) -> Result<std::ops::Range<usize>, FfiError> {
    let start = addr as usize;
    let end = start.checked_add(len as usize);
    match end {
        Some(end) if end <= mem_len => Ok(start..end),
        _ => Err(FfiError::OutOfBounds {
            addr,
            len,
            memory_size: mem_len,
        }),
    }
}

pub fn read_bytes(mem: &[u8], addr: u32, len: u32) -> Result<&[u8], FfiError> {
    let r = range(mem.len(), addr, len)?;
    Ok(&mem[r])
}

pub fn write_bytes(mem: &mut [u8], addr: u32, data: &[u8]) -> Result<(), FfiError> {
    let len = u32::try_from(data.len()).map_err(|_| FfiError::OutOfBounds {
        addr,
        len: u32::MAX,
        memory_size: mem.len(),
    })?;
    let r = range(mem.len(), addr, len)?;
    mem[r].copy_from_slice(data);
    Ok(())
}

macro_rules! le_access {
    ($($read:ident, $write:ident => $ty:ty;)*) => {
        $(
            pub fn $read(mem: &[u8], addr: u32) -> Result<$ty, FfiError> {
                const N: usize = std::mem::size_of::<$ty>();
                let bytes = read_bytes(mem, addr, N as u32)?;
                let mut raw = [0u8; N];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(raw))
            }

            pub fn $write(mem: &mut [u8], addr: u32, value: $ty) -> Result<(), FfiError> {
                write_bytes(mem, addr, &value.to_le_bytes())
            }
        )*
    };
}

le_access! {
    read_u8, write_u8 => u8;
    read_u16, write_u16 => u16;
    read_u32, write_u32 => u32;
    read_i32, write_i32 => i32;
    read_u64, write_u64 => u64;
    read_i64, write_i64 => i64;
    read_f32, write_f32 => f32;
    read_f64, write_f64 => f64;
}
