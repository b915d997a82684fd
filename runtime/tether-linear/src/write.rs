///
/// Native Write Buffers
///
/// The native half of the write-buffer protocol. A write buffer is a
/// 16-byte header in linear memory:
///
/// | offset | field        |
/// |--------|--------------|
/// | 0      | data address |
/// | 4      | length       |
/// | 8      | capacity     |
/// | 12     | grow failed  |
///
/// Exports append to it, possibly reallocating the data block. When a
/// reallocation fails the buffer is marked and its bytes address reads
/// as 0 from then on, so the host can tell truncated output from real
/// output.
///

use tether_abi::{FfiError, read_u32, read_u8, write_u32, write_u8};

use crate::memory::LinearMemory;

pub const WRITE_HEADER_SIZE: u32 = 16;
pub const WRITE_HEADER_ALIGN: u32 = 4;

const DATA: u32 = 0;
const LEN: u32 = 4;
const CAP: u32 = 8;
const FAILED: u32 = 12;

struct Header {
    data: u32,
    len: u32,
    cap: u32,
    failed: bool,
}

fn header(mem: &LinearMemory, write: u32) -> Result<Header, FfiError> {
    let bytes = mem.bytes();
    Ok(Header {
        data: read_u32(bytes, write + DATA)?,
        len: read_u32(bytes, write + LEN)?,
        cap: read_u32(bytes, write + CAP)?,
        failed: read_u8(bytes, write + FAILED)? != 0,
    })
}

fn store(mem: &mut LinearMemory, write: u32, h: &Header) -> Result<(), FfiError> {
    let bytes = mem.bytes_mut();
    write_u32(bytes, write + DATA, h.data)?;
    write_u32(bytes, write + LEN, h.len)?;
    write_u32(bytes, write + CAP, h.cap)?;
    write_u8(bytes, write + FAILED, h.failed as u8)
}

/// Create an empty buffer. `None` when memory is exhausted.
pub fn create(mem: &mut LinearMemory, capacity: u32) -> Option<u32> {
    let write = mem.alloc(WRITE_HEADER_SIZE, WRITE_HEADER_ALIGN)?;
    let Some(data) = mem.alloc(capacity, 1) else {
        mem.free(write, WRITE_HEADER_SIZE, WRITE_HEADER_ALIGN).ok()?;
        return None;
    };
    let h = Header {
        data,
        len: 0,
        cap: capacity,
        failed: false,
    };
    store(mem, write, &h).ok()?;
    Some(write)
}

pub fn append(mem: &mut LinearMemory, write: u32, chunk: &[u8]) -> Result<(), FfiError> {
    let mut h = header(mem, write)?;
    if h.failed {
        return Err(FfiError::WriteBufferExhausted);
    }

    let needed = u32::try_from(chunk.len())
        .ok()
        .and_then(|n| h.len.checked_add(n))
        .ok_or(FfiError::WriteBufferExhausted)?;

    if needed > h.cap {
        let new_cap = needed.max(h.cap.saturating_mul(2));
        let Some(new_data) = mem.alloc(new_cap, 1) else {
            h.failed = true;
            store(mem, write, &h)?;
            return Err(FfiError::WriteBufferExhausted);
        };
        let (old, len) = (h.data as usize, h.len as usize);
        mem.bytes_mut().copy_within(old..old + len, new_data as usize);
        mem.free(h.data, h.cap, 1)
            .map_err(|m| FfiError::trap("write buffer", m))?;
        h.data = new_data;
        h.cap = new_cap;
    }

    let at = (h.data + h.len) as usize;
    mem.bytes_mut()[at..at + chunk.len()].copy_from_slice(chunk);
    h.len = needed;
    store(mem, write, &h)
}

pub fn bytes_addr(mem: &LinearMemory, write: u32) -> Result<u32, FfiError> {
    let h = header(mem, write)?;
    Ok(if h.failed { 0 } else { h.data })
}

pub fn len(mem: &LinearMemory, write: u32) -> Result<u32, FfiError> {
    Ok(header(mem, write)?.len)
}

pub fn destroy(mem: &mut LinearMemory, write: u32) -> Result<(), FfiError> {
    let h = header(mem, write)?;
    mem.free(h.data, h.cap, 1)
        .map_err(|m| FfiError::trap("write buffer", m))?;
    mem.free(write, WRITE_HEADER_SIZE, WRITE_HEADER_ALIGN)
        .map_err(|m| FfiError::trap("write buffer", m))
}
