///
/// String/Buffer Codec
///
/// Input: host text is encoded into a scratch region and handed over as an
/// (address, length) pair. The region belongs to the call's `CallScope`,
/// or, for text the module keeps borrowing after the call, to an `Anchor`
/// that borrowing objects hold on to.
///
/// Output: the write-buffer protocol. The module appends to a buffer it
/// owns; afterwards the host reads the final (address, length), copies the
/// text out and destroys the buffer, on every path.
///

use std::rc::Rc;

use tether_abi::{FfiError, WireValue, read_bytes};

use crate::config::Utf8Policy;
use crate::edges::Anchor;
use crate::memory::{CallScope, ScratchRegion};
use crate::runtime::Runtime;

/// An (address, element count) argument pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignSlice {
    pub addr: u32,
    pub len: u32,
}

impl ForeignSlice {
    pub fn args(self) -> [WireValue; 2] {
        [WireValue::ptr(self.addr), self.len.into()]
    }
}

fn byte_len(len: usize) -> Result<u32, FfiError> {
    u32::try_from(len).map_err(|_| FfiError::AllocationFailure {
        size: u32::MAX,
        align: 1,
    })
}

fn encode_utf16(s: &str) -> (Vec<u8>, u32) {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    let mut units = 0;
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
        units += 1;
    }
    (bytes, units)
}

impl CallScope {
    /// UTF-8 bytes of `s`, valid until the scope ends.
    pub fn str8(&mut self, s: &str) -> Result<ForeignSlice, FfiError> {
        let len = byte_len(s.len())?;
        let addr = self.bytes(s.as_bytes(), 1)?;
        Ok(ForeignSlice { addr, len })
    }

    /// UTF-16LE code units of `s`; `len` counts code units.
    pub fn str16(&mut self, s: &str) -> Result<ForeignSlice, FfiError> {
        let (bytes, len) = encode_utf16(s);
        let addr = self.bytes(&bytes, 2)?;
        Ok(ForeignSlice { addr, len })
    }
}

/// Encode `s` into a region that outlives the call. The region is freed
/// when the last holder of the returned anchor goes away.
pub fn retain_str8(rt: &Runtime, s: &str) -> Result<(ForeignSlice, Anchor), FfiError> {
    let len = byte_len(s.len())?;
    let region = ScratchRegion::with_bytes(rt, s.as_bytes(), 1)?;
    let slice = ForeignSlice { addr: region.addr(), len };
    Ok((slice, Anchor::Buffer(Rc::new(region))))
}

fn decode_utf8(bytes: &[u8], addr: u32, policy: Utf8Policy) -> Result<String, FfiError> {
    match policy {
        Utf8Policy::Strict => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| FfiError::InvalidUtf8 {
                addr,
                len: bytes.len() as u32,
            }),
        Utf8Policy::Lossy => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Copy `len` bytes of UTF-8 out of module memory.
pub fn read_str8(rt: &Runtime, addr: u32, len: u32) -> Result<String, FfiError> {
    let policy = rt.config().strings.utf8;
    rt.with_memory(|mem| decode_utf8(read_bytes(mem, addr, len)?, addr, policy))
}

/// Copy `len` UTF-16LE code units out of module memory.
pub fn read_str16(rt: &Runtime, addr: u32, len: u32) -> Result<String, FfiError> {
    let byte_len = len.checked_mul(2).ok_or(FfiError::InvalidUtf16 { addr, len })?;
    let units: Vec<u16> = rt.with_memory(|mem| {
        Ok(read_bytes(mem, addr, byte_len)?
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    })?;
    String::from_utf16(&units).map_err(|_| FfiError::InvalidUtf16 { addr, len })
}

/// Destroys the native buffer when dropped.
struct WriteGuard {
    rt: Runtime,
    write: u32,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Err(err) = self.rt.destroy_write_buffer(self.write) {
            tracing::warn!(write = self.write, error = %err, "write buffer leaked");
        }
    }
}

/// Run `f` with a fresh write buffer and return the text written to it.
///
/// `f` receives the buffer as a call argument. If `f` fails, the buffer is
/// destroyed and its partial contents discarded.
pub fn with_write<F>(rt: &Runtime, f: F) -> Result<String, FfiError>
where
    F: FnOnce(WireValue) -> Result<(), FfiError>,
{
    let exports = &rt.config().exports;
    let capacity = rt.config().strings.write_capacity;
    let write = rt.call_u32(&exports.write_create, &[capacity.into()])?;
    if write == 0 {
        return Err(FfiError::AllocationFailure { size: capacity, align: 1 });
    }
    let guard = WriteGuard { rt: rt.clone(), write };

    f(WireValue::ptr(guard.write))?;

    let addr = rt.call_u32(&exports.write_get_bytes, &[WireValue::ptr(guard.write)])?;
    if addr == 0 {
        return Err(FfiError::WriteBufferExhausted);
    }
    let len = rt.call_u32(&exports.write_len, &[WireValue::ptr(guard.write)])?;
    let text = read_str8(rt, addr, len)?;
    tracing::debug!(len, "write buffer drained");
    Ok(text)
}
