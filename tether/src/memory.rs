///
/// Memory Bridge
///
/// Scratch allocation inside the module's memory, through the module's own
/// alloc/free exports. Raw `allocate`/`free` exist for the rare caller that
/// manages a region by hand; everything else goes through one of the RAII
/// owners below so that every allocation is freed exactly once.
///
/// - `ScratchRegion` owns a single allocation and frees it on drop.
/// - `CallScope` owns every region a call needs. When the scope ends the
///   regions are freed last-allocated-first, whether the call succeeded or
///   an error is unwinding out of argument encoding.
///

use smallvec::SmallVec;
use tether_abi::{FfiError, WireValue, is_valid_align, write_bytes};

use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub allocations: u64,
    /// Frees the module has performed. A queued free is not counted yet.
    pub frees: u64,
    pub live_regions: u64,
    pub live_bytes: u64,
    /// Owned objects whose destructor has run.
    pub destroyed: u64,
    /// Releases that had to wait for the module to become free.
    pub deferred: u64,
}

impl Runtime {
    /// Allocate `size` bytes aligned to `align` in module memory.
    pub fn allocate(&self, size: u32, align: u32) -> Result<u32, FfiError> {
        if !is_valid_align(align) {
            return Err(FfiError::InvalidAlignment { align });
        }
        let export = &self.config().exports.alloc;
        let addr = self
            .call(export, &[size.into(), align.into()])?
            .and_then(WireValue::as_u32)
            .ok_or_else(|| FfiError::BadReturn {
                export: export.clone(),
                expected: "an address",
            })?;
        if addr == 0 {
            tracing::error!(size, align, "module memory exhausted");
            return Err(FfiError::AllocationFailure { size, align });
        }
        self.update_stats(|s| {
            s.allocations += 1;
            s.live_regions += 1;
            s.live_bytes += size as u64;
        });
        if addr % align != 0 {
            self.free(addr, size, align)?;
            return Err(FfiError::MisalignedAllocation { addr, align });
        }
        tracing::trace!(addr, size, align, "allocate");
        Ok(addr)
    }

    /// Free a region obtained from `allocate` with the same size and alignment.
    /// While the module is borrowed the free is queued, and the region
    /// counts as live until the queue is flushed.
    pub fn free(&self, addr: u32, size: u32, align: u32) -> Result<(), FfiError> {
        self.release_region(addr, size, align)
    }
}

/// One allocation in module memory, freed when dropped.
#[derive(Debug)]
pub struct ScratchRegion {
    rt: Runtime,
    addr: u32,
    size: u32,
    align: u32,
    live: bool,
}

impl ScratchRegion {
    pub fn new(rt: &Runtime, size: u32, align: u32) -> Result<Self, FfiError> {
        let addr = rt.allocate(size, align)?;
        Ok(ScratchRegion {
            rt: rt.clone(),
            addr,
            size,
            align,
            live: true,
        })
    }

    /// Allocate a region holding a copy of `bytes`.
    pub fn with_bytes(rt: &Runtime, bytes: &[u8], align: u32) -> Result<Self, FfiError> {
        let size = u32::try_from(bytes.len()).map_err(|_| FfiError::AllocationFailure {
            size: u32::MAX,
            align,
        })?;
        let region = ScratchRegion::new(rt, size, align)?;
        rt.with_memory_mut(|mem| write_bytes(mem, region.addr, bytes))?;
        Ok(region)
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn align(&self) -> u32 {
        self.align
    }

    pub fn arg(&self) -> WireValue {
        WireValue::ptr(self.addr)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Free now, reporting failure instead of logging it.
    pub fn release(mut self) -> Result<(), FfiError> {
        self.live = false;
        self.rt.free(self.addr, self.size, self.align)
    }

    /// Give up ownership; the native side is now responsible for the region.
    pub fn into_raw(mut self) -> u32 {
        self.live = false;
        self.addr
    }
}

impl Drop for ScratchRegion {
    fn drop(&mut self) {
        if self.live {
            self.live = false;
            if let Err(err) = self.rt.free(self.addr, self.size, self.align) {
                tracing::warn!(addr = self.addr, error = %err, "scratch region leaked");
            }
        }
    }
}

/// Scratch regions for the duration of one native call.
pub struct CallScope {
    rt: Runtime,
    regions: SmallVec<[ScratchRegion; 4]>,
}

impl CallScope {
    pub fn new(rt: &Runtime) -> Self {
        CallScope {
            rt: rt.clone(),
            regions: SmallVec::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn alloc(&mut self, size: u32, align: u32) -> Result<u32, FfiError> {
        let region = ScratchRegion::new(&self.rt, size, align)?;
        let addr = region.addr();
        self.regions.push(region);
        Ok(addr)
    }

    pub fn bytes(&mut self, bytes: &[u8], align: u32) -> Result<u32, FfiError> {
        let region = ScratchRegion::with_bytes(&self.rt, bytes, align)?;
        let addr = region.addr();
        self.regions.push(region);
        Ok(addr)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Free every region in reverse allocation order. All regions are
    /// released even if one fails; the first failure is returned.
    pub fn finish(mut self) -> Result<(), FfiError> {
        let mut first_err = None;
        while let Some(region) = self.regions.pop() {
            if let Err(err) = region.release() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        while let Some(region) = self.regions.pop() {
            drop(region);
        }
    }
}
