///
/// Linear Memory
///
/// A growable byte array in 64 KiB pages with an allocator over its heap.
/// Growth is bounded by `max_pages`; a request that cannot fit even after
/// growing returns `None`, which the alloc export reports as address 0.
///

use tether_abi::is_valid_align;
use thiserror::Error;

use crate::allocator::{AllocError, SizeClassAllocator};

pub const PAGE_SIZE: u32 = 64 * 1024;

/// Largest page count whose byte size is still a 32-bit address.
pub const MAX_PAGES: u32 = u32::MAX / PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("{pages} pages do not fit in a 32-bit address space (at most {MAX_PAGES})")]
    TooManyPages { pages: u32 },
}

#[derive(Debug)]
pub struct LinearMemory {
    bytes: Vec<u8>,
    max_pages: u32,
    allocator: SizeClassAllocator,
}

impl LinearMemory {
    pub fn new(initial_pages: u32, max_pages: u32) -> Result<Self, MemoryError> {
        let max_pages = max_pages.max(initial_pages);
        if max_pages > MAX_PAGES {
            return Err(MemoryError::TooManyPages { pages: max_pages });
        }
        Ok(LinearMemory::with_pages(initial_pages, max_pages))
    }

    /// Both counts must already be at most `MAX_PAGES`.
    fn with_pages(initial_pages: u32, max_pages: u32) -> Self {
        Self {
            bytes: vec![0; initial_pages as usize * PAGE_SIZE as usize],
            max_pages,
            allocator: SizeClassAllocator::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn pages(&self) -> u32 {
        self.size() / PAGE_SIZE
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Grow by `delta` pages, returning the previous page count.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.pages();
        let new = old.checked_add(delta)?;
        if new > self.max_pages {
            return None;
        }
        self.bytes.resize((new as usize) * PAGE_SIZE as usize, 0);
        Some(old)
    }

    /// Allocate a zeroed block. `None` when alignment is invalid or memory
    /// cannot grow far enough.
    pub fn alloc(&mut self, size: u32, align: u32) -> Option<u32> {
        if !is_valid_align(align) {
            return None;
        }
        let addr = match self.allocator.alloc(size, align, self.size()) {
            Ok(addr) => addr,
            Err(AllocError::TooLarge) => return None,
            Err(AllocError::NeedsGrowth { end: needed }) => {
                let needed_pages = (needed as u64).div_ceil(PAGE_SIZE as u64);
                let delta = u32::try_from(needed_pages).ok()?.checked_sub(self.pages())?;
                self.grow(delta)?;
                self.allocator.alloc(size, align, self.size()).ok()?
            }
        };
        let start = addr as usize;
        self.bytes[start..start + size as usize].fill(0);
        Some(addr)
    }

    pub fn free(&mut self, addr: u32, size: u32, align: u32) -> Result<(), String> {
        self.allocator.free(addr, size, align).map(|_| ())
    }

    pub fn is_live(&self, addr: u32) -> bool {
        self.allocator.is_live(addr)
    }

    pub fn live_allocations(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn live_bytes(&self) -> u64 {
        self.allocator.live_bytes()
    }
}

impl Default for LinearMemory {
    fn default() -> Self {
        LinearMemory::with_pages(1, 256)
    }
}
