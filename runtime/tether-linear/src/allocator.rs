///
/// Size-Class Allocator
///
/// Bump-pointer allocation with free lists for reuse, operating on offsets
/// into a linear memory rather than on host pointers.
///
/// Size classes: 8, 16, 32, 48, 64, 80, 96, 128, 192, 256, 512 bytes.
/// Small requests (at most 512 bytes, alignment at most 8) are served from
/// the class free list or the bump region. Larger or over-aligned requests
/// reuse a freed block of the exact rounded size, or bump.
///
/// Every live block is tracked so a free with the wrong address, size or
/// alignment is reported instead of corrupting the free lists.
///

use std::collections::{BTreeMap, HashMap};

use tether_abi::align_up;

pub const HEAP_BASE: u32 = 16;
const MAX_SMALL_ALLOC: u32 = 512;
const SMALL_ALIGN: u32 = 8;
const NUM_SIZE_CLASSES: usize = 11;

#[inline(always)]
fn size_class_index(size: u32) -> usize {
    if size <= 8 { 0 }
    else if size <= 16 { 1 }
    else if size <= 32 { 2 }
    else if size <= 48 { 3 }
    else if size <= 64 { 4 }
    else if size <= 80 { 5 }
    else if size <= 96 { 6 }
    else if size <= 128 { 7 }
    else if size <= 192 { 8 }
    else if size <= 256 { 9 }
    else { 10 }
}

#[inline(always)]
fn size_class_size(index: usize) -> u32 {
    match index {
        0 => 8,
        1 => 16,
        2 => 32,
        3 => 48,
        4 => 64,
        5 => 80,
        6 => 96,
        7 => 128,
        8 => 192,
        9 => 256,
        _ => 512,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The request fits once memory is at least `end` bytes long.
    NeedsGrowth { end: u32 },
    /// The request cannot fit anywhere in a 32-bit address space.
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    size: u32,
    align: u32,
    reserved: u32,
    class: Option<usize>,
}

#[derive(Debug, Default)]
pub struct SizeClassAllocator {
    bump: u32,
    free_lists: [Vec<u32>; NUM_SIZE_CLASSES],
    large_free: BTreeMap<u32, Vec<u32>>,
    live: HashMap<u32, Block>,
}

impl SizeClassAllocator {
    pub fn new() -> Self {
        Self {
            bump: HEAP_BASE,
            ..Default::default()
        }
    }

    /// Reserve a block for `size` bytes aligned to `align` below `limit`.
    pub fn alloc(&mut self, size: u32, align: u32, limit: u32) -> Result<u32, AllocError> {
        if size <= MAX_SMALL_ALLOC && align <= SMALL_ALIGN {
            let class = size_class_index(size);
            let reserved = size_class_size(class);
            let addr = match self.free_lists[class].pop() {
                Some(addr) => addr,
                None => self.bump(reserved, SMALL_ALIGN, limit)?,
            };
            self.live.insert(addr, Block { size, align, reserved, class: Some(class) });
            return Ok(addr);
        }

        let reserved = align_up(size.max(1), SMALL_ALIGN).ok_or(AllocError::TooLarge)?;
        let reused = self.large_free.get_mut(&reserved).and_then(|list| {
            let pos = list.iter().position(|addr| addr % align == 0)?;
            Some(list.swap_remove(pos))
        });
        if self.large_free.get(&reserved).is_some_and(|list| list.is_empty()) {
            self.large_free.remove(&reserved);
        }

        let addr = match reused {
            Some(addr) => addr,
            None => self.bump(reserved, align.max(SMALL_ALIGN), limit)?,
        };
        self.live.insert(addr, Block { size, align, reserved, class: None });
        Ok(addr)
    }

    fn bump(&mut self, reserved: u32, align: u32, limit: u32) -> Result<u32, AllocError> {
        let start = align_up(self.bump, align).ok_or(AllocError::TooLarge)?;
        let end = start.checked_add(reserved).ok_or(AllocError::TooLarge)?;
        if end > limit {
            return Err(AllocError::NeedsGrowth { end });
        }
        self.bump = end;
        Ok(start)
    }

    /// Return a block. Size and alignment must match the allocation.
    pub fn free(&mut self, addr: u32, size: u32, align: u32) -> Result<u32, String> {
        let block = match self.live.get(&addr) {
            Some(block) => *block,
            None => return Err(format!("free of unallocated address {:#x}", addr)),
        };
        if block.size != size || block.align != align {
            return Err(format!(
                "free of {:#x} with size {} align {}, allocated with size {} align {}",
                addr, size, align, block.size, block.align
            ));
        }
        self.live.remove(&addr);

        match block.class {
            Some(class) => self.free_lists[class].push(addr),
            None => self.large_free.entry(block.reserved).or_default().push(addr),
        }
        Ok(block.reserved)
    }

    pub fn is_live(&self, addr: u32) -> bool {
        self.live.contains_key(&addr)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.live.values().map(|b| b.size as u64).sum()
    }

    /// End of the bump region; nothing at or past it has been handed out.
    pub fn high_water(&self) -> u32 {
        self.bump
    }
}
