///
/// tether-linear - In-Process Native Module
///
/// A `NativeModule` whose exports are Rust closures running against a
/// simulated linear memory. It carries everything a real module would:
///
/// - allocator: size-class allocator with per-class free lists
/// - memory: paged, growable byte array that owns the allocator
/// - write: native half of the write-buffer protocol
/// - module: export table with the runtime exports pre-registered
///
/// Native objects live in the memory itself; a handle is the address of
/// the object's block, and its destructor export frees that block.
///

pub mod allocator;
pub mod memory;
pub mod module;
pub mod write;

pub use allocator::{AllocError, SizeClassAllocator};
pub use memory::{LinearMemory, MAX_PAGES, MemoryError, PAGE_SIZE};
pub use module::{LinearModule, NativeCtx, NativeFn};
