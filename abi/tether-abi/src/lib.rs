//!
//! tether-abi - Binary Contract
//!
//! This crate holds everything a host and a native module must agree on to
//! talk across a linear-memory boundary:
//!
//! - `WireValue` and `Handle` for the primitive call slots
//! - `NativeModule`, the flat export surface the host calls into
//! - `RuntimeExports`, the names of the allocator and write-buffer exports
//! - Little-endian view helpers over the module's memory
//! - `FieldLayout` and `EnvelopeLayout` for receive-buffer arithmetic
//! - `FfiError`, the error taxonomy shared by both sides
//!
//! Addresses are 32-bit: the module's memory is a single contiguous
//! byte array indexed from zero, and address 0 is never a valid object.
//!

pub mod error;
pub mod layout;
pub mod module;
pub mod view;
pub mod wire;

pub use error::*;
pub use layout::*;
pub use module::*;
pub use view::*;
pub use wire::*;
