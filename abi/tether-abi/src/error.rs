///
/// Boundary Error Types
///
/// All errors that can occur while marshaling a call: discriminant decoding,
/// envelope failures reported by the native side, allocation, memory access,
/// object lifetime misuse and export lookup.
///
/// Only `OperationFailed` is an ordinary, recoverable result. Every other
/// variant is a broken contract between host and module and aborts the
/// operation in progress.
///

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// A domain failure decoded from an envelope's failure branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub type_name: String,
    pub variant: String,
    pub ordinal: i32,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum FfiError {
    #[error("invalid discriminant {ordinal} for {type_name}")]
    #[diagnostic(
        code(tether::invalid_discriminant),
        help("the module and the host disagree on the enumeration's members")
    )]
    InvalidDiscriminant { type_name: String, ordinal: i32 },

    #[error("'{name}' is not an enumerator of {type_name}")]
    #[diagnostic(code(tether::unknown_variant))]
    UnknownVariant { type_name: String, name: String },

    #[error("operation failed: {0}")]
    #[diagnostic(code(tether::operation_failed))]
    OperationFailed(Failure),

    #[error("module could not allocate {size} bytes aligned to {align}")]
    #[diagnostic(
        code(tether::allocation_failure),
        help("native memory is exhausted; this is not recoverable")
    )]
    AllocationFailure { size: u32, align: u32 },

    #[error("module returned address {addr:#x}, which is not aligned to {align}")]
    #[diagnostic(code(tether::misaligned_allocation))]
    MisalignedAllocation { addr: u32, align: u32 },

    #[error("alignment {align} is not a power of two")]
    #[diagnostic(code(tether::invalid_alignment))]
    InvalidAlignment { align: u32 },

    #[error("{type_name} used after dispose")]
    #[diagnostic(
        code(tether::use_after_dispose),
        help("the object was disposed explicitly; keep it alive until its last use")
    )]
    UseAfterDispose { type_name: String },

    #[error("handle {handle:#x} is already owned by a live {type_name}")]
    #[diagnostic(code(tether::already_owned))]
    AlreadyOwned { type_name: String, handle: u32 },

    #[error("module returned a null handle for {type_name}")]
    #[diagnostic(code(tether::null_handle))]
    NullHandle { type_name: String },

    #[error("memory access out of bounds: {len} bytes at {addr:#x}, memory size is {memory_size}")]
    #[diagnostic(code(tether::out_of_bounds))]
    OutOfBounds { addr: u32, len: u32, memory_size: usize },

    #[error("invalid UTF-8 in {len} bytes at {addr:#x}")]
    #[diagnostic(
        code(tether::invalid_utf8),
        help("set `strings.utf8 = \"lossy\"` to substitute replacement characters")
    )]
    InvalidUtf8 { addr: u32, len: u32 },

    #[error("invalid UTF-16 in {len} code units at {addr:#x}")]
    #[diagnostic(code(tether::invalid_utf16))]
    InvalidUtf16 { addr: u32, len: u32 },

    #[error("module does not export '{export}'")]
    #[diagnostic(code(tether::missing_export))]
    MissingExport { export: String },

    #[error("trap in '{export}': {message}")]
    #[diagnostic(code(tether::trap))]
    Trap { export: String, message: String },

    #[error("argument {index} of '{export}' is not {expected}")]
    #[diagnostic(code(tether::bad_argument))]
    BadArgument {
        export: String,
        index: usize,
        expected: &'static str,
    },

    #[error("'{export}' did not return {expected}")]
    #[diagnostic(code(tether::bad_return))]
    BadReturn {
        export: String,
        expected: &'static str,
    },

    #[error("write buffer could not grow to hold the output")]
    #[diagnostic(code(tether::write_buffer_exhausted))]
    WriteBufferExhausted,

    #[error("module is busy; cannot call '{export}' while another call is in flight")]
    #[diagnostic(
        code(tether::module_busy),
        help("native calls never overlap; finish the current call first")
    )]
    ModuleBusy { export: String },

    #[error("{type_name} cannot keep alive an object that already keeps it alive")]
    #[diagnostic(
        code(tether::edge_cycle),
        help("lifetime edges must point from a borrowing value to what it borrows, never back")
    )]
    EdgeCycle { type_name: String },
}

impl FfiError {
    pub fn trap(export: impl Into<String>, message: impl Into<String>) -> Self {
        FfiError::Trap {
            export: export.into(),
            message: message.into(),
        }
    }

    /// Domain failures are returned to the caller; everything else is a
    /// contract violation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FfiError::OperationFailed(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            FfiError::OperationFailed(failure) => Some(failure),
            _ => None,
        }
    }
}
