///
/// Native Module Surface
///
/// A native module is a flat list of named exports over one contiguous
/// memory. The host never sees anything richer than this: every object,
/// string and result is built out of calls and memory reads.
///
/// Besides the per-type exports (`{Type}_{method}`), every module provides
/// the runtime exports named in `RuntimeExports`: a scratch allocator and
/// the native half of the write-buffer protocol.
///

use serde::{Deserialize, Serialize};

use crate::error::FfiError;
use crate::wire::WireValue;

pub trait NativeModule {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];

    fn has_export(&self, export: &str) -> bool;

    /// Invoke an export to completion. Scalar results come back in the
    /// primitive slot; everything else is written to memory the caller
    /// passed in.
    fn call(&mut self, export: &str, args: &[WireValue]) -> Result<Option<WireValue>, FfiError>;
}

/// Names of the exports every module carries in addition to its API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeExports {
    /// `(size, align) -> addr`, 0 on exhaustion.
    pub alloc: String,
    /// `(addr, size, align)`
    pub free: String,
    /// `(capacity) -> write`
    pub write_create: String,
    /// `(write) -> addr`, 0 if the buffer failed to grow.
    pub write_get_bytes: String,
    /// `(write) -> len`
    pub write_len: String,
    /// `(write)`
    pub write_destroy: String,
}

impl Default for RuntimeExports {
    fn default() -> Self {
        RuntimeExports {
            alloc: "tether_alloc".to_string(),
            free: "tether_free".to_string(),
            write_create: "tether_buffer_write_create".to_string(),
            write_get_bytes: "tether_buffer_write_get_bytes".to_string(),
            write_len: "tether_buffer_write_len".to_string(),
            write_destroy: "tether_buffer_write_destroy".to_string(),
        }
    }
}

impl RuntimeExports {
    pub fn all(&self) -> [&str; 6] {
        [
            self.alloc.as_str(),
            self.free.as_str(),
            self.write_create.as_str(),
            self.write_get_bytes.as_str(),
            self.write_len.as_str(),
            self.write_destroy.as_str(),
        ]
    }

    /// Every name the module lacks.
    pub fn missing_from(&self, module: &dyn NativeModule) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|name| !module.has_export(name))
            .map(str::to_string)
            .collect()
    }
}
