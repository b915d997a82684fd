///
/// Linear Module
///
/// Export table plus memory. API exports are registered as closures; the
/// runtime exports (allocator and write buffers) are answered directly by
/// the module under the names in its `RuntimeExports`. A registered closure
/// takes precedence over a runtime export of the same name.
///
/// A closure that returns `Err` models a trap: the call is abandoned and
/// the error surfaces to the host unchanged.
///

use indexmap::IndexMap;
use tether_abi::{ArgsExt, FfiError, NativeModule, RuntimeExports, WireValue, read_bytes};

use crate::memory::{LinearMemory, MemoryError};
use crate::write;

pub type NativeFn =
    Box<dyn Fn(&mut NativeCtx<'_>, &[WireValue]) -> Result<Option<WireValue>, FfiError>>;

/// What an export body sees while it runs.
pub struct NativeCtx<'a> {
    export: &'a str,
    memory: &'a mut LinearMemory,
}

impl<'a> NativeCtx<'a> {
    pub fn export(&self) -> &str {
        self.export
    }

    pub fn memory(&mut self) -> &mut LinearMemory {
        self.memory
    }

    pub fn bytes(&self) -> &[u8] {
        self.memory.bytes()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.memory.bytes_mut()
    }

    pub fn alloc(&mut self, size: u32, align: u32) -> Result<u32, FfiError> {
        self.memory
            .alloc(size, align)
            .ok_or(FfiError::AllocationFailure { size, align })
    }

    pub fn free(&mut self, addr: u32, size: u32, align: u32) -> Result<(), FfiError> {
        self.memory
            .free(addr, size, align)
            .map_err(|m| FfiError::trap(self.export, m))
    }

    /// Borrow a UTF-8 string the host placed in memory.
    pub fn read_str8(&self, addr: u32, len: u32) -> Result<&str, FfiError> {
        let bytes = read_bytes(self.memory.bytes(), addr, len)?;
        std::str::from_utf8(bytes).map_err(|_| FfiError::InvalidUtf8 { addr, len })
    }

    /// Append to a host-supplied write buffer.
    pub fn write_str(&mut self, write: u32, s: &str) -> Result<(), FfiError> {
        write::append(self.memory, write, s.as_bytes())
    }
}

pub struct LinearModule {
    name: String,
    memory: LinearMemory,
    exports: IndexMap<String, NativeFn>,
    runtime_exports: RuntimeExports,
}

impl LinearModule {
    pub fn new(name: impl Into<String>) -> Self {
        LinearModule {
            name: name.into(),
            memory: LinearMemory::default(),
            exports: IndexMap::new(),
            runtime_exports: RuntimeExports::default(),
        }
    }

    pub fn with_runtime_exports(mut self, names: RuntimeExports) -> Self {
        self.runtime_exports = names;
        self
    }

    pub fn with_memory(mut self, initial_pages: u32, max_pages: u32) -> Result<Self, MemoryError> {
        self.memory = LinearMemory::new(initial_pages, max_pages)?;
        Ok(self)
    }

    /// Register an API export, replacing any previous body of that name.
    pub fn export<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&mut NativeCtx<'_>, &[WireValue]) -> Result<Option<WireValue>, FfiError> + 'static,
    {
        self.exports.insert(name.into(), Box::new(body));
        self
    }

    pub fn remove_export(&mut self, name: &str) -> Option<NativeFn> {
        self.exports.shift_remove(name)
    }

    pub fn linear_memory(&self) -> &LinearMemory {
        &self.memory
    }

    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    fn call_runtime(&mut self, export: &str, args: &[WireValue]) -> Option<Result<Option<WireValue>, FfiError>> {
        let names = &self.runtime_exports;
        let mem = &mut self.memory;

        let result = if export == names.alloc {
            args.u32_at(export, 0).and_then(|size| {
                let align = args.u32_at(export, 1)?;
                Ok(Some(WireValue::ptr(mem.alloc(size, align).unwrap_or(0))))
            })
        } else if export == names.free {
            (|| -> Result<Option<WireValue>, FfiError> {
                let addr = args.u32_at(export, 0)?;
                let size = args.u32_at(export, 1)?;
                let align = args.u32_at(export, 2)?;
                mem.free(addr, size, align).map_err(|m| FfiError::trap(export, m))?;
                Ok(None)
            })()
        } else if export == names.write_create {
            args.u32_at(export, 0)
                .map(|cap| Some(WireValue::ptr(write::create(mem, cap).unwrap_or(0))))
        } else if export == names.write_get_bytes {
            args.u32_at(export, 0)
                .and_then(|w| write::bytes_addr(mem, w))
                .map(|addr| Some(WireValue::ptr(addr)))
        } else if export == names.write_len {
            args.u32_at(export, 0)
                .and_then(|w| write::len(mem, w))
                .map(|len| Some(WireValue::ptr(len)))
        } else if export == names.write_destroy {
            args.u32_at(export, 0)
                .and_then(|w| write::destroy(mem, w))
                .map(|()| None)
        } else {
            return None;
        };
        Some(result)
    }
}

impl NativeModule for LinearModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn memory(&self) -> &[u8] {
        self.memory.bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.bytes_mut()
    }

    fn has_export(&self, export: &str) -> bool {
        self.exports.contains_key(export)
            || self.runtime_exports.all().iter().any(|name| *name == export)
    }

    fn call(&mut self, export: &str, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
        tracing::trace!(module = %self.name, export, argc = args.len(), "native call");

        let Some(body) = self.exports.get(export) else {
            return self.call_runtime(export, args).unwrap_or_else(|| {
                Err(FfiError::MissingExport {
                    export: export.to_string(),
                })
            });
        };
        let mut ctx = NativeCtx {
            export,
            memory: &mut self.memory,
        };
        let result = body(&mut ctx, args);
        if let Err(err) = &result {
            tracing::debug!(module = %self.name, export, error = %err, "native export failed");
        }
        result
    }
}
