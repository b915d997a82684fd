///
/// Runtime Handle
///
/// `Runtime` is the host's single point of contact with one native module
/// instance. It is a cheap, clonable handle: every scratch region, write
/// buffer and owned object keeps one so that it can release itself.
///
/// ## Call discipline
///
/// Native calls never overlap. The module sits in a `RefCell`; a call made
/// while another call or a memory borrow is in progress is `ModuleBusy`.
/// Releases are the exception: a region or object dropped while the module
/// is borrowed queues its release, and the queue is flushed as soon as the
/// borrow ends. Nothing in the queue is ever dropped on the floor.
///
/// ## Ownership registry
///
/// The runtime records every handle currently owned by a live host object.
/// A handle can be registered once; its destructor export runs only when
/// the registration is removed, so a second destroy is refused.
///

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tether_abi::{FfiError, Handle, NativeModule, WireValue};

use crate::config::RuntimeConfig;
use crate::memory::MemoryStats;

enum Release {
    Free { addr: u32, size: u32, align: u32 },
    Destroy { export: String, handle: Handle },
    WriteBuffer { write: u32 },
}

struct RuntimeInner {
    module: RefCell<Box<dyn NativeModule>>,
    config: RuntimeConfig,
    owned: RefCell<HashMap<Handle, &'static str>>,
    deferred: RefCell<Vec<Release>>,
    stats: Cell<MemoryStats>,
}

#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("stats", &self.stats())
            .field("live_objects", &self.live_objects())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(module: impl NativeModule + 'static) -> Result<Self, FfiError> {
        Runtime::with_config(module, RuntimeConfig::default())
    }

    /// Bind to `module`, checking that it carries every runtime export the
    /// config names.
    pub fn with_config(module: impl NativeModule + 'static, config: RuntimeConfig) -> Result<Self, FfiError> {
        if let Some(export) = config.exports.missing_from(&module).into_iter().next() {
            return Err(FfiError::MissingExport { export });
        }
        tracing::debug!(module = module.name(), "runtime bound");
        Ok(Runtime(Rc::new(RuntimeInner {
            module: RefCell::new(Box::new(module)),
            config,
            owned: RefCell::new(HashMap::new()),
            deferred: RefCell::new(Vec::new()),
            stats: Cell::new(MemoryStats::default()),
        })))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    /// Full export name of `{type_name}_{method}` after renaming.
    pub fn export_name(&self, type_name: &str, method: &str) -> String {
        self.0.config.abi.export_name(type_name, method)
    }

    pub fn same(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn call(&self, export: &str, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
        let result = self.call_raw(export, args);
        self.flush_deferred();
        result
    }

    fn call_raw(&self, export: &str, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
        let mut module = self.0.module.try_borrow_mut().map_err(|_| FfiError::ModuleBusy {
            export: export.to_string(),
        })?;
        tracing::trace!(export, argc = args.len(), "call");
        module.call(export, args)
    }

    pub fn call_i32(&self, export: &str, args: &[WireValue]) -> Result<i32, FfiError> {
        self.call(export, args)?
            .and_then(WireValue::as_i32)
            .ok_or_else(|| bad_return(export, "i32"))
    }

    pub fn call_u32(&self, export: &str, args: &[WireValue]) -> Result<u32, FfiError> {
        self.call_i32(export, args).map(|v| v as u32)
    }

    pub fn call_bool(&self, export: &str, args: &[WireValue]) -> Result<bool, FfiError> {
        self.call_i32(export, args).map(|v| v != 0)
    }

    pub fn call_i64(&self, export: &str, args: &[WireValue]) -> Result<i64, FfiError> {
        self.call(export, args)?
            .and_then(WireValue::as_i64)
            .ok_or_else(|| bad_return(export, "i64"))
    }

    pub fn call_f64(&self, export: &str, args: &[WireValue]) -> Result<f64, FfiError> {
        self.call(export, args)?
            .and_then(WireValue::as_f64)
            .ok_or_else(|| bad_return(export, "f64"))
    }

    /// Call an export that returns a new object. A null address is
    /// `NullHandle`.
    pub fn call_handle(&self, export: &str, args: &[WireValue], type_name: &str) -> Result<Handle, FfiError> {
        let addr = self.call_u32(export, args)?;
        Handle::new(addr).ok_or_else(|| FfiError::NullHandle {
            type_name: type_name.to_string(),
        })
    }

    /// Call an export whose result, if any, is ignored.
    pub fn call_void(&self, export: &str, args: &[WireValue]) -> Result<(), FfiError> {
        self.call(export, args).map(|_| ())
    }

    pub fn with_memory<R>(&self, f: impl FnOnce(&[u8]) -> Result<R, FfiError>) -> Result<R, FfiError> {
        let result = {
            let module = self.0.module.try_borrow_mut().map_err(|_| FfiError::ModuleBusy {
                export: "<memory>".to_string(),
            })?;
            f(module.memory())
        };
        self.flush_deferred();
        result
    }

    pub fn with_memory_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> Result<R, FfiError>) -> Result<R, FfiError> {
        let result = {
            let mut module = self.0.module.try_borrow_mut().map_err(|_| FfiError::ModuleBusy {
                export: "<memory>".to_string(),
            })?;
            f(module.memory_mut())
        };
        self.flush_deferred();
        result
    }

    pub fn stats(&self) -> MemoryStats {
        self.0.stats.get()
    }

    pub(crate) fn update_stats(&self, f: impl FnOnce(&mut MemoryStats)) {
        let mut stats = self.0.stats.get();
        f(&mut stats);
        self.0.stats.set(stats);
    }

    /// Number of handles currently owned by live host objects.
    pub fn live_objects(&self) -> usize {
        self.0.owned.borrow().len()
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.0.owned.borrow().contains_key(&handle)
    }

    pub(crate) fn register(&self, type_name: &'static str, handle: Handle) -> Result<(), FfiError> {
        let mut owned = self.0.owned.borrow_mut();
        if owned.contains_key(&handle) {
            return Err(FfiError::AlreadyOwned {
                type_name: type_name.to_string(),
                handle: handle.addr(),
            });
        }
        owned.insert(handle, type_name);
        Ok(())
    }

    /// Run the destructor of an owned handle. Returns `false` if the handle
    /// was not registered, in which case nothing is called. If the
    /// destructor fails the handle stays registered.
    pub(crate) fn destroy(&self, type_name: &str, handle: Handle) -> Result<bool, FfiError> {
        let Some(owner) = self.0.owned.borrow_mut().remove(&handle) else {
            tracing::warn!(type_name, %handle, "destroy of unregistered handle refused");
            return Ok(false);
        };
        let export = self.0.config.abi.destructor_name(type_name);
        tracing::debug!(type_name, %handle, "destroy");
        if let Err(err) = self.release(Release::Destroy { export, handle }) {
            self.0.owned.borrow_mut().insert(handle, owner);
            return Err(err);
        }
        Ok(true)
    }

    pub(crate) fn destroy_write_buffer(&self, write: u32) -> Result<(), FfiError> {
        self.release(Release::WriteBuffer { write })
    }

    pub(crate) fn release_region(&self, addr: u32, size: u32, align: u32) -> Result<(), FfiError> {
        self.release(Release::Free { addr, size, align })
    }

    /// Perform a release now, or queue it if the module is borrowed.
    fn release(&self, release: Release) -> Result<(), FfiError> {
        if self.0.module.try_borrow_mut().is_err() {
            tracing::warn!("module busy, release deferred");
            self.0.deferred.borrow_mut().push(release);
            self.update_stats(|s| s.deferred += 1);
            return Ok(());
        }
        self.perform(release)
    }

    fn perform(&self, release: Release) -> Result<(), FfiError> {
        match release {
            Release::Free { addr, size, align } => {
                let export = &self.0.config.exports.free;
                self.call_raw(export, &[WireValue::ptr(addr), size.into(), align.into()])?;
                tracing::trace!(addr, size, align, "free");
                self.update_stats(|s| {
                    s.frees += 1;
                    s.live_regions = s.live_regions.saturating_sub(1);
                    s.live_bytes = s.live_bytes.saturating_sub(size as u64);
                });
            }
            Release::Destroy { export, handle } => {
                self.call_raw(&export, &[handle.into()])?;
                self.update_stats(|s| s.destroyed += 1);
            }
            Release::WriteBuffer { write } => {
                let export = &self.0.config.exports.write_destroy;
                self.call_raw(export, &[WireValue::ptr(write)])?;
            }
        }
        Ok(())
    }

    /// Run queued releases. Failures are logged; the queue always drains.
    pub fn flush_deferred(&self) {
        loop {
            if self.0.module.try_borrow_mut().is_err() {
                return;
            }
            let Some(release) = self.0.deferred.borrow_mut().pop() else {
                return;
            };
            if let Err(err) = self.perform(release) {
                tracing::warn!(error = %err, "deferred release failed");
            }
        }
    }

    pub fn pending_releases(&self) -> usize {
        self.0.deferred.borrow().len()
    }
}

fn bad_return(export: &str, expected: &'static str) -> FfiError {
    FfiError::BadReturn {
        export: export.to_string(),
        expected,
    }
}
