///
/// Ownership Registry
///
/// `OwnedObject` is the host-side face of one native handle. An owned
/// object is registered with its runtime and runs the type's destructor
/// export exactly once: on `dispose()` or, failing that, when the last
/// `Rc` to it drops. A borrowed object is a view into memory someone else
/// owns; it has no destructor and stays valid only through its edges.
///
/// After a successful `dispose()` the object still exists but its handle
/// is gone: every further use is `UseAfterDispose`. A second `dispose()`
/// does nothing.
///

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use tether_abi::{FfiError, Handle};

use crate::edges::Edges;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The host frees the handle.
    Owned,
    /// A view; something else frees the memory.
    Borrowed,
}

#[derive(Debug)]
pub struct OwnedObject {
    rt: Runtime,
    type_name: &'static str,
    handle: Handle,
    ownership: Ownership,
    disposed: Cell<bool>,
    edges: RefCell<Edges>,
}

impl OwnedObject {
    pub fn wrap(
        rt: &Runtime,
        type_name: &'static str,
        handle: Handle,
        ownership: Ownership,
        edges: Edges,
    ) -> Result<Rc<Self>, FfiError> {
        if ownership == Ownership::Owned {
            rt.register(type_name, handle)?;
        }
        tracing::debug!(type_name, %handle, ?ownership, edges = edges.len(), "wrap");
        Ok(Rc::new(OwnedObject {
            rt: rt.clone(),
            type_name,
            handle,
            ownership,
            disposed: Cell::new(false),
            edges: RefCell::new(edges),
        }))
    }

    pub fn handle(&self) -> Result<Handle, FfiError> {
        if self.disposed.get() {
            return Err(FfiError::UseAfterDispose {
                type_name: self.type_name.to_string(),
            });
        }
        Ok(self.handle)
    }

    /// Release the native object now. Safe to call more than once. If the
    /// destructor fails the object stays live and `dispose` can be retried.
    pub fn dispose(&self) -> Result<(), FfiError> {
        if self.disposed.get() {
            return Ok(());
        }
        if self.ownership == Ownership::Owned {
            self.rt.destroy(self.type_name, self.handle)?;
        }
        self.disposed.set(true);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn edges(&self) -> Ref<'_, Edges> {
        self.edges.borrow()
    }

    pub(crate) fn edges_mut(&self) -> RefMut<'_, Edges> {
        self.edges.borrow_mut()
    }
}

impl Drop for OwnedObject {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!(type_name = self.type_name, handle = %self.handle, error = %err, "finalizer failed");
        }
    }
}

/// A generated wrapper type around one `OwnedObject`.
pub trait ForeignObject: Sized {
    const TYPE_NAME: &'static str;

    fn from_object(object: Rc<OwnedObject>) -> Self;

    fn object(&self) -> &Rc<OwnedObject>;

    /// Wrap a handle returned by the module.
    fn wrap(rt: &Runtime, handle: Handle, ownership: Ownership, edges: Edges) -> Result<Self, FfiError> {
        OwnedObject::wrap(rt, Self::TYPE_NAME, handle, ownership, edges).map(Self::from_object)
    }

    fn handle(&self) -> Result<Handle, FfiError> {
        self.object().handle()
    }

    fn dispose(&self) -> Result<(), FfiError> {
        self.object().dispose()
    }

    fn runtime(&self) -> &Runtime {
        self.object().runtime()
    }
}
