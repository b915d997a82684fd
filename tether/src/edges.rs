///
/// Lifetime Edges
///
/// A value that borrows memory from its inputs holds strong references to
/// those inputs. Edges never decide deallocation: an anchor only delays the
/// drop of what it points at.
///
/// Edges are transitive. Pushing an object also pushes everything that
/// object already borrows from, so a chain of borrows survives the loss of
/// any intermediate object.
///

use std::rc::Rc;

use smallvec::SmallVec;
use tether_abi::FfiError;

use crate::memory::ScratchRegion;
use crate::ownership::{ForeignObject, OwnedObject};

#[derive(Debug, Clone)]
pub enum Anchor {
    Object(Rc<OwnedObject>),
    /// A host-encoded buffer the module keeps reading after the call.
    Buffer(Rc<ScratchRegion>),
}

impl Anchor {
    pub fn same(&self, other: &Anchor) -> bool {
        match (self, other) {
            (Anchor::Object(a), Anchor::Object(b)) => Rc::ptr_eq(a, b),
            (Anchor::Buffer(a), Anchor::Buffer(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether `target` is this anchor or is kept alive by it, directly or
    /// through any chain of edges.
    pub fn reaches(&self, target: &OwnedObject) -> bool {
        let Anchor::Object(start) = self else {
            return false;
        };
        let mut stack = vec![start.clone()];
        let mut seen: Vec<*const OwnedObject> = Vec::new();
        while let Some(object) = stack.pop() {
            if std::ptr::eq(&*object, target) {
                return true;
            }
            let ptr = Rc::as_ptr(&object);
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            for anchor in object.edges().iter() {
                if let Anchor::Object(next) = anchor {
                    stack.push(next.clone());
                }
            }
        }
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct Edges {
    anchors: SmallVec<[Anchor; 2]>,
}

impl Edges {
    pub fn new() -> Self {
        Edges::default()
    }

    pub fn of(sources: &[&dyn Anchored]) -> Self {
        let mut edges = Edges::new();
        for source in sources {
            edges.push(source.anchor());
        }
        edges
    }

    pub fn push(&mut self, anchor: Anchor) {
        if let Anchor::Object(object) = &anchor {
            let inherited = object.edges();
            for inner in inherited.iter() {
                self.insert(inner.clone());
            }
        }
        self.insert(anchor);
    }

    fn insert(&mut self, anchor: Anchor) {
        if !self.contains(&anchor) {
            self.anchors.push(anchor);
        }
    }

    pub fn extend(&mut self, other: &Edges) {
        for anchor in other.iter() {
            self.push(anchor.clone());
        }
    }

    pub fn contains(&self, anchor: &Anchor) -> bool {
        self.anchors.iter().any(|a| a.same(anchor))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }
}

/// Anything a result can borrow from.
pub trait Anchored {
    fn anchor(&self) -> Anchor;
}

impl Anchored for Anchor {
    fn anchor(&self) -> Anchor {
        self.clone()
    }
}

impl Anchored for Rc<OwnedObject> {
    fn anchor(&self) -> Anchor {
        Anchor::Object(self.clone())
    }
}

impl<T: ForeignObject> Anchored for T {
    fn anchor(&self) -> Anchor {
        Anchor::Object(self.object().clone())
    }
}

/// Make `result` keep every source, and everything each source keeps,
/// alive for as long as `result` is reachable.
///
/// A source that is `result` itself, or that already keeps `result` alive,
/// would close a reference cycle that is never freed; it is `EdgeCycle` and
/// nothing is attached.
pub fn attach(result: &OwnedObject, sources: &[&dyn Anchored]) -> Result<(), FfiError> {
    let mut added = Edges::new();
    for source in sources {
        let anchor = source.anchor();
        if anchor.reaches(result) {
            return Err(FfiError::EdgeCycle {
                type_name: result.type_name().to_string(),
            });
        }
        added.push(anchor);
    }
    let mut edges = result.edges_mut();
    for anchor in added.anchors {
        edges.insert(anchor);
    }
    Ok(())
}
