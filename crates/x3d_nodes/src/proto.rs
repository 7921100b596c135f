//! Proto instance indirection.
//!
//! A node field can hold either a concrete node or a proto instance whose
//! implementation is another [`NodeRef`]. Extern protos start without an
//! implementation and are completed later, so resolution is lazy and done
//! on every lookup.

use crate::node::{NodeHandle, ProtoHandle};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// Reference held by an SFNode/MFNode field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Concrete(NodeHandle),
    Proto(ProtoHandle),
}

impl From<NodeHandle> for NodeRef {
    fn from(h: NodeHandle) -> Self {
        NodeRef::Concrete(h)
    }
}

impl From<ProtoHandle> for NodeRef {
    fn from(h: ProtoHandle) -> Self {
        NodeRef::Proto(h)
    }
}

/// A proto or extern-proto instance
#[derive(Clone, Debug)]
pub struct ProtoInstance {
    /// Declared proto name
    pub name: String,
    /// First node of the proto body, `None` until an extern proto loads
    implementation: Option<NodeRef>,
}

impl ProtoInstance {
    pub fn new(name: impl Into<String>, implementation: Option<NodeRef>) -> Self {
        Self {
            name: name.into(),
            implementation,
        }
    }

    pub fn implementation(&self) -> Option<NodeRef> {
        self.implementation
    }

    pub fn is_complete(&self) -> bool {
        self.implementation.is_some()
    }

    pub(crate) fn set_implementation(&mut self, implementation: NodeRef) {
        self.implementation = Some(implementation);
    }
}

/// Walk the proto chain until a concrete node or nothing.
///
/// A chain that loops back on itself resolves to nothing.
pub fn resolve(protos: &SlotMap<ProtoHandle, ProtoInstance>, start: NodeRef) -> Option<NodeHandle> {
    let mut current = start;
    for _ in 0..=protos.len() {
        match current {
            NodeRef::Concrete(h) => return Some(h),
            NodeRef::Proto(p) => current = protos.get(p)?.implementation?,
        }
    }
    tracing::warn!("proto chain does not terminate");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_chain() {
        let mut nodes: SlotMap<NodeHandle, ()> = SlotMap::with_key();
        let real = nodes.insert(());
        let mut protos: SlotMap<ProtoHandle, ProtoInstance> = SlotMap::with_key();
        let inner = protos.insert(ProtoInstance::new("Inner", Some(real.into())));
        let outer = protos.insert(ProtoInstance::new("Outer", Some(inner.into())));

        assert_eq!(resolve(&protos, outer.into()), Some(real));
        assert_eq!(resolve(&protos, real.into()), Some(real));
    }

    #[test]
    fn test_incomplete_extern_proto() {
        let mut protos: SlotMap<ProtoHandle, ProtoInstance> = SlotMap::with_key();
        let ext = protos.insert(ProtoInstance::new("Remote", None));
        assert_eq!(resolve(&protos, ext.into()), None);
    }

    #[test]
    fn test_cyclic_chain() {
        let mut protos: SlotMap<ProtoHandle, ProtoInstance> = SlotMap::with_key();
        let a = protos.insert(ProtoInstance::new("A", None));
        let b = protos.insert(ProtoInstance::new("B", Some(a.into())));
        protos[a].set_implementation(b.into());
        assert_eq!(resolve(&protos, a.into()), None);
    }
}
