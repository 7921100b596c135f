//! Ordered listener collections.
//!
//! Listeners are called in registration order. A failing listener is logged
//! and skipped; it never stops delivery to the ones after it.

use crate::error::ListenerError;
use crate::node::NodeHandle;
use crate::value::FieldValue;

/// Identifies a registered listener for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receives field change notifications from one node
pub trait FieldListener {
    fn field_changed(
        &mut self,
        node: NodeHandle,
        field: usize,
        value: &FieldValue,
    ) -> Result<(), ListenerError>;
}

/// Listeners of one kind, in registration order
pub struct ListenerList<L: ?Sized> {
    entries: Vec<(ListenerId, Box<L>)>,
    next_id: u64,
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerList<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Box<L>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Detach a listener, returning it if it was registered
    pub fn remove(&mut self, id: ListenerId) -> Option<Box<L>> {
        let pos = self.entries.iter().position(|(i, _)| *i == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Call every listener; returns how many failed.
    pub fn notify<F>(&mut self, event: &str, mut call: F) -> usize
    where
        F: FnMut(&mut L) -> Result<(), ListenerError>,
    {
        let mut failures = 0;
        for (id, listener) in self.entries.iter_mut() {
            if let Err(err) = call(listener.as_mut()) {
                failures += 1;
                tracing::warn!(?id, event, %err, "listener failed");
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    trait Counter {
        fn hit(&mut self, n: u32) -> Result<(), ListenerError>;
    }

    struct Recording(Rc<RefCell<Vec<u32>>>, u32);

    impl Counter for Recording {
        fn hit(&mut self, n: u32) -> Result<(), ListenerError> {
            self.0.borrow_mut().push(self.1 * 100 + n);
            Ok(())
        }
    }

    struct Failing;

    impl Counter for Failing {
        fn hit(&mut self, _: u32) -> Result<(), ListenerError> {
            Err(ListenerError::Failed("boom".into()))
        }
    }

    #[test]
    fn test_order_and_isolation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list: ListenerList<dyn Counter> = ListenerList::new();
        list.add(Box::new(Recording(log.clone(), 1)));
        list.add(Box::new(Failing));
        list.add(Box::new(Recording(log.clone(), 2)));

        let failures = list.notify("hit", |l| l.hit(7));
        assert_eq!(failures, 1);
        assert_eq!(*log.borrow(), vec![107, 207]);
    }

    #[test]
    fn test_remove() {
        let mut list: ListenerList<dyn Counter> = ListenerList::new();
        let id = list.add(Box::new(Failing));
        assert!(list.remove(id).is_some());
        assert!(list.remove(id).is_none());
        assert!(list.is_empty());
    }
}
