//! Hidden classes
//!
//! Object shape descriptors. A class adds its own property keys on top of
//! an optional parent; runtime modules cache the classes built for object
//! literals so that repeated evaluation shares one shape.

use smallvec::SmallVec;

use super::identifier::SymbolId;
use crate::gc::{Gc, SlotAcceptor};

/// Shape of an object
#[derive(Debug, Clone)]
pub struct HiddenClass {
    properties: SmallVec<[SymbolId; 8]>,
    parent: Option<Gc<HiddenClass>>,
    /// Properties inherited from the parent chain
    inherited: u32,
}

impl HiddenClass {
    /// A class adding `properties` on top of `parent`
    ///
    /// `inherited` is taken as zero; use [`HiddenClass::derive`] when the
    /// parent's property count is known.
    pub fn new(parent: Option<Gc<HiddenClass>>, properties: &[SymbolId]) -> Self {
        HiddenClass {
            properties: SmallVec::from_slice(properties),
            parent,
            inherited: 0,
        }
    }

    /// A child of `parent` (whose own shape is `parent_class`) adding `properties`
    pub fn derive(
        parent: Gc<HiddenClass>,
        parent_class: &HiddenClass,
        properties: &[SymbolId],
    ) -> Self {
        HiddenClass {
            properties: SmallVec::from_slice(properties),
            parent: Some(parent),
            inherited: parent_class.num_properties(),
        }
    }

    /// Total number of properties, inherited ones included
    #[inline]
    pub fn num_properties(&self) -> u32 {
        self.inherited + self.properties.len() as u32
    }

    /// Slot of an own (non-inherited) property
    pub fn find_property(&self, key: SymbolId) -> Option<u32> {
        self.properties
            .iter()
            .position(|p| *p == key)
            .map(|i| self.inherited + i as u32)
    }

    /// Own property keys in slot order
    #[inline]
    pub fn properties(&self) -> &[SymbolId] {
        &self.properties
    }

    #[inline]
    pub fn parent(&self) -> Option<Gc<HiddenClass>> {
        self.parent
    }

    /// Out-of-line bytes
    pub fn heap_size(&self) -> usize {
        if self.properties.spilled() {
            self.properties.capacity() * std::mem::size_of::<SymbolId>()
        } else {
            0
        }
    }

    pub(crate) fn mark_slots(&mut self, acceptor: &mut dyn SlotAcceptor) {
        if let Some(parent) = &mut self.parent {
            parent.accept(acceptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Heap;

    #[test]
    fn test_own_properties() {
        let keys = [SymbolId::new(10), SymbolId::new(11)];
        let class = HiddenClass::new(None, &keys);
        assert_eq!(class.num_properties(), 2);
        assert_eq!(class.find_property(SymbolId::new(11)), Some(1));
        assert_eq!(class.find_property(SymbolId::new(12)), None);
        assert!(class.parent().is_none());
        assert_eq!(class.heap_size(), 0);
    }

    #[test]
    fn test_derived_class_offsets() {
        let mut heap = Heap::new(4);
        let base = HiddenClass::new(None, &[SymbolId::new(1), SymbolId::new(2)]);
        let child = HiddenClass::derive(heap.alloc(base.clone()), &base, &[SymbolId::new(3)]);
        assert_eq!(child.num_properties(), 3);
        assert_eq!(child.find_property(SymbolId::new(3)), Some(2));
        assert!(child.parent().is_some());
    }

    #[test]
    fn test_large_class_spills() {
        let keys: Vec<_> = (0..20).map(SymbolId::new).collect();
        let class = HiddenClass::new(None, &keys);
        assert!(class.heap_size() >= 20 * std::mem::size_of::<SymbolId>());
    }
}
