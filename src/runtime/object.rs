//! JavaScript object representation
//!
//! Plain objects carry a hidden class and one value slot per property.
//! Arrays additionally hold dense elements. Template objects are frozen
//! arrays whose `raw` property points at a second frozen array.

use super::hidden_class::HiddenClass;
use crate::gc::{Gc, SlotAcceptor};
use crate::value::Value;

/// JavaScript class IDs
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassId {
    /// Plain object
    Object = 0,
    /// Array
    Array = 1,
}

/// A heap-allocated JavaScript object
#[derive(Debug, Clone)]
pub struct JSObject {
    class_id: ClassId,
    hidden_class: Option<Gc<HiddenClass>>,
    /// Named property values, indexed by hidden class slot
    slots: Vec<Value>,
    /// Dense array elements
    elements: Vec<Value>,
    frozen: bool,
}

impl JSObject {
    /// A plain object of shape `class` with property values `slots`
    pub fn with_class(class: Gc<HiddenClass>, slots: Vec<Value>) -> Self {
        JSObject {
            class_id: ClassId::Object,
            hidden_class: Some(class),
            slots,
            elements: Vec::new(),
            frozen: false,
        }
    }

    /// An array holding `elements`
    pub fn new_array(elements: Vec<Value>) -> Self {
        JSObject {
            class_id: ClassId::Array,
            hidden_class: None,
            slots: Vec::new(),
            elements,
            frozen: false,
        }
    }

    #[inline]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.class_id == ClassId::Array
    }

    #[inline]
    pub fn hidden_class(&self) -> Option<Gc<HiddenClass>> {
        self.hidden_class
    }

    /// Give this object a shape, e.g. an array gaining a `raw` property
    pub fn set_hidden_class(&mut self, class: Gc<HiddenClass>, slots: Vec<Value>) {
        debug_assert!(!self.frozen, "reshaping a frozen object");
        self.hidden_class = Some(class);
        self.slots = slots;
    }

    /// Array length (element count)
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element at `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.get(index).copied()
    }

    /// Value of the named property at hidden class slot `slot`
    #[inline]
    pub fn get_slot(&self, slot: u32) -> Option<Value> {
        self.slots.get(slot as usize).copied()
    }

    /// Append an element; ignored once frozen
    pub fn push(&mut self, value: Value) -> bool {
        if self.frozen {
            return false;
        }
        self.elements.push(value);
        true
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Out-of-line bytes
    pub fn heap_size(&self) -> usize {
        (self.slots.capacity() + self.elements.capacity()) * std::mem::size_of::<Value>()
    }

    pub(crate) fn mark_slots(&mut self, acceptor: &mut dyn SlotAcceptor) {
        if let Some(class) = &mut self.hidden_class {
            class.accept(acceptor);
        }
        for value in self.slots.iter_mut().chain(self.elements.iter_mut()) {
            value.accept(acceptor);
        }
    }
}
