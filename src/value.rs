//! JavaScript value representation
//!
//! Values stored in heap objects (template arrays, literal elements).
//! Strings are interned and carried as symbol ids; objects are handles into
//! the GC heap and count as strong slots during collection.

use std::fmt;

use crate::gc::{CellRef, SlotAcceptor};
use crate::runtime::SymbolId;

/// A JavaScript value
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Interned string
    String(SymbolId),
    /// Heap object
    Object(CellRef),
}

impl Value {
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Value::String(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<CellRef> {
        match self {
            Value::Object(cell) => Some(*cell),
            _ => None,
        }
    }

    /// Hand the object slot, if any, to the collector
    #[inline]
    pub fn accept(&mut self, acceptor: &mut dyn SlotAcceptor) {
        if let Value::Object(cell) = self {
            acceptor.accept(cell);
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<SymbolId> for Value {
    fn from(id: SymbolId) -> Self {
        Value::String(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(id) => write!(f, "[string {}]", id.as_u32()),
            Value::Object(cell) => write!(f, "[object {:?}]", cell),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(Value::default().is_undefined());
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).to_bool(), Some(true));
        assert_eq!(Value::from(2.5).to_number(), Some(2.5));
        assert_eq!(Value::Null.as_object(), None);
        assert_eq!(Value::from(SymbolId::new(4)).as_symbol(), Some(SymbolId::new(4)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_accept_rewrites_object_slot() {
        struct Bump;
        impl SlotAcceptor for Bump {
            fn accept(&mut self, slot: &mut CellRef) {
                *slot = CellRef::new(slot.index() + 1, slot.generation());
            }
        }

        let mut value = Value::Object(CellRef::new(1, 0));
        value.accept(&mut Bump);
        assert_eq!(value, Value::Object(CellRef::new(2, 0)));

        let mut number = Value::Number(1.0);
        number.accept(&mut Bump);
        assert_eq!(number, Value::Number(1.0));
    }
}
