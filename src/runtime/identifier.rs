//! Identifier table
//!
//! Interns identifier strings into [`SymbolId`]s. Compilers precompute the
//! hash of every identifier they emit, so the table accepts a caller-supplied
//! hash and never rehashes the bytes on the load path.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use hashbrown::hash_map::RawEntryMut;

/// Interned identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        SymbolId(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

/// Hash a string the way bytecode producers do
#[inline]
pub fn hash_string(s: &str) -> u32 {
    let mut h: u32 = 0;
    for b in s.bytes() {
        h = h.wrapping_mul(31).wrapping_add(b as u32);
    }
    h
}

#[inline]
fn widen(hash: u32) -> u64 {
    (hash as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Identifiers registered before any module loads, in id order
pub const PREDEFINED: &[&str] = &[
    "",
    "length",
    "prototype",
    "constructor",
    "raw",
    "exports",
    "module",
    "require",
];

/// Table of interned identifiers
pub struct IdentifierTable {
    map: HashMap<Rc<str>, SymbolId>,
    strings: Vec<Rc<str>>,
}

impl IdentifierTable {
    /// Create a table holding the predefined identifiers
    pub fn new() -> Self {
        let mut table = IdentifierTable {
            map: HashMap::with_capacity(PREDEFINED.len()),
            strings: Vec::with_capacity(PREDEFINED.len()),
        };
        for name in PREDEFINED {
            table.intern(name);
        }
        table
    }

    /// Intern `s`, hashing it here
    #[inline]
    pub fn intern(&mut self, s: &str) -> SymbolId {
        self.get_symbol_id(s, hash_string(s))
    }

    /// Intern `s` using a precomputed [`hash_string`] value
    pub fn get_symbol_id(&mut self, s: &str, hash: u32) -> SymbolId {
        debug_assert_eq!(hash, hash_string(s), "bad precomputed hash for {:?}", s);
        let next = SymbolId(self.strings.len() as u32);
        match self
            .map
            .raw_entry_mut()
            .from_hash(widen(hash), |key| &**key == s)
        {
            RawEntryMut::Occupied(entry) => *entry.get(),
            RawEntryMut::Vacant(entry) => {
                let key: Rc<str> = Rc::from(s);
                self.strings.push(Rc::clone(&key));
                entry.insert_with_hasher(widen(hash), key, next, |key| {
                    widen(hash_string(key))
                });
                next
            }
        }
    }

    /// Look up `s` without interning it
    pub fn lookup(&self, s: &str) -> Option<SymbolId> {
        self.map
            .raw_entry()
            .from_hash(widen(hash_string(s)), |key| &**key == s)
            .map(|(_, id)| *id)
    }

    /// The string behind `id`
    ///
    /// # Panics
    /// If `id` was not issued by this table.
    pub fn get_string(&self, id: SymbolId) -> &str {
        &self.strings[id.0 as usize]
    }

    /// Id of a predefined identifier
    pub fn predefined(name: &str) -> Option<SymbolId> {
        PREDEFINED
            .iter()
            .position(|p| *p == name)
            .map(|i| SymbolId(i as u32))
    }

    /// Number of interned identifiers
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Approximate bytes held by the table
    pub fn heap_size(&self) -> usize {
        let text: usize = self.strings.iter().map(|s| s.len()).sum();
        text + self.strings.capacity() * std::mem::size_of::<Rc<str>>()
            + self.map.capacity() * std::mem::size_of::<(Rc<str>, SymbolId)>()
    }
}

impl Default for IdentifierTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentifierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierTable")
            .field("len", &self.strings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash() {
        assert_eq!(hash_string("hello"), hash_string("hello"));
        assert_ne!(hash_string("hello"), hash_string("world"));
        assert_eq!(hash_string(""), 0);
    }

    #[test]
    fn test_predefined() {
        let table = IdentifierTable::new();
        assert_eq!(table.len(), PREDEFINED.len());
        let length = IdentifierTable::predefined("length").unwrap();
        assert_eq!(table.get_string(length), "length");
        assert_eq!(table.lookup("prototype"), IdentifierTable::predefined("prototype"));
        assert_eq!(IdentifierTable::predefined("nope"), None);
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = IdentifierTable::new();
        let a = table.intern("foo");
        let b = table.get_symbol_id("foo", hash_string("foo"));
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get_string(c), "bar");
        assert_eq!(table.len(), PREDEFINED.len() + 2);
    }

    #[test]
    fn test_lookup_missing() {
        let table = IdentifierTable::new();
        assert_eq!(table.lookup("missing"), None);
    }

    #[test]
    fn test_many_identifiers_survive_growth() {
        let mut table = IdentifierTable::new();
        let ids: Vec<_> = (0..500).map(|i| table.intern(&format!("id{}", i))).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(table.lookup(&format!("id{}", i)), Some(*id));
        }
    }
}
