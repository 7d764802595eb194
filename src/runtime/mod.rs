//! Runtime support
//!
//! This module contains the runtime types that bind bytecode to a context:
//! - Runtime modules and the code blocks they materialize
//! - Domains, the GC cells owning groups of runtime modules
//! - Identifier interning
//! - Heap objects cached by modules (hidden classes, template objects)

pub mod code_block;
pub mod domain;
pub mod hidden_class;
pub mod identifier;
pub mod object;
pub mod runtime_module;

use std::hash::Hash;

use ahash::RandomState;
use hashbrown::HashMap;

pub use code_block::CodeBlock;
pub use domain::{CjsModule, CjsModuleState, Domain, DomainRelease};
pub use hidden_class::HiddenClass;
pub use identifier::{IdentifierTable, PREDEFINED, SymbolId, hash_string};
pub use object::{ClassId, JSObject};
pub use runtime_module::{
    ModuleState, RuntimeModule, RuntimeModuleFlags, can_generate_literal_hidden_class_cache_key,
    literal_hidden_class_cache_key,
};

/// Hash map used for module side tables
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

#[inline]
pub fn fast_map_new<K: Eq + Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(RandomState::new())
}
