//! Bytecode units
//!
//! A compiled unit exposes its string table, function headers, function
//! bodies and CommonJS tables through [`BytecodeProvider`]. Providers are
//! immutable once built and are shared between a runtime module and the
//! lazily created modules of its functions.

mod buffer;
#[cfg(feature = "lazy")]
mod lazy;
pub mod text;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub use buffer::{BytecodeBuilder, BytecodeModule};
#[cfg(feature = "lazy")]
pub use lazy::{LazyCompiler, LazyProvider};

/// Index into a unit's string table
pub type StringId = u32;

/// String table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringTableEntry {
    /// Length in bytes
    pub length: u32,
    /// Whether the string is an identifier (eagerly interned at load)
    pub is_identifier: bool,
}

/// Per-function metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionHeader {
    /// Function name, as a string id of the unit
    pub name: StringId,
    pub param_count: u32,
    pub frame_size: u32,
    pub bytecode_size: u32,
    /// Body not compiled yet
    pub lazy: bool,
}

/// Read access to a compiled unit
pub trait BytecodeProvider: fmt::Debug + Send + Sync {
    fn string_count(&self) -> u32;

    fn string_table_entry(&self, id: StringId) -> StringTableEntry;

    /// Contents of string `id`
    fn string(&self, id: StringId) -> &str;

    /// Precomputed hashes of the identifier strings, in string table order
    fn identifier_hashes(&self) -> &[u32];

    fn function_count(&self) -> u32;

    fn function_header(&self, index: u32) -> FunctionHeader;

    /// Body of function `index`; empty for lazy functions
    fn bytecode(&self, index: u32) -> &[u8];

    /// Index of the unit's top-level function
    fn global_function_index(&self) -> u32;

    /// Dynamic CommonJS modules: `(filename string id, function index)`
    fn cjs_module_table(&self) -> &[(StringId, u32)];

    /// Static CommonJS modules: `(module id, function index)`
    fn cjs_module_table_static(&self) -> &[(u32, u32)];

    /// Compiled regular expression `index`
    fn regexp_bytecode(&self, index: u32) -> &[u8];

    fn regexp_count(&self) -> u32;

    /// Trailing unit data, exposed as an epilogue
    fn epilogue(&self) -> &[u8];

    /// Whether this unit is a view on a not yet compiled function
    fn is_lazy(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitPart {
    Function(u32),
    RegExp(u32),
    Epilogue,
}

/// Bytes borrowed from a shared unit
///
/// Keeps the provider alive for as long as the bytes are in use.
#[derive(Clone)]
pub struct UnitBytes {
    provider: Arc<dyn BytecodeProvider>,
    part: UnitPart,
}

impl UnitBytes {
    pub fn function(provider: Arc<dyn BytecodeProvider>, index: u32) -> Self {
        UnitBytes {
            provider,
            part: UnitPart::Function(index),
        }
    }

    pub fn regexp(provider: Arc<dyn BytecodeProvider>, index: u32) -> Self {
        UnitBytes {
            provider,
            part: UnitPart::RegExp(index),
        }
    }

    pub fn epilogue(provider: Arc<dyn BytecodeProvider>) -> Self {
        UnitBytes {
            provider,
            part: UnitPart::Epilogue,
        }
    }
}

impl Deref for UnitBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.part {
            UnitPart::Function(index) => self.provider.bytecode(index),
            UnitPart::RegExp(index) => self.provider.regexp_bytecode(index),
            UnitPart::Epilogue => self.provider.epilogue(),
        }
    }
}

impl fmt::Debug for UnitBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitBytes({:?}, {} bytes)", self.part, self.len())
    }
}
