//! In-memory bytecode units
//!
//! [`BytecodeBuilder`] assembles a unit the way a compiler backend would;
//! the result is an immutable [`BytecodeModule`].

use std::sync::Arc;

use super::{BytecodeProvider, FunctionHeader, StringId, StringTableEntry};
use crate::runtime::hash_string;

#[derive(Debug, Clone, Default)]
struct Function {
    header: FunctionHeader,
    body: Vec<u8>,
}

/// A complete compiled unit held in memory
///
/// The default value is a valid unit with no strings and no functions.
#[derive(Debug, Clone, Default)]
pub struct BytecodeModule {
    strings: Vec<String>,
    entries: Vec<StringTableEntry>,
    identifier_hashes: Vec<u32>,
    functions: Vec<Function>,
    global_function: u32,
    cjs_modules: Vec<(StringId, u32)>,
    cjs_modules_static: Vec<(u32, u32)>,
    regexps: Vec<Vec<u8>>,
    epilogue: Vec<u8>,
}

impl BytecodeModule {
    /// Share this unit as a provider
    pub fn into_provider(self) -> Arc<dyn BytecodeProvider> {
        Arc::new(self)
    }
}

impl BytecodeProvider for BytecodeModule {
    fn string_count(&self) -> u32 {
        self.strings.len() as u32
    }

    fn string_table_entry(&self, id: StringId) -> StringTableEntry {
        self.entries[id as usize]
    }

    fn string(&self, id: StringId) -> &str {
        &self.strings[id as usize]
    }

    fn identifier_hashes(&self) -> &[u32] {
        &self.identifier_hashes
    }

    fn function_count(&self) -> u32 {
        self.functions.len() as u32
    }

    fn function_header(&self, index: u32) -> FunctionHeader {
        self.functions[index as usize].header
    }

    fn bytecode(&self, index: u32) -> &[u8] {
        &self.functions[index as usize].body
    }

    fn global_function_index(&self) -> u32 {
        self.global_function
    }

    fn cjs_module_table(&self) -> &[(StringId, u32)] {
        &self.cjs_modules
    }

    fn cjs_module_table_static(&self) -> &[(u32, u32)] {
        &self.cjs_modules_static
    }

    fn regexp_bytecode(&self, index: u32) -> &[u8] {
        &self.regexps[index as usize]
    }

    fn regexp_count(&self) -> u32 {
        self.regexps.len() as u32
    }

    fn epilogue(&self) -> &[u8] {
        &self.epilogue
    }
}

/// Incremental constructor for [`BytecodeModule`]
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    module: BytecodeModule,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_string(&mut self, s: &str, is_identifier: bool) -> StringId {
        let id = self.module.strings.len() as StringId;
        self.module.strings.push(s.to_owned());
        self.module.entries.push(StringTableEntry {
            length: s.len() as u32,
            is_identifier,
        });
        if is_identifier {
            self.module.identifier_hashes.push(hash_string(s));
        }
        id
    }

    /// Add a plain string
    pub fn add_string(&mut self, s: &str) -> StringId {
        self.push_string(s, false)
    }

    /// Add an identifier; its hash is precomputed here
    pub fn add_identifier(&mut self, s: &str) -> StringId {
        self.push_string(s, true)
    }

    /// Add a compiled function and return its index
    pub fn add_function(
        &mut self,
        name: StringId,
        param_count: u32,
        frame_size: u32,
        body: Vec<u8>,
    ) -> u32 {
        let index = self.module.functions.len() as u32;
        self.module.functions.push(Function {
            header: FunctionHeader {
                name,
                param_count,
                frame_size,
                bytecode_size: body.len() as u32,
                lazy: false,
            },
            body,
        });
        index
    }

    /// Add a function whose body will be compiled on first use
    pub fn add_lazy_function(&mut self, name: StringId, param_count: u32) -> u32 {
        let index = self.module.functions.len() as u32;
        self.module.functions.push(Function {
            header: FunctionHeader {
                name,
                param_count,
                lazy: true,
                ..FunctionHeader::default()
            },
            body: Vec::new(),
        });
        index
    }

    /// Register a CommonJS module identified by its filename
    pub fn add_cjs_module(&mut self, filename: StringId, function: u32) {
        self.module.cjs_modules.push((filename, function));
    }

    /// Register a CommonJS module identified by a numeric id
    pub fn add_cjs_module_static(&mut self, module_id: u32, function: u32) {
        self.module.cjs_modules_static.push((module_id, function));
    }

    /// Add a compiled regular expression and return its index
    pub fn add_regexp(&mut self, bytecode: Vec<u8>) -> u32 {
        self.module.regexps.push(bytecode);
        self.module.regexps.len() as u32 - 1
    }

    pub fn set_epilogue(&mut self, epilogue: Vec<u8>) {
        self.module.epilogue = epilogue;
    }

    pub fn set_global_function(&mut self, index: u32) {
        self.module.global_function = index;
    }

    /// Number of functions added so far
    pub fn function_count(&self) -> u32 {
        self.module.functions.len() as u32
    }

    pub fn build(self) -> BytecodeModule {
        self.module
    }

    /// Build and share as a provider
    pub fn build_shared(self) -> Arc<dyn BytecodeProvider> {
        self.module.into_provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_unit() {
        let unit = BytecodeModule::default();
        assert_eq!(unit.string_count(), 0);
        assert_eq!(unit.function_count(), 0);
        assert!(unit.epilogue().is_empty());
        assert!(!unit.is_lazy());
    }

    #[test]
    fn test_builder() {
        let mut b = BytecodeBuilder::new();
        let plain = b.add_string("hello world");
        let ident = b.add_identifier("foo");
        let f = b.add_function(ident, 2, 8, vec![1, 2, 3]);
        let g = b.add_lazy_function(plain, 0);
        b.add_cjs_module(plain, f);
        b.add_cjs_module_static(7, g);
        let re = b.add_regexp(vec![0xAA]);
        b.set_epilogue(b"tail".to_vec());
        b.set_global_function(f);
        let unit = b.build();

        assert_eq!(unit.string_count(), 2);
        assert!(!unit.string_table_entry(plain).is_identifier);
        assert!(unit.string_table_entry(ident).is_identifier);
        assert_eq!(unit.string_table_entry(ident).length, 3);
        assert_eq!(unit.identifier_hashes(), &[hash_string("foo")]);

        let header = unit.function_header(f);
        assert_eq!(header.param_count, 2);
        assert_eq!(header.bytecode_size, 3);
        assert!(unit.function_header(g).lazy);
        assert!(unit.bytecode(g).is_empty());

        assert_eq!(unit.cjs_module_table(), &[(plain, f)]);
        assert_eq!(unit.cjs_module_table_static(), &[(7, g)]);
        assert_eq!(unit.regexp_bytecode(re), &[0xAA]);
        assert_eq!(unit.epilogue(), b"tail");
        assert_eq!(unit.global_function_index(), f);
    }
}
