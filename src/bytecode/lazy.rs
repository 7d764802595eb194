//! Lazy compilation support
//!
//! A function marked lazy has no body in its unit. The runtime module
//! created for it sees the parent unit through [`LazyProvider`] until a
//! [`LazyCompiler`] produces a real unit for it.

use std::sync::Arc;

use super::{BytecodeProvider, FunctionHeader, StringId, StringTableEntry};
use crate::error::Result;

/// View on one uncompiled function of a parent unit
///
/// Strings and function headers come from the parent; module tables are
/// empty since a lazy function never declares CommonJS modules.
#[derive(Debug, Clone)]
pub struct LazyProvider {
    parent: Arc<dyn BytecodeProvider>,
    function_index: u32,
}

impl LazyProvider {
    pub fn new(parent: Arc<dyn BytecodeProvider>, function_index: u32) -> Self {
        debug_assert!(function_index < parent.function_count());
        LazyProvider {
            parent,
            function_index,
        }
    }

    /// Function of the parent unit this view stands for
    #[inline]
    pub fn function_index(&self) -> u32 {
        self.function_index
    }

    #[inline]
    pub fn parent(&self) -> &Arc<dyn BytecodeProvider> {
        &self.parent
    }
}

impl BytecodeProvider for LazyProvider {
    fn string_count(&self) -> u32 {
        self.parent.string_count()
    }

    fn string_table_entry(&self, id: StringId) -> StringTableEntry {
        self.parent.string_table_entry(id)
    }

    fn string(&self, id: StringId) -> &str {
        self.parent.string(id)
    }

    fn identifier_hashes(&self) -> &[u32] {
        self.parent.identifier_hashes()
    }

    fn function_count(&self) -> u32 {
        self.parent.function_count()
    }

    fn function_header(&self, index: u32) -> FunctionHeader {
        self.parent.function_header(index)
    }

    fn bytecode(&self, index: u32) -> &[u8] {
        self.parent.bytecode(index)
    }

    fn global_function_index(&self) -> u32 {
        self.function_index
    }

    fn cjs_module_table(&self) -> &[(StringId, u32)] {
        &[]
    }

    fn cjs_module_table_static(&self) -> &[(u32, u32)] {
        &[]
    }

    fn regexp_bytecode(&self, index: u32) -> &[u8] {
        self.parent.regexp_bytecode(index)
    }

    fn regexp_count(&self) -> u32 {
        self.parent.regexp_count()
    }

    fn epilogue(&self) -> &[u8] {
        &[]
    }

    fn is_lazy(&self) -> bool {
        true
    }
}

/// Source-level compiler invoked for lazy functions
pub trait LazyCompiler {
    /// Compile function `function_index` of `unit`
    ///
    /// The returned unit's global function is the compiled body. It may
    /// itself contain lazy functions.
    fn compile_function(
        &mut self,
        unit: &dyn BytecodeProvider,
        function_index: u32,
        header: FunctionHeader,
    ) -> Result<Arc<dyn BytecodeProvider>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::BytecodeBuilder;

    #[test]
    fn test_lazy_view() {
        let mut b = BytecodeBuilder::new();
        let name = b.add_identifier("inner");
        b.add_function(name, 0, 1, vec![0]);
        let lazy = b.add_lazy_function(name, 3);
        b.add_cjs_module(name, 0);
        b.set_epilogue(vec![1, 2]);
        let parent = b.build_shared();

        let view = LazyProvider::new(parent, lazy);
        assert!(view.is_lazy());
        assert_eq!(view.global_function_index(), lazy);
        assert_eq!(view.function_header(lazy).param_count, 3);
        assert_eq!(view.string(name), "inner");
        assert!(view.cjs_module_table().is_empty());
        assert!(view.epilogue().is_empty());
    }
}
