//! Code blocks
//!
//! The executable view of one function of a unit. A code block belongs to
//! exactly one runtime module but may be shared into the function slot of
//! another: a lazy function's block is owned by the lazy child module and
//! also stored in the parent's slot.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime_module::RuntimeModule;
use crate::bytecode::{FunctionHeader, StringId, UnitBytes};
#[cfg(feature = "lazy")]
use crate::bytecode::LazyCompiler;
#[cfg(feature = "lazy")]
use crate::context::Context;
#[cfg(feature = "lazy")]
use crate::error::{Error, Result};

/// Executable view of a function
pub struct CodeBlock {
    runtime_module: Weak<RuntimeModule>,
    /// Function index in the owning module's unit
    function_id: Cell<u32>,
    header: Cell<FunctionHeader>,
}

impl CodeBlock {
    pub(crate) fn new(
        runtime_module: Weak<RuntimeModule>,
        function_id: u32,
        header: FunctionHeader,
    ) -> Self {
        CodeBlock {
            runtime_module,
            function_id: Cell::new(function_id),
            header: Cell::new(header),
        }
    }

    #[inline]
    pub fn function_id(&self) -> u32 {
        self.function_id.get()
    }

    #[inline]
    pub fn header(&self) -> FunctionHeader {
        self.header.get()
    }

    /// Function name, as a string id of the owning module's unit
    #[inline]
    pub fn name(&self) -> StringId {
        self.header.get().name
    }

    #[inline]
    pub fn param_count(&self) -> u32 {
        self.header.get().param_count
    }

    #[inline]
    pub fn frame_size(&self) -> u32 {
        self.header.get().frame_size
    }

    /// Whether the body still needs compiling
    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.header.get().lazy
    }

    /// Owning module, unless it was released
    pub fn runtime_module(&self) -> Option<Rc<RuntimeModule>> {
        self.runtime_module.upgrade()
    }

    /// Whether `module` owns this block
    #[inline]
    pub fn is_owned_by(&self, module: &RuntimeModule) -> bool {
        std::ptr::eq(self.runtime_module.as_ptr(), module)
    }

    /// Instruction bytes, if the owning module is still alive
    pub fn bytecode(&self) -> Option<UnitBytes> {
        let provider = self.runtime_module()?.bytecode()?;
        Some(UnitBytes::function(provider, self.function_id()))
    }

    /// Compile a lazy body and rebind this block to it
    ///
    /// The owning module is switched over to the compiled unit. Does
    /// nothing if the body is already compiled.
    #[cfg(feature = "lazy")]
    pub fn lazy_compile(&self, ctx: &mut Context, compiler: &mut dyn LazyCompiler) -> Result<()> {
        if !self.is_lazy() {
            return Ok(());
        }
        let module = self
            .runtime_module()
            .ok_or_else(|| Error::LazyCompilation("owning module was released".into()))?;
        let unit = module
            .bytecode()
            .ok_or_else(|| Error::LazyCompilation("owning module has no bytecode".into()))?;
        if !unit.is_lazy() {
            return Err(Error::LazyCompilation(
                "function has no lazy module; its domain was collected".into(),
            ));
        }

        let compiled = compiler.compile_function(unit.as_ref(), self.function_id(), self.header())?;
        if compiled.function_count() == 0 || compiled.global_function_index() != 0 {
            return Err(Error::LazyCompilation(
                "compiled unit must start with the function body".into(),
            ));
        }
        let header = compiled.function_header(0);
        if header.lazy {
            return Err(Error::LazyCompilation("compiled body is still lazy".into()));
        }

        module.initialize_lazy(ctx, compiled);
        self.function_id.set(0);
        self.header.set(header);
        tracing::debug!(
            params = header.param_count,
            bytecode_size = header.bytecode_size,
            "lazy function compiled"
        );
        Ok(())
    }

    pub(crate) fn heap_size(&self) -> usize {
        std::mem::size_of::<CodeBlock>()
    }
}

impl fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeBlock")
            .field("function_id", &self.function_id())
            .field("header", &self.header())
            .finish()
    }
}
