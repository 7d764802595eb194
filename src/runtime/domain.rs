//! Domains
//!
//! A domain is the GC cell that owns a group of runtime modules loaded
//! together, along with the CommonJS module registry those modules
//! declare. Modules hold only a weak reference back to their domain; when
//! the domain dies, its modules are released unless flagged persistent.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::identifier::{IdentifierTable, SymbolId};
use super::runtime_module::RuntimeModule;
use super::{FastHashMap, fast_map_new};
use crate::error::{Error, Result};
use crate::gc::{SlotAcceptor, WeakRootAcceptor};

/// Initialization state of a CommonJS module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CjsModuleState {
    Uninitialized,
    /// Entry point of its unit, or currently running its body
    Initializing,
    Initialized,
}

/// A registered CommonJS module
#[derive(Debug, Clone)]
pub struct CjsModule {
    function_index: u32,
    module: Weak<RuntimeModule>,
    state: CjsModuleState,
}

impl CjsModule {
    /// Function of the declaring unit that evaluates the module body
    #[inline]
    pub fn function_index(&self) -> u32 {
        self.function_index
    }

    #[inline]
    pub fn state(&self) -> CjsModuleState {
        self.state
    }

    /// The runtime module whose unit declared this module
    pub fn runtime_module(&self) -> Option<Rc<RuntimeModule>> {
        self.module.upgrade()
    }
}

/// What a dead domain leaves behind
#[derive(Debug, Default)]
pub struct DomainRelease {
    /// Modules dropped with the domain
    pub released: usize,
    /// Persistent modules and their lazy descendants, now detached; the
    /// caller must retain them
    pub persistent: Vec<Rc<RuntimeModule>>,
}

/// Owning group of runtime modules
#[derive(Default)]
pub struct Domain {
    runtime_modules: Vec<Rc<RuntimeModule>>,
    /// Indexed by CommonJS module id
    cjs_modules: Vec<Option<CjsModule>>,
    /// Filename symbol to module id, for dynamically resolved modules
    cjs_module_names: FastHashMap<SymbolId, u32>,
}

impl Domain {
    pub fn new() -> Self {
        Domain {
            runtime_modules: Vec::new(),
            cjs_modules: Vec::new(),
            cjs_module_names: fast_map_new(),
        }
    }

    /// Take ownership of `module`
    pub(crate) fn add_runtime_module(&mut self, module: Rc<RuntimeModule>) {
        debug_assert!(
            !self.runtime_modules.iter().any(|m| Rc::ptr_eq(m, &module)),
            "module registered twice"
        );
        self.runtime_modules.push(module);
    }

    /// Give up ownership of `module`, e.g. after its load failed
    pub(crate) fn remove_runtime_module(
        &mut self,
        module: &RuntimeModule,
    ) -> Option<Rc<RuntimeModule>> {
        let index = self
            .runtime_modules
            .iter()
            .position(|m| std::ptr::eq(Rc::as_ptr(m), module))?;
        Some(self.runtime_modules.remove(index))
    }

    /// Modules owned by this domain, in creation order
    #[inline]
    pub fn runtime_modules(&self) -> &[Rc<RuntimeModule>] {
        &self.runtime_modules
    }

    /// Owned modules flagged persistent
    pub fn persistent_modules(&self) -> impl Iterator<Item = &Rc<RuntimeModule>> + '_ {
        self.runtime_modules.iter().filter(|m| m.flags().persistent())
    }

    pub fn has_persistent_module(&self) -> bool {
        self.persistent_modules().next().is_some()
    }

    /// Owned modules that outlive this domain
    ///
    /// The persistent modules and every lazy descendant they keep alive,
    /// each listed once.
    pub fn retained_modules(&self) -> Vec<Rc<RuntimeModule>> {
        let mut retained: Vec<Rc<RuntimeModule>> = self.persistent_modules().cloned().collect();
        let mut next = 0;
        while next < retained.len() {
            let children: Vec<Rc<RuntimeModule>> = retained[next].dependents().to_vec();
            for child in children {
                let owned = self.runtime_modules.iter().any(|m| Rc::ptr_eq(m, &child));
                if owned && !retained.iter().any(|m| Rc::ptr_eq(m, &child)) {
                    retained.push(child);
                }
            }
            next += 1;
        }
        retained
    }

    /// Register the CommonJS modules declared by `module`'s unit
    ///
    /// Either every entry is registered or, on error, none is. The first
    /// entry is the unit's entry point and starts out `Initializing`.
    pub fn import_cjs_module_table(
        &mut self,
        ids: &IdentifierTable,
        module: &Weak<RuntimeModule>,
        dynamic: &[(SymbolId, u32)],
        static_entries: &[(u32, u32)],
        function_count: u32,
    ) -> Result<()> {
        let base = self.cjs_modules.len() as u32;
        let mut names = fast_map_new::<SymbolId, ()>();
        for (i, &(name, function)) in dynamic.iter().enumerate() {
            if function >= function_count {
                return Err(Error::ModuleFunctionOutOfRange {
                    module: base + i as u32,
                    function,
                    count: function_count,
                });
            }
            if self.cjs_module_names.contains_key(&name) || names.insert(name, ()).is_some() {
                return Err(Error::DuplicateModuleName(ids.get_string(name).to_owned()));
            }
        }

        let mut seen = fast_map_new::<u32, ()>();
        for &(id, function) in static_entries {
            if function >= function_count {
                return Err(Error::ModuleFunctionOutOfRange {
                    module: id,
                    function,
                    count: function_count,
                });
            }
            // Ids in `base..` are about to go to the dynamic entries
            let taken = matches!(self.cjs_modules.get(id as usize), Some(Some(_)))
                || (base..base + dynamic.len() as u32).contains(&id);
            if taken || seen.insert(id, ()).is_some() {
                return Err(Error::DuplicateModuleId(id));
            }
        }

        let mut first = true;
        let mut entry = |function_index: u32| {
            let state = if first {
                CjsModuleState::Initializing
            } else {
                CjsModuleState::Uninitialized
            };
            first = false;
            CjsModule {
                function_index,
                module: Weak::clone(module),
                state,
            }
        };

        for &(name, function) in dynamic {
            let id = self.cjs_modules.len() as u32;
            self.cjs_modules.push(Some(entry(function)));
            self.cjs_module_names.insert(name, id);
        }
        for &(id, function) in static_entries {
            let index = id as usize;
            if self.cjs_modules.len() <= index {
                self.cjs_modules.resize(index + 1, None);
            }
            self.cjs_modules[index] = Some(entry(function));
        }

        debug!(
            dynamic = dynamic.len(),
            static_entries = static_entries.len(),
            "imported CommonJS module table"
        );
        Ok(())
    }

    /// CommonJS module with id `id`
    pub fn cjs_module(&self, id: u32) -> Option<&CjsModule> {
        self.cjs_modules.get(id as usize)?.as_ref()
    }

    /// Id of the dynamically resolved module named `filename`
    pub fn cjs_module_id(&self, filename: SymbolId) -> Option<u32> {
        self.cjs_module_names.get(&filename).copied()
    }

    /// Number of registered CommonJS modules
    pub fn cjs_module_count(&self) -> usize {
        self.cjs_modules.iter().flatten().count()
    }

    /// Update a module's state; false if no such module
    pub fn set_cjs_module_state(&mut self, id: u32, state: CjsModuleState) -> bool {
        match self.cjs_modules.get_mut(id as usize) {
            Some(Some(module)) => {
                module.state = state;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_slots(&mut self, acceptor: &mut dyn SlotAcceptor) {
        for module in &self.runtime_modules {
            module.mark_roots(acceptor);
        }
    }

    pub(crate) fn mark_weak_roots(&mut self, acceptor: &mut dyn WeakRootAcceptor) {
        for module in &self.runtime_modules {
            module.mark_weak_roots(acceptor);
            module.mark_domain_ref(acceptor);
        }
    }

    /// Release the modules of a dead domain
    pub(crate) fn finalize(self) -> DomainRelease {
        let persistent = self.retained_modules();
        let release = DomainRelease {
            released: self.runtime_modules.len() - persistent.len(),
            persistent,
        };
        for module in &self.runtime_modules {
            module.detach_domain();
        }
        debug!(
            released = release.released,
            persistent = release.persistent.len(),
            "domain finalized"
        );
        release
    }

    /// Hand over every owned module for bulk teardown
    pub(crate) fn prepare_for_runtime_shutdown(&mut self) -> Vec<Rc<RuntimeModule>> {
        self.cjs_modules.clear();
        self.cjs_module_names.clear();
        std::mem::take(&mut self.runtime_modules)
    }

    /// Out-of-line bytes
    pub fn heap_size(&self) -> usize {
        self.runtime_modules.capacity() * std::mem::size_of::<Rc<RuntimeModule>>()
            + self.cjs_modules.capacity() * std::mem::size_of::<Option<CjsModule>>()
            + self.cjs_module_names.capacity() * std::mem::size_of::<(SymbolId, u32)>()
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("runtime_modules", &self.runtime_modules.len())
            .field("cjs_modules", &self.cjs_module_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::runtime::RuntimeModuleFlags;

    fn module(ctx: &mut Context) -> Rc<RuntimeModule> {
        let domain = ctx.create_domain();
        RuntimeModule::create_uninitialized(ctx, domain, RuntimeModuleFlags::default())
    }

    #[test]
    fn test_import_static_and_dynamic() {
        let mut ctx = Context::new();
        let rm = module(&mut ctx);
        let weak = Rc::downgrade(&rm);
        let a = ctx.identifiers_mut().intern("a.js");
        let b = ctx.identifiers_mut().intern("b.js");

        let mut domain = Domain::new();
        domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[(a, 0), (b, 1)], &[], 2)
            .unwrap();
        assert_eq!(domain.cjs_module_count(), 2);
        assert_eq!(domain.cjs_module_id(b), Some(1));

        let first = domain.cjs_module(0).unwrap();
        assert_eq!(first.state(), CjsModuleState::Initializing);
        assert_eq!(domain.cjs_module(1).unwrap().state(), CjsModuleState::Uninitialized);
        assert!(Rc::ptr_eq(&first.runtime_module().unwrap(), &rm));

        domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[], &[(5, 0)], 1)
            .unwrap();
        assert_eq!(domain.cjs_module(5).unwrap().state(), CjsModuleState::Initializing);
        assert!(domain.cjs_module(4).is_none());
        assert!(domain.set_cjs_module_state(5, CjsModuleState::Initialized));
        assert!(!domain.set_cjs_module_state(4, CjsModuleState::Initialized));
    }

    #[test]
    fn test_import_rejects_duplicates_atomically() {
        let mut ctx = Context::new();
        let rm = module(&mut ctx);
        let weak = Rc::downgrade(&rm);
        let a = ctx.identifiers_mut().intern("a.js");

        let mut domain = Domain::new();
        let err = domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[], &[(1, 0), (2, 0), (1, 0)], 1)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateModuleId(1));
        assert_eq!(domain.cjs_module_count(), 0);

        let err = domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[(a, 0), (a, 0)], &[], 1)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateModuleName("a.js".into()));
        assert_eq!(domain.cjs_module_id(a), None);

        domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[(a, 0)], &[(3, 0)], 1)
            .unwrap();
        let err = domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[], &[(3, 0)], 1)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateModuleId(3));

        // Id 4 is the next dynamic id, so a static entry cannot claim it
        let b = ctx.identifiers_mut().intern("b.js");
        let err = domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[(b, 0)], &[(4, 0)], 1)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateModuleId(4));
        assert_eq!(domain.cjs_module_id(b), None);
    }

    #[test]
    fn test_import_rejects_bad_function() {
        let mut ctx = Context::new();
        let rm = module(&mut ctx);
        let weak = Rc::downgrade(&rm);
        let mut domain = Domain::new();
        let err = domain
            .import_cjs_module_table(ctx.identifiers(), &weak, &[], &[(0, 3)], 3)
            .unwrap_err();
        assert!(matches!(err, Error::ModuleFunctionOutOfRange { function: 3, count: 3, .. }));
    }

    #[test]
    fn test_finalize_keeps_persistent() {
        let mut ctx = Context::new();
        let handle = ctx.create_domain();
        let flags = RuntimeModuleFlags::default();
        let plain = RuntimeModule::create_uninitialized(&mut ctx, handle, flags);
        let flags = RuntimeModuleFlags::new().with_persistent();
        let kept = RuntimeModule::create_uninitialized(&mut ctx, handle, flags);

        let mut domain = Domain::new();
        domain.add_runtime_module(Rc::clone(&plain));
        domain.add_runtime_module(Rc::clone(&kept));
        assert!(domain.has_persistent_module());

        let release = domain.finalize();
        assert_eq!(release.released, 1);
        assert_eq!(release.persistent.len(), 1);
        assert!(Rc::ptr_eq(&release.persistent[0], &kept));
        assert!(kept.domain(ctx.heap()).is_none());
    }

    #[cfg(feature = "lazy")]
    #[test]
    fn test_finalize_keeps_lazy_children_of_persistent() {
        use crate::bytecode::BytecodeBuilder;

        let unit = || {
            let mut b = BytecodeBuilder::new();
            let name = b.add_identifier("f");
            b.add_function(name, 0, 0, vec![0]);
            b.add_lazy_function(name, 0);
            b.build_shared()
        };
        let mut ctx = Context::new();
        let handle = ctx.create_domain();
        let flags = RuntimeModuleFlags::new().with_persistent();
        let kept = RuntimeModule::create(&mut ctx, handle, unit(), flags, "").unwrap();
        let flags = RuntimeModuleFlags::new();
        let plain = RuntimeModule::create(&mut ctx, handle, unit(), flags, "").unwrap();
        kept.get_code_block(&mut ctx, 1);
        plain.get_code_block(&mut ctx, 1);
        let child = Rc::clone(&kept.dependents()[0]);

        let owner = ctx.heap().get(handle).unwrap();
        assert_eq!(owner.runtime_modules().len(), 4);
        let retained = owner.retained_modules();
        assert_eq!(retained.len(), 2);
        assert!(Rc::ptr_eq(&retained[0], &kept));
        assert!(Rc::ptr_eq(&retained[1], &child));

        let owner = std::mem::replace(ctx.heap_mut().get_mut(handle).unwrap(), Domain::new());
        let release = owner.finalize();
        assert_eq!(release.released, 2);
        assert_eq!(release.persistent.len(), 2);
        assert!(child.domain(ctx.heap()).is_none());
    }
}
