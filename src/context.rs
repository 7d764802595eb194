//! Execution context
//!
//! The Context owns the GC heap, the identifier table and every root the
//! embedder holds. It drives collections and tears all runtime modules down
//! in bulk when it is dropped.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::bytecode::UnitBytes;
use crate::config::ContextConfig;
use crate::gc::{CellRef, Gc, GcStats, Heap, HeapCell, RootSet};
use crate::runtime::{Domain, HiddenClass, IdentifierTable, JSObject, RuntimeModule, SymbolId};
use crate::value::Value;

/// Handle to an embedder root slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(usize);

/// Memory usage snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub live_cells: usize,
    pub heap_bytes: usize,
    /// Bytes allocated since the last collection
    pub allocated_since_gc: usize,
    pub runtime_modules: usize,
    pub persistent_modules: usize,
    /// Side-table bytes of live runtime modules
    pub module_bytes: usize,
    pub identifiers: usize,
    pub collections: u64,
}

/// Execution context
pub struct Context {
    heap: Heap,
    identifiers: IdentifierTable,
    /// Embedder roots; `None` marks a free or cleared slot
    roots: Vec<Option<CellRef>>,
    /// Every module created in this context
    runtime_modules: Vec<Weak<RuntimeModule>>,
    /// Root of the domain adopting modules that outlived their own
    persistent_domain: Option<RootId>,
    config: ContextConfig,
    last_gc: Option<GcStats>,
}

impl Context {
    /// Create a context with the default configuration
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Context {
            heap: Heap::new(config.initial_heap_cells),
            identifiers: IdentifierTable::new(),
            roots: Vec::new(),
            runtime_modules: Vec::new(),
            persistent_domain: None,
            config,
            last_gc: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[inline]
    pub fn identifiers(&self) -> &IdentifierTable {
        &self.identifiers
    }

    #[inline]
    pub fn identifiers_mut(&mut self) -> &mut IdentifierTable {
        &mut self.identifiers
    }

    pub(crate) fn split_mut(&mut self) -> (&mut Heap, &mut IdentifierTable) {
        (&mut self.heap, &mut self.identifiers)
    }

    /// Allocate a new, unrooted domain
    pub fn create_domain(&mut self) -> Gc<Domain> {
        self.heap.alloc(Domain::new())
    }

    pub fn alloc_hidden_class(
        &mut self,
        parent: Option<Gc<HiddenClass>>,
        properties: &[SymbolId],
    ) -> Gc<HiddenClass> {
        let class = match parent.and_then(|p| self.heap.get(p).map(|c| (p, c.clone()))) {
            Some((parent, parent_class)) => HiddenClass::derive(parent, &parent_class, properties),
            None => HiddenClass::new(None, properties),
        };
        self.heap.alloc(class)
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> Gc<JSObject> {
        self.heap.alloc(JSObject::new_array(elements))
    }

    /// Allocate a frozen template object whose `raw` property holds `raw`
    pub fn alloc_template_object(&mut self, cooked: Vec<Value>, raw: Vec<Value>) -> Gc<JSObject> {
        let mut raw_array = JSObject::new_array(raw);
        raw_array.freeze();
        let raw_array = self.heap.alloc(raw_array);

        let raw_key = self.identifiers.intern("raw");
        let class = self.alloc_hidden_class(None, &[raw_key]);
        let mut template = JSObject::new_array(cooked);
        template.set_hidden_class(class, vec![Value::Object(raw_array.cell())]);
        template.freeze();
        self.heap.alloc(template)
    }

    /// Keep `gc` alive across collections
    pub fn add_root<T>(&mut self, gc: Gc<T>) -> RootId {
        match self.roots.iter().position(Option::is_none) {
            Some(index) => {
                self.roots[index] = Some(gc.cell());
                RootId(index)
            }
            None => {
                self.roots.push(Some(gc.cell()));
                RootId(self.roots.len() - 1)
            }
        }
    }

    /// Current handle of a root; collections may have moved it
    pub fn root<T: HeapCell>(&self, id: RootId) -> Option<Gc<T>> {
        let cell = (*self.roots.get(id.0)?)?;
        self.heap.downcast(cell)
    }

    pub fn remove_root(&mut self, id: RootId) {
        if let Some(slot) = self.roots.get_mut(id.0) {
            *slot = None;
        }
    }

    pub(crate) fn register_module(&mut self, module: &Rc<RuntimeModule>) {
        self.runtime_modules.push(Rc::downgrade(module));
    }

    /// Live modules, in creation order
    pub fn runtime_modules(&self) -> Vec<Rc<RuntimeModule>> {
        self.runtime_modules.iter().filter_map(Weak::upgrade).collect()
    }

    /// Domain holding the modules that outlived their own domain
    ///
    /// Created by the first collection that leaves survivors; lazy children
    /// of adopted modules are registered here.
    pub fn persistent_domain(&self) -> Option<Gc<Domain>> {
        self.root(self.persistent_domain?)
    }

    /// Persistent modules that outlived their domain
    pub fn persistent_modules(&self) -> Vec<Rc<RuntimeModule>> {
        self.persistent_domain()
            .and_then(|domain| self.heap.get(domain))
            .map(|domain| domain.persistent_modules().cloned().collect())
            .unwrap_or_default()
    }

    /// Epilogues of live modules, skipping hidden and empty ones
    pub fn epilogues(&self) -> Vec<UnitBytes> {
        self.runtime_modules()
            .iter()
            .filter(|module| !module.hides_epilogue())
            .filter_map(|module| module.epilogue())
            .filter(|epilogue| !epilogue.is_empty())
            .collect()
    }

    /// Run a full collection
    pub fn collect(&mut self) -> GcStats {
        let collection = self.heap.collect(RootSet {
            handles: &mut self.roots,
        });
        if !collection.survivors.is_empty() {
            self.adopt(collection.survivors);
        }
        self.runtime_modules.retain(|module| module.strong_count() > 0);
        self.last_gc = Some(collection.stats);
        collection.stats
    }

    /// Reattach modules whose domain died to the persistent domain
    fn adopt(&mut self, survivors: Vec<Rc<RuntimeModule>>) {
        let domain = match self.persistent_domain() {
            Some(domain) => domain,
            None => {
                let domain = self.create_domain();
                self.persistent_domain = Some(self.add_root(domain));
                domain
            }
        };
        let Some(owner) = self.heap.get_mut(domain) else {
            unreachable!("persistent domain is rooted");
        };
        let count = survivors.len();
        for module in survivors {
            module.attach_domain(domain);
            owner.add_runtime_module(module);
        }
        debug!(modules = count, "modules adopted by the persistent domain");
    }

    /// Bytes counted against the collection threshold
    pub fn gc_pressure(&self) -> usize {
        let modules: usize = self
            .runtime_modules()
            .iter()
            .map(|module| module.additional_memory_size())
            .sum();
        self.heap.allocated_since_gc() + modules
    }

    pub fn should_collect(&self) -> bool {
        self.config.collect_on_threshold && self.gc_pressure() >= self.config.gc_threshold_bytes
    }

    /// Collect if the threshold was crossed
    pub fn maybe_collect(&mut self) -> Option<GcStats> {
        self.should_collect().then(|| self.collect())
    }

    /// Statistics of the last collection
    pub fn last_gc(&self) -> Option<GcStats> {
        self.last_gc
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let modules = self.runtime_modules();
        MemoryStats {
            live_cells: self.heap.live_cells(),
            heap_bytes: self.heap.heap_used(),
            allocated_since_gc: self.heap.allocated_since_gc(),
            runtime_modules: modules.len(),
            persistent_modules: self.persistent_modules().len(),
            module_bytes: modules.iter().map(|m| m.additional_memory_size()).sum(),
            identifiers: self.identifiers.len(),
            collections: self.heap.collections(),
        }
    }

    /// Release every runtime module, in no particular order
    ///
    /// Modules are torn down without regard to dependents or reference
    /// counts. Handles held elsewhere stay valid but see `Destroyed`
    /// modules.
    pub fn prepare_for_runtime_shutdown(&mut self) {
        let modules: Vec<Rc<RuntimeModule>> = self
            .heap
            .iter_domains_mut()
            .flat_map(|domain| domain.prepare_for_runtime_shutdown())
            .collect();
        if modules.is_empty() {
            return;
        }

        for module in &modules {
            module.prepare_for_runtime_shutdown();
        }
        let count = modules.len();
        drop(modules);
        self.runtime_modules.retain(|module| module.strong_count() > 0);
        debug!(modules = count, "runtime modules released for shutdown");
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.prepare_for_runtime_shutdown();
        debug!(collections = self.heap.collections(), "context dropped");
    }
}
