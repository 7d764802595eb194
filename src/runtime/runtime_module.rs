//! Runtime modules
//!
//! A runtime module binds one immutable bytecode unit to a live context.
//! It materializes code blocks and symbols on first use, caches the hidden
//! classes of object literals and the template objects built from the unit,
//! and cooperates with the collector through its strong roots (template
//! objects), its weak roots (literal hidden classes) and its weak reference
//! to the owning [`Domain`].
//!
//! ```text
//!   Domain (GC cell) ──owns──▶ RuntimeModule ──dependents──▶ lazy child
//!        ▲                          │
//!        └────────── weak ──────────┘
//! ```
//!
//! Modules are shared through `Rc`. The domain holds the owning handles;
//! the `dependents` list of a parent only tracks the lazy children it
//! spawned.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::code_block::CodeBlock;
use super::domain::Domain;
use super::hidden_class::HiddenClass;
use super::identifier::{IdentifierTable, SymbolId, hash_string};
use super::object::JSObject;
use super::{FastHashMap, fast_map_new};
#[cfg(feature = "lazy")]
use crate::bytecode::LazyProvider;
use crate::bytecode::{BytecodeProvider, StringId, UnitBytes};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::gc::{Gc, Heap, SlotAcceptor, WeakRef, WeakRootAcceptor};

/// Lifecycle state of a runtime module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// No bytecode yet
    Uninitialized,
    /// Bytecode installed, CommonJS table being imported
    Initializing,
    Ready,
    /// Torn down; only counts remain meaningful
    Destroyed,
}

/// Runtime module flags
///
/// Layout:
/// - Bit 0: persistent (kept after the owning domain dies)
/// - Bit 1: hides epilogue (excluded from epilogue enumeration)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeModuleFlags {
    bits: u8,
}

impl RuntimeModuleFlags {
    const PERSISTENT_BIT: u8 = 1 << 0;
    const HIDES_EPILOGUE_BIT: u8 = 1 << 1;

    #[inline]
    pub const fn new() -> Self {
        RuntimeModuleFlags { bits: 0 }
    }

    #[inline]
    pub const fn with_persistent(self) -> Self {
        RuntimeModuleFlags {
            bits: self.bits | Self::PERSISTENT_BIT,
        }
    }

    #[inline]
    pub const fn with_hides_epilogue(self) -> Self {
        RuntimeModuleFlags {
            bits: self.bits | Self::HIDES_EPILOGUE_BIT,
        }
    }

    #[inline]
    pub const fn persistent(self) -> bool {
        self.bits & Self::PERSISTENT_BIT != 0
    }

    #[inline]
    pub const fn hides_epilogue(self) -> bool {
        self.bits & Self::HIDES_EPILOGUE_BIT != 0
    }
}

/// Whether `(key_buffer_index, num_literals)` fits the literal cache key
#[inline]
pub const fn can_generate_literal_hidden_class_cache_key(
    key_buffer_index: u32,
    num_literals: u32,
) -> bool {
    key_buffer_index & 0xFF00_0000 == 0 && num_literals < 256
}

/// Pack a literal cache key
///
/// # Panics
/// If the pair does not fit, see [`can_generate_literal_hidden_class_cache_key`].
#[inline]
pub fn literal_hidden_class_cache_key(key_buffer_index: u32, num_literals: u32) -> u32 {
    assert!(
        can_generate_literal_hidden_class_cache_key(key_buffer_index, num_literals),
        "literal cache key out of range: ({}, {})",
        key_buffer_index,
        num_literals
    );
    (key_buffer_index << 8) | num_literals
}

/// A bytecode unit bound to a context
pub struct RuntimeModule {
    this: Weak<RuntimeModule>,
    state: Cell<ModuleState>,
    /// Owning domain; cleared by the collector when it dies
    domain: Cell<WeakRef<Domain>>,
    flags: RuntimeModuleFlags,
    source_url: String,
    bc_provider: RefCell<Option<Arc<dyn BytecodeProvider>>>,
    /// One slot per string of the unit
    string_id_map: RefCell<Vec<Option<SymbolId>>>,
    /// One slot per function of the unit
    function_map: RefCell<Vec<Option<Rc<CodeBlock>>>>,
    /// Lazy children spawned by this module
    dependent_modules: RefCell<Vec<Rc<RuntimeModule>>>,
    object_literal_hidden_classes: RefCell<FastHashMap<u32, WeakRef<HiddenClass>>>,
    template_map: RefCell<FastHashMap<u32, Gc<JSObject>>>,
}

impl RuntimeModule {
    fn new_in(
        ctx: &mut Context,
        domain: Gc<Domain>,
        flags: RuntimeModuleFlags,
        source_url: String,
    ) -> Option<Rc<Self>> {
        let module = Rc::new_cyclic(|this| RuntimeModule {
            this: Weak::clone(this),
            state: Cell::new(ModuleState::Uninitialized),
            domain: Cell::new(WeakRef::new(domain)),
            flags,
            source_url,
            bc_provider: RefCell::new(None),
            string_id_map: RefCell::new(Vec::new()),
            function_map: RefCell::new(Vec::new()),
            dependent_modules: RefCell::new(Vec::new()),
            object_literal_hidden_classes: RefCell::new(fast_map_new()),
            template_map: RefCell::new(fast_map_new()),
        });

        let owner = ctx.heap_mut().get_mut(domain)?;
        if flags.persistent() && owner.has_persistent_module() {
            warn!(source = module.source_url(), "second persistent module in one domain");
            debug_assert!(false, "at most one persistent runtime module per domain");
        }
        owner.add_runtime_module(Rc::clone(&module));
        ctx.register_module(&module);
        trace!(
            source = module.source_url(),
            persistent = flags.persistent(),
            "runtime module registered"
        );
        Some(module)
    }

    /// Create a module from `bytecode` and import its CommonJS tables
    ///
    /// On failure the module is unregistered from `domain` and destroyed.
    pub fn create(
        ctx: &mut Context,
        domain: Gc<Domain>,
        bytecode: Arc<dyn BytecodeProvider>,
        flags: RuntimeModuleFlags,
        source_url: impl Into<String>,
    ) -> Result<Rc<Self>> {
        let module =
            Self::new_in(ctx, domain, flags, source_url.into()).ok_or(Error::DomainCollected)?;
        if let Err(err) = module.initialize(ctx, bytecode) {
            warn!(source = module.source_url(), error = %err, "runtime module load failed");
            if let Some(owner) = ctx.heap_mut().get_mut(domain) {
                owner.remove_runtime_module(&module);
            }
            module.state.set(ModuleState::Destroyed);
            return Err(err);
        }
        Ok(module)
    }

    /// Create a module without bytecode, to be initialized later
    ///
    /// # Panics
    /// If `domain` is not live.
    pub fn create_uninitialized(
        ctx: &mut Context,
        domain: Gc<Domain>,
        flags: RuntimeModuleFlags,
    ) -> Rc<Self> {
        match Self::new_in(ctx, domain, flags, String::new()) {
            Some(module) => module,
            None => panic!("runtime module created in a collected domain"),
        }
    }

    /// Install `bytecode` and import its CommonJS tables
    ///
    /// On failure the module returns to `Uninitialized`.
    ///
    /// # Panics
    /// If the module is not `Uninitialized`.
    pub fn initialize(&self, ctx: &mut Context, bytecode: Arc<dyn BytecodeProvider>) -> Result<()> {
        assert_eq!(
            self.state.get(),
            ModuleState::Uninitialized,
            "runtime module initialized twice"
        );
        self.state.set(ModuleState::Initializing);
        self.install(ctx.identifiers_mut(), bytecode);

        if let Err(err) = self.import_cjs_module_table(ctx) {
            self.reset();
            return Err(err);
        }
        self.state.set(ModuleState::Ready);
        debug!(
            source = self.source_url(),
            strings = self.string_count(),
            functions = self.code_block_count(),
            "runtime module initialized"
        );
        Ok(())
    }

    /// Install `bytecode` without touching the CommonJS tables
    ///
    /// Cannot fail for any well-formed unit.
    ///
    /// # Panics
    /// If the module is not `Uninitialized`.
    pub fn initialize_without_cjs_modules(
        &self,
        ctx: &mut Context,
        bytecode: Arc<dyn BytecodeProvider>,
    ) {
        assert_eq!(
            self.state.get(),
            ModuleState::Uninitialized,
            "runtime module initialized twice"
        );
        self.install(ctx.identifiers_mut(), bytecode);
        self.state.set(ModuleState::Ready);
    }

    fn install(&self, identifiers: &mut IdentifierTable, bytecode: Arc<dyn BytecodeProvider>) {
        let string_count = bytecode.string_count() as usize;
        let function_count = bytecode.function_count() as usize;
        *self.bc_provider.borrow_mut() = Some(bytecode);
        *self.string_id_map.borrow_mut() = vec![None; string_count];
        self.import_string_id_map(identifiers);

        let mut functions = self.function_map.borrow_mut();
        if functions.len() < function_count {
            functions.resize_with(function_count, || None);
        }
    }

    fn reset(&self) {
        *self.bc_provider.borrow_mut() = None;
        self.string_id_map.borrow_mut().clear();
        self.function_map.borrow_mut().clear();
        self.state.set(ModuleState::Uninitialized);
    }

    /// Intern every identifier of the unit up front
    fn import_string_id_map(&self, identifiers: &mut IdentifierTable) {
        let provider = self.provider();
        let mut hashes = provider.identifier_hashes().iter().copied();
        let mut map = self.string_id_map.borrow_mut();

        for id in 0..provider.string_count() {
            if !provider.string_table_entry(id).is_identifier {
                continue;
            }
            let s = provider.string(id);
            let hash = hashes.next().unwrap_or_else(|| hash_string(s));
            map[id as usize] = Some(identifiers.get_symbol_id(s, hash));
        }
    }

    fn import_cjs_module_table(&self, ctx: &mut Context) -> Result<()> {
        let provider = self.provider();
        let statics = provider.cjs_module_table_static();
        if provider.cjs_module_table().is_empty() && statics.is_empty() {
            return Ok(());
        }

        let dynamic: Vec<(SymbolId, u32)> = provider
            .cjs_module_table()
            .iter()
            .map(|&(filename, function)| {
                (self.get_symbol_id_from_string_id(ctx.identifiers_mut(), filename), function)
            })
            .collect();

        let domain = self.domain(ctx.heap()).ok_or(Error::DomainCollected)?;
        let (heap, identifiers) = ctx.split_mut();
        let owner = heap.get_mut(domain).ok_or(Error::DomainCollected)?;
        owner.import_cjs_module_table(
            identifiers,
            &self.this,
            &dynamic,
            statics,
            provider.function_count(),
        )
    }

    /// Create the module of a lazy function of `parent`
    ///
    /// The new module has a single function slot, already populated, and
    /// is recorded as a dependent of `parent`.
    ///
    /// # Panics
    /// If `parent` has no bytecode or `domain` is not live.
    #[cfg(feature = "lazy")]
    pub fn create_lazy_module(
        ctx: &mut Context,
        domain: Gc<Domain>,
        parent: &Rc<RuntimeModule>,
        function_index: u32,
    ) -> Rc<Self> {
        let Some(parent_unit) = parent.bytecode() else {
            panic!("lazy module spawned from an uninitialized parent");
        };
        let header = parent_unit.function_header(function_index);
        debug_assert_eq!(
            parent.domain(ctx.heap()),
            Some(domain),
            "lazy module outside its parent's domain"
        );
        let source_url = parent.source_url.clone();
        let module = match Self::new_in(ctx, domain, RuntimeModuleFlags::new(), source_url) {
            Some(module) => module,
            None => panic!("lazy module created in a collected domain"),
        };

        let provider = LazyProvider::new(parent_unit, function_index);
        *module.bc_provider.borrow_mut() = Some(Arc::new(provider));
        *module.string_id_map.borrow_mut() = parent.string_id_map.borrow().clone();
        let code_block = CodeBlock::new(Weak::clone(&module.this), function_index, header);
        *module.function_map.borrow_mut() = vec![Some(Rc::new(code_block))];
        module.state.set(ModuleState::Ready);

        parent.add_dependency(Rc::clone(&module));
        debug!(function = function_index, source = module.source_url(), "lazy module created");
        module
    }

    /// Record `child` as a lazy dependent of this module
    #[cfg(feature = "lazy")]
    pub fn add_dependency(&self, child: Rc<RuntimeModule>) {
        let mut dependents = self.dependent_modules.borrow_mut();
        debug_assert!(
            !dependents.iter().any(|m| Rc::ptr_eq(m, &child)),
            "dependency added twice"
        );
        dependents.push(child);
    }

    /// The single code block of a lazy module
    ///
    /// # Panics
    /// If this is not a lazy module.
    #[cfg(feature = "lazy")]
    pub fn get_only_lazy_code_block(&self) -> Rc<CodeBlock> {
        let functions = self.function_map.borrow();
        match functions.first() {
            Some(Some(block)) if functions.len() == 1 => Rc::clone(block),
            _ => panic!("not a lazy runtime module"),
        }
    }

    /// Name of the lazy module's function
    #[cfg(feature = "lazy")]
    pub fn get_lazy_name(&self, identifiers: &mut IdentifierTable) -> SymbolId {
        let block = self.get_only_lazy_code_block();
        self.get_symbol_id_from_string_id(identifiers, block.name())
    }

    /// Replace the lazy placeholder with the compiled unit
    ///
    /// The existing code block stays in slot 0, which is where the
    /// compiled unit keeps its body.
    #[cfg(feature = "lazy")]
    pub fn initialize_lazy(&self, ctx: &mut Context, bytecode: Arc<dyn BytecodeProvider>) {
        let _ = self.get_only_lazy_code_block();
        assert!(bytecode.function_count() >= 1, "compiled lazy unit has no functions");
        assert_eq!(bytecode.global_function_index(), 0, "compiled lazy body must be function 0");
        *self.bc_provider.borrow_mut() = None;
        self.install(ctx.identifiers_mut(), bytecode);
        self.state.set(ModuleState::Ready);
        debug!(
            strings = self.string_count(),
            functions = self.code_block_count(),
            "lazy module initialized"
        );
    }

    /// Code block of function `index`, materialized on first use
    ///
    /// # Panics
    /// If `index` is out of range or the module has no bytecode.
    #[inline]
    pub fn get_code_block(&self, ctx: &mut Context, index: u32) -> Rc<CodeBlock> {
        {
            let functions = self.function_map.borrow();
            assert!(
                (index as usize) < functions.len(),
                "function {} out of range ({} functions)",
                index,
                functions.len()
            );
            if let Some(block) = &functions[index as usize] {
                return Rc::clone(block);
            }
        }
        self.get_code_block_slow_path(ctx, index)
    }

    fn get_code_block_slow_path(&self, ctx: &mut Context, index: u32) -> Rc<CodeBlock> {
        let provider = self.provider();
        let header = provider.function_header(index);

        #[cfg(feature = "lazy")]
        let block = if header.lazy {
            match (self.this.upgrade(), self.domain(ctx.heap())) {
                (Some(this), Some(domain)) => {
                    let child = Self::create_lazy_module(ctx, domain, &this, index);
                    child.get_only_lazy_code_block()
                }
                // Released from a collected domain: the block stays lazy and
                // compiling it reports an error
                _ => {
                    warn!(
                        function = index,
                        source = self.source_url(),
                        "lazy function of a detached module"
                    );
                    Rc::new(CodeBlock::new(Weak::clone(&self.this), index, header))
                }
            }
        } else {
            Rc::new(CodeBlock::new(Weak::clone(&self.this), index, header))
        };
        #[cfg(not(feature = "lazy"))]
        let block = {
            let _ = ctx;
            Rc::new(CodeBlock::new(Weak::clone(&self.this), index, header))
        };

        trace!(function = index, lazy = header.lazy, "code block materialized");
        self.function_map.borrow_mut()[index as usize] = Some(Rc::clone(&block));
        block
    }

    /// Symbol of string `id`, which must already be mapped
    ///
    /// Valid for identifiers, which are interned at initialization.
    ///
    /// # Panics
    /// If the slot is empty.
    #[inline]
    pub fn get_symbol_id_must_exist(&self, id: StringId) -> SymbolId {
        match self.string_id_map.borrow().get(id as usize) {
            Some(Some(symbol)) => *symbol,
            _ => panic!("string {} has no symbol", id),
        }
    }

    /// Symbol of string `id`, interned on first use
    #[inline]
    pub fn get_symbol_id_from_string_id(
        &self,
        identifiers: &mut IdentifierTable,
        id: StringId,
    ) -> SymbolId {
        if let Some(Some(symbol)) = self.string_id_map.borrow().get(id as usize) {
            return *symbol;
        }
        self.create_symbol_from_string_id(identifiers, id, None)
    }

    /// Intern string `id` and record its symbol
    ///
    /// `hash` is computed when not supplied.
    ///
    /// # Panics
    /// If `id` is out of range.
    pub fn create_symbol_from_string_id(
        &self,
        identifiers: &mut IdentifierTable,
        id: StringId,
        hash: Option<u32>,
    ) -> SymbolId {
        let provider = self.provider();
        let mut map = self.string_id_map.borrow_mut();
        assert!((id as usize) < map.len(), "string {} out of range ({} strings)", id, map.len());

        let s = provider.string(id);
        let symbol = identifiers.get_symbol_id(s, hash.unwrap_or_else(|| hash_string(s)));
        debug_assert!(map[id as usize].is_none_or(|existing| existing == symbol));
        map[id as usize] = Some(symbol);
        symbol
    }

    /// Contents of string `id`, through its interned symbol
    pub fn get_string_from_string_id<'a>(
        &self,
        identifiers: &'a mut IdentifierTable,
        id: StringId,
    ) -> &'a str {
        let symbol = self.get_symbol_id_from_string_id(identifiers, id);
        identifiers.get_string(symbol)
    }

    /// Compiled regular expression `index`
    pub fn get_regexp_bytecode(&self, index: u32) -> UnitBytes {
        let provider = self.provider();
        assert!(index < provider.regexp_count(), "regexp {} out of range", index);
        UnitBytes::regexp(provider, index)
    }

    /// Store `class` as the shape of the literal at `key_buffer_index` with
    /// `num_literals` properties; ignored if the key does not fit
    pub fn try_cache_literal_hidden_class(
        &self,
        key_buffer_index: u32,
        num_literals: u32,
        class: Gc<HiddenClass>,
    ) {
        if !can_generate_literal_hidden_class_cache_key(key_buffer_index, num_literals) {
            return;
        }
        let key = literal_hidden_class_cache_key(key_buffer_index, num_literals);
        self.object_literal_hidden_classes
            .borrow_mut()
            .insert(key, WeakRef::new(class));
    }

    /// Cached literal shape, if present and still alive
    pub fn find_cached_literal_hidden_class(
        &self,
        heap: &Heap,
        key_buffer_index: u32,
        num_literals: u32,
    ) -> Option<Gc<HiddenClass>> {
        if !can_generate_literal_hidden_class_cache_key(key_buffer_index, num_literals) {
            return None;
        }
        let key = literal_hidden_class_cache_key(key_buffer_index, num_literals);
        let weak = *self.object_literal_hidden_classes.borrow().get(&key)?;
        heap.resolve(&weak)
    }

    /// Cache the template object of template `id`
    ///
    /// # Panics
    /// If `id` is already cached.
    pub fn cache_template_object(&self, id: u32, object: Gc<JSObject>) {
        let mut templates = self.template_map.borrow_mut();
        assert!(!templates.contains_key(&id), "template object {} cached twice", id);
        templates.insert(id, object);
    }

    pub fn find_cached_template_object(&self, id: u32) -> Option<Gc<JSObject>> {
        self.template_map.borrow().get(&id).copied()
    }

    /// Visit the strong roots: cached template objects
    pub fn mark_roots(&self, acceptor: &mut dyn SlotAcceptor) {
        for object in self.template_map.borrow_mut().values_mut() {
            object.accept(acceptor);
        }
    }

    /// Visit the weak roots: cached literal shapes
    ///
    /// Entries the collector cleared are dropped.
    pub fn mark_weak_roots(&self, acceptor: &mut dyn WeakRootAcceptor) {
        let mut classes = self.object_literal_hidden_classes.borrow_mut();
        for class in classes.values_mut() {
            class.accept(acceptor);
        }
        classes.retain(|_, class| !class.is_cleared());
    }

    /// Visit the weak reference to the owning domain
    pub fn mark_domain_ref(&self, acceptor: &mut dyn WeakRootAcceptor) {
        let mut domain = self.domain.get();
        domain.accept(acceptor);
        self.domain.set(domain);
    }

    pub(crate) fn detach_domain(&self) {
        self.domain.set(WeakRef::empty());
    }

    pub(crate) fn attach_domain(&self, domain: Gc<Domain>) {
        self.domain.set(WeakRef::new(domain));
    }

    /// Tear down for runtime shutdown
    ///
    /// Drops function slots holding blocks of other modules, the lazy
    /// dependents and the caches. Safe to run on modules in any order.
    pub fn prepare_for_runtime_shutdown(&self) {
        for slot in self.function_map.borrow_mut().iter_mut() {
            if slot.as_ref().is_some_and(|block| !block.is_owned_by(self)) {
                *slot = None;
            }
        }
        self.dependent_modules.borrow_mut().clear();
        self.object_literal_hidden_classes.borrow_mut().clear();
        self.template_map.borrow_mut().clear();
        self.state.set(ModuleState::Destroyed);
    }

    fn provider(&self) -> Arc<dyn BytecodeProvider> {
        match self.bc_provider.borrow().as_ref() {
            Some(provider) => Arc::clone(provider),
            None => panic!("runtime module has no bytecode"),
        }
    }

    /// Shared handle to the unit, if one is installed
    pub fn bytecode(&self) -> Option<Arc<dyn BytecodeProvider>> {
        self.bc_provider.borrow().clone()
    }

    /// Whether a fully compiled unit is installed
    pub fn is_initialized(&self) -> bool {
        self.bc_provider
            .borrow()
            .as_ref()
            .is_some_and(|provider| !provider.is_lazy())
    }

    /// Whether the unit declares dynamically resolved CommonJS modules
    pub fn has_cjs_modules(&self) -> bool {
        self.bc_provider
            .borrow()
            .as_ref()
            .is_some_and(|provider| !provider.cjs_module_table().is_empty())
    }

    /// Whether the unit declares statically resolved CommonJS modules
    pub fn has_cjs_modules_static(&self) -> bool {
        self.bc_provider
            .borrow()
            .as_ref()
            .is_some_and(|provider| !provider.cjs_module_table_static().is_empty())
    }

    #[inline]
    pub fn code_block_count(&self) -> u32 {
        self.function_map.borrow().len() as u32
    }

    #[inline]
    pub fn string_count(&self) -> u32 {
        self.string_id_map.borrow().len() as u32
    }

    /// Owning domain, unless it was collected
    pub fn domain(&self, heap: &Heap) -> Option<Gc<Domain>> {
        heap.resolve(&self.domain.get())
    }

    #[inline]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    #[inline]
    pub fn flags(&self) -> RuntimeModuleFlags {
        self.flags
    }

    #[inline]
    pub fn hides_epilogue(&self) -> bool {
        self.flags.hides_epilogue()
    }

    /// Trailing bytes of the unit
    pub fn epilogue(&self) -> Option<UnitBytes> {
        self.bytecode().map(UnitBytes::epilogue)
    }

    #[inline]
    pub fn state(&self) -> ModuleState {
        self.state.get()
    }

    /// Lazy children spawned by this module
    pub fn dependents(&self) -> Ref<'_, [Rc<RuntimeModule>]> {
        Ref::map(self.dependent_modules.borrow(), Vec::as_slice)
    }

    /// Bytes held outside the GC heap, for collection heuristics
    pub fn additional_memory_size(&self) -> usize {
        let functions = self.function_map.borrow();
        let blocks: usize = functions
            .iter()
            .flatten()
            .filter(|block| block.is_owned_by(self))
            .map(|block| block.heap_size())
            .sum();
        self.string_id_map.borrow().capacity() * std::mem::size_of::<Option<SymbolId>>()
            + functions.capacity() * std::mem::size_of::<Option<Rc<CodeBlock>>>()
            + blocks
            + self.object_literal_hidden_classes.borrow().capacity()
                * std::mem::size_of::<(u32, WeakRef<HiddenClass>)>()
            + self.template_map.borrow().capacity() * std::mem::size_of::<(u32, Gc<JSObject>)>()
    }
}

impl fmt::Debug for RuntimeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeModule")
            .field("source_url", &self.source_url)
            .field("state", &self.state.get())
            .field("flags", &self.flags)
            .field("strings", &self.string_count())
            .field("functions", &self.code_block_count())
            .finish()
    }
}

impl Drop for RuntimeModule {
    fn drop(&mut self) {
        trace!(source = %self.source_url, "runtime module released");
    }
}
