//! Cell arena for GC-managed objects
//!
//! Layout:
//! ```text
//! index:        0        1        2        3
//!            +--------+--------+--------+--------+
//! cells      | Domain | (free) | Object | Class  |
//!            +--------+--------+--------+--------+
//! generations|   0    |   3    |   1    |   0    |
//!            +--------+--------+--------+--------+
//! ```
//!
//! A handle is an `(index, generation)` pair. Freeing or moving a cell bumps
//! the generation of every slot it touched, so a stale handle never aliases
//! a newer cell; lookups through a stale handle simply fail.

use std::fmt;
use std::marker::PhantomData;

use crate::runtime::{Domain, HiddenClass, JSObject};

/// Memory tags, one per cell kind
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTag {
    /// Free slot
    Free = 0,
    /// Object shape descriptor
    HiddenClass = 1,
    /// JavaScript object
    Object = 2,
    /// Owning group of runtime modules
    Domain = 3,
}

impl MemoryTag {
    pub const COUNT: usize = 4;
}

/// Untyped handle to a heap cell
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    index: u32,
    generation: u32,
}

impl CellRef {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        CellRef { index, generation }
    }

    /// Slot index in the arena
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Typed strong handle
pub struct Gc<T> {
    cell: CellRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Gc<T> {
    #[inline]
    pub(crate) const fn from_cell(cell: CellRef) -> Self {
        Gc {
            cell,
            _marker: PhantomData,
        }
    }

    /// Underlying untyped handle
    #[inline]
    pub const fn cell(self) -> CellRef {
        self.cell
    }

    /// Mutable access to the slot, for acceptors that rewrite it
    #[inline]
    pub fn slot_mut(&mut self) -> &mut CellRef {
        &mut self.cell
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl<T> Eq for Gc<T> {}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gc({:?})", self.cell)
    }
}

/// Typed weak handle
///
/// Does not keep its referent alive. The collector clears it when the
/// referent dies and rewrites it when the referent moves.
pub struct WeakRef<T> {
    slot: Option<CellRef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> WeakRef<T> {
    /// A weak reference to `target`
    #[inline]
    pub const fn new(target: Gc<T>) -> Self {
        WeakRef {
            slot: Some(target.cell),
            _marker: PhantomData,
        }
    }

    /// A weak reference that points nowhere
    #[inline]
    pub const fn empty() -> Self {
        WeakRef {
            slot: None,
            _marker: PhantomData,
        }
    }

    /// The handle as last written by the collector. It is only meaningful
    /// if the heap still agrees, see [`Heap::resolve`].
    #[inline]
    pub fn get_unchecked(&self) -> Option<Gc<T>> {
        self.slot.map(Gc::from_cell)
    }

    /// Whether the collector cleared this reference
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.slot.is_none()
    }

    /// Mutable access to the slot, for acceptors that rewrite it
    #[inline]
    pub fn slot_mut(&mut self) -> &mut Option<CellRef> {
        &mut self.slot
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WeakRef<T> {}

impl<T> Default for WeakRef<T> {
    fn default() -> Self {
        WeakRef::empty()
    }
}

impl<T> fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(cell) => write!(f, "WeakRef({:?})", cell),
            None => write!(f, "WeakRef(cleared)"),
        }
    }
}

/// A GC-managed cell
#[derive(Debug)]
pub enum Cell {
    HiddenClass(HiddenClass),
    Object(JSObject),
    Domain(Box<Domain>),
}

impl Cell {
    /// Memory tag of this cell
    pub fn tag(&self) -> MemoryTag {
        match self {
            Cell::HiddenClass(_) => MemoryTag::HiddenClass,
            Cell::Object(_) => MemoryTag::Object,
            Cell::Domain(_) => MemoryTag::Domain,
        }
    }

    /// Estimated size in bytes, including out-of-line storage
    pub fn size_bytes(&self) -> usize {
        let base = std::mem::size_of::<Cell>();
        let deep = match self {
            Cell::HiddenClass(class) => class.heap_size(),
            Cell::Object(obj) => obj.heap_size(),
            Cell::Domain(domain) => std::mem::size_of::<Domain>() + domain.heap_size(),
        };
        base + deep
    }
}

/// Types that live in a [`Cell`]
pub trait HeapCell: Sized {
    const TAG: MemoryTag;

    fn into_cell(self) -> Cell;
    fn from_cell(cell: &Cell) -> Option<&Self>;
    fn from_cell_mut(cell: &mut Cell) -> Option<&mut Self>;
}

impl HeapCell for HiddenClass {
    const TAG: MemoryTag = MemoryTag::HiddenClass;

    fn into_cell(self) -> Cell {
        Cell::HiddenClass(self)
    }

    fn from_cell(cell: &Cell) -> Option<&Self> {
        match cell {
            Cell::HiddenClass(class) => Some(class),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut Cell) -> Option<&mut Self> {
        match cell {
            Cell::HiddenClass(class) => Some(class),
            _ => None,
        }
    }
}

impl HeapCell for JSObject {
    const TAG: MemoryTag = MemoryTag::Object;

    fn into_cell(self) -> Cell {
        Cell::Object(self)
    }

    fn from_cell(cell: &Cell) -> Option<&Self> {
        match cell {
            Cell::Object(obj) => Some(obj),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut Cell) -> Option<&mut Self> {
        match cell {
            Cell::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl HeapCell for Domain {
    const TAG: MemoryTag = MemoryTag::Domain;

    fn into_cell(self) -> Cell {
        Cell::Domain(Box::new(self))
    }

    fn from_cell(cell: &Cell) -> Option<&Self> {
        match cell {
            Cell::Domain(domain) => Some(domain.as_ref()),
            _ => None,
        }
    }

    fn from_cell_mut(cell: &mut Cell) -> Option<&mut Self> {
        match cell {
            Cell::Domain(domain) => Some(domain.as_mut()),
            _ => None,
        }
    }
}

/// The GC heap
pub struct Heap {
    /// Cell storage, `None` for free slots
    pub(super) cells: Vec<Option<Cell>>,
    /// Current generation of every slot ever used
    pub(super) generations: Vec<u32>,
    /// Free slot indices; the lowest index is popped first
    pub(super) free_list: Vec<u32>,
    /// Bytes handed out since the last collection
    pub(super) allocated_since_gc: usize,
    /// Number of completed collections
    pub(super) collections: u64,
}

impl Heap {
    /// Create a heap with room for `capacity` cells
    pub fn new(capacity: usize) -> Self {
        Heap {
            cells: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            allocated_since_gc: 0,
            collections: 0,
        }
    }

    /// Allocate a cell and return a handle to it
    pub fn alloc<T: HeapCell>(&mut self, value: T) -> Gc<T> {
        let cell = value.into_cell();
        self.allocated_since_gc += cell.size_bytes();

        let index = match self.free_list.pop() {
            Some(index) => {
                debug_assert!(self.cells[index as usize].is_none());
                self.cells[index as usize] = Some(cell);
                index
            }
            None => {
                let index = self.cells.len() as u32;
                self.cells.push(Some(cell));
                if self.generations.len() <= index as usize {
                    self.generations.push(0);
                }
                index
            }
        };

        Gc::from_cell(CellRef::new(index, self.generations[index as usize]))
    }

    /// Whether `cell` still names a live cell
    #[inline]
    pub fn is_live(&self, cell: CellRef) -> bool {
        self.validate(cell).is_some()
    }

    fn validate(&self, cell: CellRef) -> Option<usize> {
        let index = cell.index() as usize;
        if self.generations.get(index) != Some(&cell.generation()) {
            return None;
        }
        self.cells.get(index)?.as_ref()?;
        Some(index)
    }

    /// Borrow a cell through a typed handle
    pub fn get<T: HeapCell>(&self, gc: Gc<T>) -> Option<&T> {
        let index = self.validate(gc.cell())?;
        self.cells[index].as_ref().and_then(T::from_cell)
    }

    /// Mutably borrow a cell through a typed handle
    pub fn get_mut<T: HeapCell>(&mut self, gc: Gc<T>) -> Option<&mut T> {
        let index = self.validate(gc.cell())?;
        self.cells[index].as_mut().and_then(T::from_cell_mut)
    }

    /// Re-type an untyped handle if it names a live cell of kind `T`
    pub fn downcast<T: HeapCell>(&self, cell: CellRef) -> Option<Gc<T>> {
        let index = self.validate(cell)?;
        let live = self.cells[index].as_ref()?;
        (live.tag() == T::TAG).then(|| Gc::from_cell(cell))
    }

    /// Resolve a weak reference, failing if it was cleared or went stale
    pub fn resolve<T: HeapCell>(&self, weak: &WeakRef<T>) -> Option<Gc<T>> {
        let gc = weak.get_unchecked()?;
        self.downcast(gc.cell())
    }

    /// Number of live cells
    pub fn live_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Estimated bytes held by live cells
    pub fn heap_used(&self) -> usize {
        self.cells.iter().flatten().map(Cell::size_bytes).sum()
    }

    /// Bytes allocated since the last collection
    #[inline]
    pub fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    /// Number of collections run so far
    #[inline]
    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Iterator over live cells
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> + '_ {
        self.cells.iter().enumerate().filter_map(|(index, cell)| {
            let cell = cell.as_ref()?;
            Some((CellRef::new(index as u32, self.generations[index]), cell))
        })
    }

    /// Iterator over live domains
    pub fn iter_domains(&self) -> impl Iterator<Item = (Gc<Domain>, &Domain)> + '_ {
        self.iter_cells().filter_map(|(cell, live)| match live {
            Cell::Domain(domain) => Some((Gc::from_cell(cell), domain.as_ref())),
            _ => None,
        })
    }

    /// Mutable iterator over live domains
    pub fn iter_domains_mut(&mut self) -> impl Iterator<Item = &mut Domain> + '_ {
        self.cells.iter_mut().flatten().filter_map(|cell| match cell {
            Cell::Domain(domain) => Some(domain.as_mut()),
            _ => None,
        })
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_heap_creation() {
        let heap = Heap::new(16);
        assert_eq!(heap.live_cells(), 0);
        assert_eq!(heap.heap_used(), 0);
        assert_eq!(heap.collections(), 0);
    }

    #[test]
    fn test_alloc() {
        let mut heap = Heap::new(16);
        let obj = heap.alloc(JSObject::new_array(vec![Value::Number(1.0)]));
        assert_eq!(heap.live_cells(), 1);
        assert!(heap.allocated_since_gc() > 0);
        assert_eq!(heap.get(obj).map(JSObject::len), Some(1));
    }

    #[test]
    fn test_typed_access() {
        let mut heap = Heap::new(16);
        let class = heap.alloc(HiddenClass::new(None, &[]));
        let obj = heap.alloc(JSObject::new_array(Vec::new()));

        assert!(heap.downcast::<HiddenClass>(class.cell()).is_some());
        assert!(heap.downcast::<JSObject>(class.cell()).is_none());
        assert!(heap.downcast::<JSObject>(obj.cell()).is_some());
        assert_eq!(heap.iter_cells().count(), 2);
    }

    #[test]
    fn test_stale_handle() {
        let mut heap = Heap::new(16);
        let obj = heap.alloc(JSObject::new_array(Vec::new()));

        // Simulate a free: the slot moves to the next generation
        heap.cells[obj.cell().index() as usize] = None;
        heap.generations[obj.cell().index() as usize] += 1;
        heap.free_list.push(obj.cell().index());

        let reused = heap.alloc(JSObject::new_array(Vec::new()));
        assert_eq!(reused.cell().index(), obj.cell().index());
        assert_ne!(reused, obj);
        assert!(heap.get(obj).is_none());
        assert!(heap.get(reused).is_some());
    }

    #[test]
    fn test_weak_ref() {
        let mut heap = Heap::new(16);
        let domain = heap.alloc(Domain::new());
        let weak = WeakRef::new(domain);
        assert_eq!(heap.resolve(&weak), Some(domain));

        let cleared: WeakRef<Domain> = WeakRef::empty();
        assert!(cleared.is_cleared());
        assert!(heap.resolve(&cleared).is_none());
    }

    #[test]
    fn test_cell_ref_debug() {
        assert_eq!(format!("{:?}", CellRef::new(3, 7)), "#3@7");
    }
}
