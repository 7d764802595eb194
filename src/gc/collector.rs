//! Mark-compact garbage collector
//!
//! A collection runs in five phases:
//! 1. Mark: trace everything reachable from the root set, set mark bits
//! 2. Weak: clear weak slots whose referent stayed unmarked
//! 3. Sweep: finalize unmarked cells (domains release their modules)
//! 4. Compact: slide live cells down to close the gaps
//! 5. Update: rewrite every strong and weak slot through the forwarding table
//!
//! Runtime modules are not cells. They expose their GC-visible fields via
//! [`RuntimeModule::mark_roots`], [`RuntimeModule::mark_weak_roots`] and
//! [`RuntimeModule::mark_domain_ref`], which the owning domain forwards to
//! the acceptors of each phase. The retained modules of a dying domain
//! (persistent modules and their lazy descendants) are visited on their
//! own until the context adopts them into a live domain.

use std::rc::Rc;

use tracing::{debug, trace};

use super::allocator::{Cell, CellRef, Gc, Heap, WeakRef};
use crate::runtime::RuntimeModule;

/// Visitor for strong slots
///
/// Used both to mark (the slot is read) and to relocate (the slot is
/// rewritten), so implementations receive the slot mutably.
pub trait SlotAcceptor {
    fn accept(&mut self, slot: &mut CellRef);
}

/// Visitor for weak slots
///
/// An acceptor may clear the slot (referent died) or rewrite it
/// (referent moved).
pub trait WeakRootAcceptor {
    fn accept_weak(&mut self, slot: &mut Option<CellRef>);
}

impl<T> Gc<T> {
    /// Hand this slot to a strong acceptor
    #[inline]
    pub fn accept(&mut self, acceptor: &mut dyn SlotAcceptor) {
        acceptor.accept(self.slot_mut());
    }
}

impl<T> WeakRef<T> {
    /// Hand this slot to a weak acceptor
    #[inline]
    pub fn accept(&mut self, acceptor: &mut dyn WeakRootAcceptor) {
        acceptor.accept_weak(self.slot_mut());
    }
}

impl Cell {
    /// Visit the strong edges held by this cell
    pub fn mark_slots(&mut self, acceptor: &mut dyn SlotAcceptor) {
        match self {
            Cell::HiddenClass(class) => class.mark_slots(acceptor),
            Cell::Object(obj) => obj.mark_slots(acceptor),
            Cell::Domain(domain) => domain.mark_slots(acceptor),
        }
    }

    /// Visit the weak edges held by this cell
    pub fn mark_weak_slots(&mut self, acceptor: &mut dyn WeakRootAcceptor) {
        if let Cell::Domain(domain) = self {
            domain.mark_weak_roots(acceptor);
        }
    }
}

/// Roots supplied by the context for one collection
pub struct RootSet<'a> {
    /// Embedder-held handles; rewritten in place, cleared slots stay `None`
    pub handles: &'a mut [Option<CellRef>],
}

/// Statistics about a GC run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of cells before collection
    pub cells_before: usize,
    /// Number of cells after collection
    pub cells_after: usize,
    /// Bytes freed
    pub bytes_freed: usize,
    /// Cells moved during compaction
    pub cells_moved: usize,
    /// Weak slots cleared
    pub weak_cleared: usize,
    /// Runtime modules released because their domain died
    pub modules_released: usize,
}

/// Outcome of a collection
pub struct Collection {
    pub stats: GcStats,
    /// Retained modules whose domain died, each listed once; the caller
    /// must adopt them into a live domain
    pub survivors: Vec<Rc<RuntimeModule>>,
}

struct Marker<'a> {
    generations: &'a [u32],
    marks: &'a mut [bool],
    worklist: &'a mut Vec<u32>,
}

impl SlotAcceptor for Marker<'_> {
    fn accept(&mut self, slot: &mut CellRef) {
        let index = slot.index() as usize;
        if self.generations.get(index) != Some(&slot.generation()) {
            debug_assert!(false, "stale handle during marking: {:?}", slot);
            return;
        }
        if !self.marks[index] {
            self.marks[index] = true;
            self.worklist.push(slot.index());
        }
    }
}

struct ClearUnmarked<'a> {
    generations: &'a [u32],
    marks: &'a [bool],
    cleared: usize,
}

impl WeakRootAcceptor for ClearUnmarked<'_> {
    fn accept_weak(&mut self, slot: &mut Option<CellRef>) {
        let Some(cell) = *slot else {
            return;
        };
        let index = cell.index() as usize;
        let live = self.generations.get(index) == Some(&cell.generation())
            && self.marks.get(index).copied().unwrap_or(false);
        if !live {
            *slot = None;
            self.cleared += 1;
        }
    }
}

/// Forwarding table entry: generation before the move and the new handle
type Forward = Option<(u32, CellRef)>;

struct Relocator<'a> {
    forwarding: &'a [Forward],
}

impl Relocator<'_> {
    fn forward(&self, cell: CellRef) -> Option<CellRef> {
        match self.forwarding.get(cell.index() as usize) {
            Some(Some((old_generation, new))) if *old_generation == cell.generation() => Some(*new),
            _ => None,
        }
    }
}

impl SlotAcceptor for Relocator<'_> {
    fn accept(&mut self, slot: &mut CellRef) {
        match self.forward(*slot) {
            Some(new) => *slot = new,
            None => debug_assert!(false, "strong slot points at a dead cell: {:?}", slot),
        }
    }
}

impl WeakRootAcceptor for Relocator<'_> {
    fn accept_weak(&mut self, slot: &mut Option<CellRef>) {
        if let Some(cell) = *slot {
            *slot = self.forward(cell);
        }
    }
}

impl Heap {
    /// Run a full collection
    ///
    /// Live cells may move; every slot reachable from `roots`, from live
    /// cells and from the modules of live domains is rewritten before this
    /// returns.
    pub fn collect(&mut self, roots: RootSet<'_>) -> Collection {
        let mut stats = GcStats {
            cells_before: self.live_cells(),
            ..GcStats::default()
        };

        // Phase 1: Mark
        let mut marks = vec![false; self.cells.len()];
        self.mark(&mut marks, roots.handles);

        // Phase 2: Clear weak slots of dead referents
        let mut clear = ClearUnmarked {
            generations: &self.generations,
            marks: &marks,
            cleared: 0,
        };
        for (index, cell) in self.cells.iter_mut().enumerate() {
            match cell {
                Some(cell) if marks[index] => cell.mark_weak_slots(&mut clear),
                Some(Cell::Domain(domain)) => {
                    for module in domain.retained_modules() {
                        module.mark_weak_roots(&mut clear);
                    }
                }
                _ => {}
            }
        }
        stats.weak_cleared = clear.cleared;

        // Phase 3: Sweep
        let mut survivors = Vec::new();
        for index in 0..self.cells.len() {
            if marks[index] {
                continue;
            }
            let Some(cell) = self.cells[index].take() else {
                continue;
            };
            stats.bytes_freed += cell.size_bytes();
            self.generations[index] = self.generations[index].wrapping_add(1);
            if let Cell::Domain(domain) = cell {
                let released = domain.finalize();
                stats.modules_released += released.released;
                survivors.extend(released.persistent);
            }
        }

        // Phase 4: Compact
        let forwarding = self.compact(&marks, &mut stats);

        // Phase 5: Update pointers
        let mut relocator = Relocator {
            forwarding: &forwarding,
        };
        for slot in roots.handles.iter_mut() {
            if let Some(cell) = *slot {
                *slot = relocator.forward(cell);
            }
        }
        for module in &survivors {
            module.mark_roots(&mut relocator);
            module.mark_weak_roots(&mut relocator);
            module.mark_domain_ref(&mut relocator);
        }
        for cell in self.cells.iter_mut().flatten() {
            cell.mark_slots(&mut relocator);
            cell.mark_weak_slots(&mut relocator);
        }

        self.allocated_since_gc = 0;
        self.collections += 1;
        stats.cells_after = self.live_cells();
        debug!(
            cells_before = stats.cells_before,
            cells_after = stats.cells_after,
            bytes_freed = stats.bytes_freed,
            cells_moved = stats.cells_moved,
            weak_cleared = stats.weak_cleared,
            modules_released = stats.modules_released,
            "collection finished"
        );

        Collection { stats, survivors }
    }

    fn mark(&mut self, marks: &mut [bool], handles: &mut [Option<CellRef>]) {
        let mut worklist = Vec::new();
        let mut marker = Marker {
            generations: &self.generations,
            marks,
            worklist: &mut worklist,
        };

        for slot in handles.iter_mut().flatten() {
            marker.accept(slot);
        }
        // Retained modules outlive their domain, so their strong fields are
        // roots even when the domain itself is unreachable.
        for cell in self.cells.iter().flatten() {
            if let Cell::Domain(domain) = cell {
                for module in domain.retained_modules() {
                    module.mark_roots(&mut marker);
                }
            }
        }

        while let Some(index) = marker.worklist.pop() {
            let index = index as usize;
            // Take the cell out so its slots can be visited while the
            // marker holds the mark bits.
            let Some(mut cell) = self.cells[index].take() else {
                continue;
            };
            cell.mark_slots(&mut marker);
            self.cells[index] = Some(cell);
        }
    }

    /// Slide live cells to the lowest free indices
    ///
    /// Every index that loses or gains a cell moves to a new generation.
    fn compact(&mut self, marks: &[bool], stats: &mut GcStats) -> Vec<Forward> {
        let mut forwarding: Vec<Forward> = vec![None; self.cells.len()];
        let mut write = 0usize;

        for read in 0..self.cells.len() {
            if self.cells[read].is_none() {
                continue;
            }
            debug_assert!(marks[read]);
            let old = CellRef::new(read as u32, self.generations[read]);
            if read != write {
                let cell = self.cells[read].take();
                self.generations[read] = self.generations[read].wrapping_add(1);
                self.generations[write] = self.generations[write].wrapping_add(1);
                self.cells[write] = cell;
                stats.cells_moved += 1;
                trace!(from = read, to = write, "cell moved");
            }
            forwarding[read] = Some((
                old.generation(),
                CellRef::new(write as u32, self.generations[write]),
            ));
            write += 1;
        }

        self.free_list = (write as u32..self.cells.len() as u32).rev().collect();
        forwarding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Domain, HiddenClass, JSObject};
    use crate::value::Value;

    fn collect(heap: &mut Heap, handles: &mut [Option<CellRef>]) -> GcStats {
        heap.collect(RootSet { handles }).stats
    }

    #[test]
    fn test_collect_empty_heap() {
        let mut heap = Heap::new(16);
        let stats = collect(&mut heap, &mut []);
        assert_eq!(stats, GcStats::default());
        assert_eq!(heap.collections(), 1);
    }

    #[test]
    fn test_unrooted_cells_are_freed() {
        let mut heap = Heap::new(16);
        heap.alloc(JSObject::new_array(Vec::new()));
        heap.alloc(HiddenClass::new(None, &[]));

        let stats = collect(&mut heap, &mut []);
        assert_eq!(stats.cells_before, 2);
        assert_eq!(stats.cells_after, 0);
        assert!(stats.bytes_freed > 0);
    }

    #[test]
    fn test_reachable_cells_survive_and_move() {
        let mut heap = Heap::new(16);
        let garbage = heap.alloc(JSObject::new_array(Vec::new()));
        let inner = heap.alloc(JSObject::new_array(vec![Value::Number(7.0)]));
        let outer = heap.alloc(JSObject::new_array(vec![Value::Object(inner.cell())]));

        let mut handles = [Some(outer.cell())];
        let stats = collect(&mut heap, &mut handles);
        assert_eq!(stats.cells_after, 2);
        assert_eq!(stats.cells_moved, 2);

        // The old handles are stale now
        assert!(heap.get(garbage).is_none());
        assert!(heap.get(outer).is_none());

        let outer = heap.downcast::<JSObject>(handles[0].unwrap()).unwrap();
        let inner_ref = match heap.get(outer).unwrap().get(0) {
            Some(Value::Object(cell)) => cell,
            other => panic!("unexpected element {:?}", other),
        };
        let inner = heap.downcast::<JSObject>(inner_ref).unwrap();
        assert_eq!(heap.get(inner).unwrap().get(0), Some(Value::Number(7.0)));
    }

    #[test]
    fn test_free_list_reused_lowest_first() {
        let mut heap = Heap::new(16);
        heap.alloc(JSObject::new_array(Vec::new()));
        heap.alloc(JSObject::new_array(Vec::new()));
        collect(&mut heap, &mut []);

        let a = heap.alloc(JSObject::new_array(Vec::new()));
        assert_eq!(a.cell().index(), 0);
        assert!(a.cell().generation() > 0);
    }

    #[test]
    fn test_weak_slots_cleared_and_relocated() {
        let mut heap = Heap::new(16);
        heap.alloc(JSObject::new_array(Vec::new()));
        let domain = heap.alloc(Domain::new());

        let mut handles = [Some(domain.cell())];
        let stats = collect(&mut heap, &mut handles);
        assert_eq!(stats.cells_moved, 1);

        let moved = heap.downcast::<Domain>(handles[0].unwrap()).unwrap();
        assert_ne!(moved, domain);

        let mut weak = Some(domain.cell());
        let mut relocate_stale = ClearUnmarked {
            generations: &heap.generations,
            marks: &[true],
            cleared: 0,
        };
        relocate_stale.accept_weak(&mut weak);
        assert!(weak.is_none());
        assert_eq!(relocate_stale.cleared, 1);
    }
}
