//! Garbage collector module
//!
//! Cells live in a generation-checked arena and are reclaimed by a tracing,
//! compacting collector. Runtime modules are not cells: their caches are
//! visited through the acceptor traits so the collector can mark, clear and
//! relocate the slots they hold.

mod allocator;
mod collector;

pub use allocator::{Cell, CellRef, Gc, Heap, HeapCell, MemoryTag, WeakRef};
pub use collector::{Collection, GcStats, RootSet, SlotAcceptor, WeakRootAcceptor};
